/// Size-bounded streaming download into a scoped temp file.
///
/// The file lives in the configured download directory and is owned by a
/// [`LocalHandle`]: dropping the handle deletes the file, so a caller that
/// never consumes it does not leak disk space. Any failure, including a
/// timeout that drops the in-flight transfer, removes the partial file.
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tempfile::TempPath;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, warn};

use terarelay_shared::config::ExtractionConfig;
use terarelay_shared::errors::DownloadError;
use terarelay_shared::models::HeaderProfile;

use crate::fetcher::profile_headers;

/// A fully written, closed download. Deleted on drop.
#[derive(Debug)]
pub struct LocalHandle {
    path: TempPath,
    size_bytes: u64,
}

impl LocalHandle {
    pub fn new(path: TempPath, size_bytes: u64) -> Self {
        Self { path, size_bytes }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Delete the file now, reporting any I/O error.
    pub fn close(self) -> std::io::Result<()> {
        self.path.close()
    }

    /// Detach the file from the handle so it outlives it.
    pub fn keep(self) -> std::io::Result<PathBuf> {
        Ok(self.path.keep()?)
    }
}

#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Fetch `url` with the headers of `profile`, so the CDN sees the same
    /// client that resolved the share page.
    async fn download(&self, url: &str, profile: HeaderProfile, size_limit: u64)
        -> Result<LocalHandle, DownloadError>;
}

/// reqwest-backed downloader.
#[derive(Debug, Clone)]
pub struct HttpMediaDownloader {
    client: Client,
    dir: PathBuf,
    chunk_size: usize,
    timeout: Duration,
}

impl HttpMediaDownloader {
    pub fn new(config: &ExtractionConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self::with_client(client, config))
    }

    pub fn with_client(client: Client, config: &ExtractionConfig) -> Self {
        Self {
            client,
            dir: config.download_dir.clone(),
            chunk_size: config.chunk_size.max(1),
            timeout: config.download_timeout,
        }
    }

    fn classify_error(&self, url: &str, err: reqwest::Error) -> DownloadError {
        if err.is_timeout() {
            DownloadError::Timeout {
                url: url.to_string(),
                secs: self.timeout.as_secs(),
            }
        } else if let Some(status) = err.status() {
            DownloadError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            }
        } else {
            DownloadError::Network {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }

    async fn stream_download(
        &self,
        url: &str,
        profile: HeaderProfile,
        size_limit: u64,
    ) -> Result<LocalHandle, DownloadError> {
        let response = self
            .client
            .get(url)
            .headers(profile_headers(profile))
            .send()
            .await
            .map_err(|e| self.classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(announced) = response.content_length() {
            if announced > size_limit {
                info!("Rejecting {}: announced {} bytes over limit {}", url, announced, size_limit);
                return Err(DownloadError::SizeExceeded {
                    limit: size_limit,
                    received: announced,
                });
            }
        }

        let temp = tempfile::Builder::new()
            .prefix("terarelay-")
            .suffix(".part")
            .tempfile_in(&self.dir)
            .map_err(|e| DownloadError::Io(e.to_string()))?;
        let (file, path) = temp.into_parts();
        let file = tokio::fs::File::from_std(file);

        // `path` deletes the partial file if streaming fails.
        let size_bytes = stream_to_file(file, response, url, size_limit, self.chunk_size)
            .await
            .map_err(|e| self.classify_stream_error(url, e))?;

        debug!("Downloaded {} bytes from {} to {:?}", size_bytes, url, path);
        Ok(LocalHandle::new(path, size_bytes))
    }

    fn classify_stream_error(&self, url: &str, err: StreamError) -> DownloadError {
        match err {
            StreamError::Body(e) => self.classify_error(url, e),
            StreamError::Io(e) => DownloadError::Io(e.to_string()),
            StreamError::TooLarge { limit, received } => DownloadError::SizeExceeded { limit, received },
        }
    }
}

#[async_trait]
impl MediaDownloader for HttpMediaDownloader {
    async fn download(
        &self,
        url: &str,
        profile: HeaderProfile,
        size_limit: u64,
    ) -> Result<LocalHandle, DownloadError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| DownloadError::Io(e.to_string()))?;

        match tokio::time::timeout(self.timeout, self.stream_download(url, profile, size_limit)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Download of {} timed out after {:?}", url, self.timeout);
                Err(DownloadError::Timeout {
                    url: url.to_string(),
                    secs: self.timeout.as_secs(),
                })
            }
        }
    }
}

enum StreamError {
    Body(reqwest::Error),
    Io(std::io::Error),
    TooLarge { limit: u64, received: u64 },
}

/// Stream the body through a `chunk_size` buffer, aborting past `size_limit`.
/// Returns bytes written; the file is flushed, synced and closed on success.
async fn stream_to_file(
    file: tokio::fs::File,
    response: reqwest::Response,
    url: &str,
    size_limit: u64,
    chunk_size: usize,
) -> Result<u64, StreamError> {
    let mut writer = BufWriter::with_capacity(chunk_size, file);
    let mut stream = response.bytes_stream();
    let mut received: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(StreamError::Body)?;
        received += chunk.len() as u64;
        if received > size_limit {
            info!("Aborting {}: {} bytes exceeds limit {}", url, received, size_limit);
            return Err(StreamError::TooLarge {
                limit: size_limit,
                received,
            });
        }
        writer.write_all(&chunk).await.map_err(StreamError::Io)?;
    }

    writer.flush().await.map_err(StreamError::Io)?;
    let file = writer.into_inner();
    file.sync_all().await.map_err(StreamError::Io)?;
    drop(file);

    Ok(received)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader(dir: &Path, timeout: Duration) -> HttpMediaDownloader {
        let config = ExtractionConfig {
            download_dir: dir.to_path_buf(),
            download_timeout: timeout,
            chunk_size: 4,
            ..ExtractionConfig::default()
        };
        HttpMediaDownloader::new(&config).unwrap()
    }

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).unwrap().count()
    }

    /// Serves one chunked response with no Content-Length.
    async fn chunked_server(chunks: Vec<Vec<u8>>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 4096];
            let _ = socket.read(&mut buf).await;
            let mut out = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
            for chunk in chunks {
                out.extend_from_slice(format!("{:x}\r\n", chunk.len()).as_bytes());
                out.extend_from_slice(&chunk);
                out.extend_from_slice(b"\r\n");
            }
            out.extend_from_slice(b"0\r\n\r\n");
            let _ = socket.write_all(&out).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/video.mp4", addr)
    }

    #[tokio::test]
    async fn test_download_success_and_cleanup_on_drop() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/video_1080.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"0123456789abcdef".to_vec()))
            .mount(&server)
            .await;

        let handle = downloader(dir.path(), Duration::from_secs(5))
            .download(&format!("{}/video_1080.mp4", server.uri()), HeaderProfile::Desktop, 1024)
            .await
            .unwrap();

        assert_eq!(handle.size_bytes(), 16);
        assert_eq!(std::fs::read(handle.path()).unwrap(), b"0123456789abcdef");
        let kept = handle.path().to_path_buf();
        drop(handle);
        assert!(!kept.exists());
    }

    #[tokio::test]
    async fn test_close_deletes_file() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .mount(&server)
            .await;

        let handle = downloader(dir.path(), Duration::from_secs(5))
            .download(&server.uri(), HeaderProfile::Desktop, 1024)
            .await
            .unwrap();
        assert_eq!(entries(dir.path()), 1);
        handle.close().unwrap();
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_keep_detaches_file() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .mount(&server)
            .await;

        let handle = downloader(dir.path(), Duration::from_secs(5))
            .download(&server.uri(), HeaderProfile::Desktop, 1024)
            .await
            .unwrap();
        let kept = handle.keep().unwrap();
        assert!(kept.exists());
        assert!(kept.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_announced_size_over_limit() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 100]))
            .mount(&server)
            .await;

        let err = downloader(dir.path(), Duration::from_secs(5))
            .download(&server.uri(), HeaderProfile::Desktop, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::SizeExceeded { limit: 10, .. }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_streamed_overflow_leaves_nothing_behind() {
        let dir = TempDir::new().unwrap();
        let url = chunked_server(vec![vec![1u8; 8], vec![2u8; 8], vec![3u8; 8]]).await;

        let err = downloader(dir.path(), Duration::from_secs(5))
            .download(&url, HeaderProfile::Desktop, 12)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::SizeExceeded { limit: 12, received } if received > 12));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_streamed_within_limit() {
        let dir = TempDir::new().unwrap();
        let url = chunked_server(vec![vec![7u8; 5], vec![8u8; 5]]).await;

        let handle = downloader(dir.path(), Duration::from_secs(5))
            .download(&url, HeaderProfile::Desktop, 10)
            .await
            .unwrap();
        assert_eq!(handle.size_bytes(), 10);
        assert_eq!(std::fs::read(handle.path()).unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_http_error() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let err = downloader(dir.path(), Duration::from_secs(5))
            .download(&server.uri(), HeaderProfile::Desktop, 10)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Http { status: 403, .. }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_timeout() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let err = downloader(dir.path(), Duration::from_millis(50))
            .download(&server.uri(), HeaderProfile::Desktop, 1024)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Timeout { .. }));
        assert_eq!(entries(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_uses_requested_profile() {
        let server = MockServer::start().await;
        let dir = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"data".to_vec()))
            .mount(&server)
            .await;

        // Configured default is desktop; the call asks for mobile.
        let handle = downloader(dir.path(), Duration::from_secs(5))
            .download(&server.uri(), HeaderProfile::Mobile, 1024)
            .await
            .unwrap();
        assert_eq!(handle.size_bytes(), 4);

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        let user_agent = requests[0].headers.get("user-agent").unwrap().to_str().unwrap();
        assert_eq!(user_agent, HeaderProfile::Mobile.user_agent());
    }
}
