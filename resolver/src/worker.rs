/// Bounded pool that runs resolution pipelines in the background.
///
/// Each submitted job gets a task id, is tracked in the [`TaskQueue`], waits
/// for a concurrency slot and runs on its own tokio task. Outcomes are sent
/// back as [`ResolutionReport`]s over an unbounded channel so the caller can
/// deliver results without blocking the submitter.
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use terarelay_shared::errors::ResolveResult;
use terarelay_shared::models::{CandidateLink, ResolveOptions};
use terarelay_shared::task_queue::TaskQueue;

use crate::pipeline::{MediaResult, ResolutionPipeline};

/// One link to resolve on behalf of a chat.
#[derive(Debug, Clone)]
pub struct ResolutionJob {
    pub chat_id: i64,
    /// Message to edit with progress and the final answer.
    pub status_message_id: i32,
    /// 1-based position of the link in its source message.
    pub position: usize,
    pub total: usize,
    pub link: CandidateLink,
    pub options: ResolveOptions,
    /// 1 for the first run, 2 for the alternate-profile retry.
    pub attempt: u32,
}

impl ResolutionJob {
    /// The same job re-run with the other header profile.
    pub fn retry_with_alternate_profile(&self) -> Self {
        let mut next = self.clone();
        next.options.profile = self.options.profile.alternate();
        next.attempt += 1;
        next
    }
}

#[derive(Debug)]
pub struct ResolutionReport {
    pub task_id: String,
    pub job: ResolutionJob,
    pub outcome: ResolveResult<MediaResult>,
}

#[derive(Clone)]
pub struct ResolverPool {
    pipeline: Arc<ResolutionPipeline>,
    queue: Arc<TaskQueue>,
    reports: mpsc::UnboundedSender<ResolutionReport>,
}

impl ResolverPool {
    pub fn new(
        pipeline: Arc<ResolutionPipeline>,
        queue: Arc<TaskQueue>,
    ) -> (Self, mpsc::UnboundedReceiver<ResolutionReport>) {
        let (reports, rx) = mpsc::unbounded_channel();
        (
            Self {
                pipeline,
                queue,
                reports,
            },
            rx,
        )
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    pub fn pipeline(&self) -> &Arc<ResolutionPipeline> {
        &self.pipeline
    }

    /// Register and spawn a job. Returns its task id immediately.
    pub async fn submit(&self, job: ResolutionJob) -> String {
        let task_id = uuid::Uuid::new_v4().to_string();
        self.queue
            .enqueue(&task_id, job.chat_id, &job.link.normalized_url)
            .await;

        let pipeline = self.pipeline.clone();
        let queue = self.queue.clone();
        let reports = self.reports.clone();
        let id = task_id.clone();

        tokio::spawn(async move {
            if !queue.acquire(&id).await {
                error!("Task {} could not acquire a slot", id);
                queue.fail(&id, "queue_closed").await;
                return;
            }

            info!(
                "Task {} resolving {} (attempt {}, {})",
                id, job.link.normalized_url, job.attempt, job.options.profile
            );
            let outcome = pipeline.resolve(&job.link, job.options).await;

            match &outcome {
                Ok(media) => {
                    debug!("Task {} resolved to {}", id, media.selected_url);
                    queue.complete(&id).await;
                }
                Err(e) => queue.fail(&id, e.kind()).await,
            }

            let report = ResolutionReport {
                task_id: id,
                job,
                outcome,
            };
            if let Err(e) = reports.send(report) {
                warn!("Report receiver dropped, discarding task {}", e.0.task_id);
            }
        });

        task_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media_downloader::{LocalHandle, MediaDownloader};
    use crate::test_support::StubFetcher;
    use async_trait::async_trait;
    use terarelay_shared::config::ExtractionConfig;
    use terarelay_shared::errors::DownloadError;
    use terarelay_shared::models::HeaderProfile;
    use terarelay_shared::task_queue::TaskState;

    struct NoDownloads;

    #[async_trait]
    impl MediaDownloader for NoDownloads {
        async fn download(
            &self,
            url: &str,
            _profile: HeaderProfile,
            _size_limit: u64,
        ) -> Result<LocalHandle, DownloadError> {
            Err(DownloadError::Network {
                url: url.to_string(),
                message: "disabled".into(),
            })
        }
    }

    const GOOD: &str = "https://1024tera.com/s/1good";
    const BAD: &str = "https://1024tera.com/s/1bad";

    fn pool() -> (ResolverPool, mpsc::UnboundedReceiver<ResolutionReport>) {
        let fetcher = StubFetcher::new()
            .with_page(
                GOOD,
                r#"<script>window.__INIT_DATA__ = {"u":"https://cdn.example/v_720.mp4"};</script>"#,
            )
            .with_page(BAD, "<html></html>");
        let pipeline =
            ResolutionPipeline::new(&ExtractionConfig::default(), Arc::new(fetcher), Arc::new(NoDownloads)).unwrap();
        ResolverPool::new(Arc::new(pipeline), Arc::new(TaskQueue::new(1)))
    }

    fn job(url: &str, position: usize) -> ResolutionJob {
        ResolutionJob {
            chat_id: 7,
            status_message_id: 100 + position as i32,
            position,
            total: 2,
            link: CandidateLink {
                raw_text_span: 0..url.len(),
                normalized_url: url.to_string(),
            },
            options: ResolveOptions {
                profile: HeaderProfile::Desktop,
                download: false,
            },
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_reports_each_job() {
        let (pool, mut rx) = pool();
        let good_id = pool.submit(job(GOOD, 1)).await;
        let bad_id = pool.submit(job(BAD, 2)).await;
        assert_ne!(good_id, bad_id);

        let mut reports = vec![rx.recv().await.unwrap(), rx.recv().await.unwrap()];
        reports.sort_by_key(|r| r.job.position);

        assert_eq!(reports[0].task_id, good_id);
        assert_eq!(
            reports[0].outcome.as_ref().unwrap().selected_url,
            "https://cdn.example/v_720.mp4"
        );
        assert_eq!(reports[1].task_id, bad_id);
        assert_eq!(reports[1].outcome.as_ref().unwrap_err().kind(), "no_metadata_found");

        let good = pool.queue().get_status(&good_id).await.unwrap();
        assert_eq!(good.status, TaskState::Done);
        let bad = pool.queue().get_status(&bad_id).await.unwrap();
        assert_eq!(bad.status, TaskState::Failed);
        assert_eq!(bad.error_kind.as_deref(), Some("no_metadata_found"));

        let stats = pool.queue().stats().await;
        assert_eq!(stats.running, 0);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn test_retry_flips_profile() {
        let first = job(GOOD, 1);
        let retry = first.retry_with_alternate_profile();
        assert_eq!(retry.options.profile, HeaderProfile::Mobile);
        assert_eq!(retry.attempt, 2);
        assert_eq!(retry.status_message_id, first.status_message_id);
    }
}
