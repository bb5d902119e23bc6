/// Runtime configuration for the bot and the resolution pipeline.
///
/// Values come from environment variables (after `.env` is loaded by the
/// binaries). Parsing goes through a lookup function so tests can feed a
/// map instead of touching the process environment.
use std::path::PathBuf;
use std::time::Duration;

use crate::errors::ConfigError;
use crate::models::HeaderProfile;

pub const DEFAULT_DOMAINS: &[&str] = &[
    "terabox.com",
    "teraboxapp.com",
    "1024tera.com",
    "1024terabox.com",
    "freeterabox.com",
    "4funbox.com",
    "mirrobox.com",
    "nephobox.com",
    "momerybox.com",
    "terasharelink.com",
    "terafileshare.com",
];

pub const DEFAULT_MEDIA_EXTENSIONS: &[&str] =
    &["mp4", "mkv", "webm", "mov", "m4v", "avi", "flv", "m3u8", "ts"];

pub const DEFAULT_EMBEDDED_MARKERS: &[&str] = &[
    "window.__INIT_DATA__",
    "window.jsData",
    "window.__NEXT_DATA__",
    "locals.mset",
];

pub const DEFAULT_QUALITY_PREFERENCES: &[&str] = &["2160", "1440", "1080", "720", "480", "360", "240"];

pub const DEFAULT_SHORT_LINK_API_TEMPLATE: &str =
    "https://www.1024tera.com/api/shorturlinfo?app_id=250528&shorturl=1{token}&root=1";

pub const DEFAULT_MARKER_API_TEMPLATE: &str =
    "https://www.1024tera.com/share/list?app_id=250528&shareid={shareid}&uk={uk}&root=1&page=1&num=20";

/// Placeholder for the short-link token in `short_link_api_template`.
pub const TOKEN_PLACEHOLDER: &str = "{token}";

const MIB: u64 = 1024 * 1024;

/// Telegram delivery settings.
#[derive(Debug, Clone)]
pub struct BotConfig {
    pub token: String,
    pub max_concurrent: usize,
    /// Files above this size are not uploaded; the direct link is sent instead.
    pub max_upload_bytes: u64,
    pub admin_chat_id: Option<i64>,
}

impl BotConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = lookup("TELOXIDE_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::Missing("TELOXIDE_TOKEN"))?;

        let max_concurrent = parse_or(&lookup, "MAX_CONCURRENT_TASKS", 3usize)?;
        if max_concurrent == 0 {
            return Err(ConfigError::Invalid {
                key: "MAX_CONCURRENT_TASKS",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }

        let max_upload_mb = parse_or(&lookup, "MAX_UPLOAD_MB", 50u64)?;
        let admin_chat_id = match lookup("ADMIN_CHAT_ID") {
            Some(raw) => Some(parse_value("ADMIN_CHAT_ID", &raw)?),
            None => None,
        };

        Ok(Self {
            token,
            max_concurrent,
            max_upload_bytes: megabytes_to_bytes("MAX_UPLOAD_MB", max_upload_mb)?,
            admin_chat_id,
        })
    }
}

/// Site-specific extraction and download settings.
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// Domains recognised in chat text.
    pub domains: Vec<String>,
    /// File extensions that mark a string as a media URL.
    pub media_extensions: Vec<String>,
    /// Script globals assigned a JSON literal, e.g. `window.__INIT_DATA__`.
    pub embedded_markers: Vec<String>,
    /// Query parameters carrying the short-link token.
    pub short_link_params: Vec<String>,
    /// Secondary API URL with a `{token}` placeholder.
    pub short_link_api_template: String,
    /// Two numeric page fields; each name is also its placeholder in `marker_api_template`.
    pub marker_fields: (String, String),
    pub marker_api_template: String,
    /// Quality tags, most preferred first.
    pub quality_preferences: Vec<String>,
    pub default_profile: HeaderProfile,
    pub fetch_timeout: Duration,
    pub download_timeout: Duration,
    pub size_limit: u64,
    pub chunk_size: usize,
    pub download_dir: PathBuf,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            domains: to_owned_list(DEFAULT_DOMAINS),
            media_extensions: to_owned_list(DEFAULT_MEDIA_EXTENSIONS),
            embedded_markers: to_owned_list(DEFAULT_EMBEDDED_MARKERS),
            short_link_params: vec!["surl".to_string()],
            short_link_api_template: DEFAULT_SHORT_LINK_API_TEMPLATE.to_string(),
            marker_fields: ("shareid".to_string(), "uk".to_string()),
            marker_api_template: DEFAULT_MARKER_API_TEMPLATE.to_string(),
            quality_preferences: to_owned_list(DEFAULT_QUALITY_PREFERENCES),
            default_profile: HeaderProfile::Desktop,
            fetch_timeout: Duration::from_secs(20),
            download_timeout: Duration::from_secs(600),
            size_limit: 2048 * MIB,
            chunk_size: MIB as usize,
            download_dir: PathBuf::from("./downloads"),
        }
    }
}

impl ExtractionConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let domains = list_or(&lookup, "TERA_DOMAINS", defaults.domains);
        let media_extensions = list_or(&lookup, "MEDIA_EXTENSIONS", defaults.media_extensions)
            .into_iter()
            .map(|ext| ext.trim_start_matches('.').to_ascii_lowercase())
            .collect();
        let embedded_markers = list_or(&lookup, "EMBEDDED_MARKERS", defaults.embedded_markers);
        let short_link_params = list_or(&lookup, "SHORT_LINK_PARAMS", defaults.short_link_params);
        let quality_preferences =
            list_or(&lookup, "QUALITY_PREFERENCES", defaults.quality_preferences);

        let short_link_api_template = lookup("SHORT_LINK_API_TEMPLATE")
            .unwrap_or(defaults.short_link_api_template);
        if !short_link_api_template.contains(TOKEN_PLACEHOLDER) {
            return Err(ConfigError::Invalid {
                key: "SHORT_LINK_API_TEMPLATE",
                value: short_link_api_template,
                reason: format!("missing {} placeholder", TOKEN_PLACEHOLDER),
            });
        }

        let marker_fields = match lookup("MARKER_FIELDS") {
            Some(raw) => {
                let fields = split_list(&raw);
                match fields.as_slice() {
                    [first, second] if first != second => (first.clone(), second.clone()),
                    _ => {
                        return Err(ConfigError::Invalid {
                            key: "MARKER_FIELDS",
                            value: raw,
                            reason: "expected two distinct comma-separated field names".into(),
                        })
                    }
                }
            }
            None => defaults.marker_fields,
        };

        let marker_api_template =
            lookup("MARKER_API_TEMPLATE").unwrap_or(defaults.marker_api_template);
        for field in [&marker_fields.0, &marker_fields.1] {
            if !marker_api_template.contains(&format!("{{{}}}", field)) {
                return Err(ConfigError::Invalid {
                    key: "MARKER_API_TEMPLATE",
                    value: marker_api_template,
                    reason: format!("missing {{{}}} placeholder", field),
                });
            }
        }

        let default_profile = match lookup("HEADER_PROFILE") {
            Some(raw) => raw.parse::<HeaderProfile>().map_err(|reason| ConfigError::Invalid {
                key: "HEADER_PROFILE",
                value: raw.clone(),
                reason,
            })?,
            None => defaults.default_profile,
        };

        let fetch_timeout =
            Duration::from_secs(parse_or(&lookup, "FETCH_TIMEOUT_SECS", defaults.fetch_timeout.as_secs())?);
        let download_timeout = Duration::from_secs(parse_or(
            &lookup,
            "DOWNLOAD_TIMEOUT_SECS",
            defaults.download_timeout.as_secs(),
        )?);
        let size_limit = megabytes_to_bytes(
            "DOWNLOAD_SIZE_LIMIT_MB",
            parse_or(&lookup, "DOWNLOAD_SIZE_LIMIT_MB", defaults.size_limit / MIB)?,
        )?;
        let chunk_size = parse_or(&lookup, "DOWNLOAD_CHUNK_BYTES", defaults.chunk_size)?;
        if chunk_size == 0 {
            return Err(ConfigError::Invalid {
                key: "DOWNLOAD_CHUNK_BYTES",
                value: "0".into(),
                reason: "must be at least 1".into(),
            });
        }
        let download_dir = lookup("DOWNLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.download_dir);

        Ok(Self {
            domains,
            media_extensions,
            embedded_markers,
            short_link_params,
            short_link_api_template,
            marker_fields,
            marker_api_template,
            quality_preferences,
            default_profile,
            fetch_timeout,
            download_timeout,
            size_limit,
            chunk_size,
            download_dir,
        })
    }
}

fn to_owned_list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

fn list_or<F>(lookup: &F, key: &str, default: Vec<String>) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => {
            let items = split_list(&raw);
            if items.is_empty() {
                default
            } else {
                items
            }
        }
        None => default,
    }
}

fn parse_value<T>(key: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        key,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

fn megabytes_to_bytes(key: &'static str, megabytes: u64) -> Result<u64, ConfigError> {
    megabytes.checked_mul(MIB).ok_or_else(|| ConfigError::Invalid {
        key,
        value: megabytes.to_string(),
        reason: "too large to express in bytes".into(),
    })
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_extraction_defaults() {
        let config = ExtractionConfig::from_lookup(lookup_from(&[])).unwrap();
        assert!(config.domains.iter().any(|d| d == "1024tera.com"));
        assert_eq!(config.quality_preferences[0], "2160");
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert_eq!(config.default_profile, HeaderProfile::Desktop);
        assert_eq!(config.marker_fields, ("shareid".to_string(), "uk".to_string()));
    }

    #[test]
    fn test_extraction_overrides() {
        let config = ExtractionConfig::from_lookup(lookup_from(&[
            ("TERA_DOMAINS", "example.com, other.org ,"),
            ("MEDIA_EXTENSIONS", ".MP4,mkv"),
            ("HEADER_PROFILE", "mobile"),
            ("DOWNLOAD_SIZE_LIMIT_MB", "10"),
            ("FETCH_TIMEOUT_SECS", "5"),
        ]))
        .unwrap();
        assert_eq!(config.domains, vec!["example.com", "other.org"]);
        assert_eq!(config.media_extensions, vec!["mp4", "mkv"]);
        assert_eq!(config.default_profile, HeaderProfile::Mobile);
        assert_eq!(config.size_limit, 10 * 1024 * 1024);
        assert_eq!(config.fetch_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_template_placeholders_validated() {
        let err = ExtractionConfig::from_lookup(lookup_from(&[(
            "SHORT_LINK_API_TEMPLATE",
            "https://api.example/info",
        )]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "SHORT_LINK_API_TEMPLATE", .. }));

        let err = ExtractionConfig::from_lookup(lookup_from(&[
            ("MARKER_FIELDS", "fid,sign"),
            ("MARKER_API_TEMPLATE", "https://api.example/list?fid={fid}"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MARKER_API_TEMPLATE", .. }));

        let ok = ExtractionConfig::from_lookup(lookup_from(&[
            ("MARKER_FIELDS", "fid,sign"),
            ("MARKER_API_TEMPLATE", "https://api.example/list?fid={fid}&sign={sign}"),
        ]))
        .unwrap();
        assert_eq!(ok.marker_fields.1, "sign");
    }

    #[test]
    fn test_invalid_number() {
        let err = ExtractionConfig::from_lookup(lookup_from(&[("DOWNLOAD_CHUNK_BYTES", "lots")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DOWNLOAD_CHUNK_BYTES", .. }));
    }

    #[test]
    fn test_bot_config_requires_token() {
        let err = BotConfig::from_lookup(lookup_from(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("TELOXIDE_TOKEN"));

        let config = BotConfig::from_lookup(lookup_from(&[
            ("TELOXIDE_TOKEN", "123:abc"),
            ("MAX_UPLOAD_MB", "20"),
            ("ADMIN_CHAT_ID", "-100200"),
        ]))
        .unwrap();
        assert_eq!(config.max_concurrent, 3);
        assert_eq!(config.max_upload_bytes, 20 * 1024 * 1024);
        assert_eq!(config.admin_chat_id, Some(-100200));
    }

    #[test]
    fn test_megabyte_overflow_rejected() {
        let huge = u64::MAX.to_string();

        let err = ExtractionConfig::from_lookup(lookup_from(&[("DOWNLOAD_SIZE_LIMIT_MB", huge.as_str())])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DOWNLOAD_SIZE_LIMIT_MB", .. }));

        let err = BotConfig::from_lookup(lookup_from(&[("TELOXIDE_TOKEN", "123:abc"), ("MAX_UPLOAD_MB", huge.as_str())]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "MAX_UPLOAD_MB", .. }));

        // Largest value that still fits.
        let fits = (u64::MAX / MIB).to_string();
        let config = ExtractionConfig::from_lookup(lookup_from(&[("DOWNLOAD_SIZE_LIMIT_MB", fits.as_str())])).unwrap();
        assert_eq!(config.size_limit, (u64::MAX / MIB) * MIB);
    }
}
