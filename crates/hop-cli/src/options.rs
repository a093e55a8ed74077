use anyhow::Context;
use hop_redirector::{HistorySettings, DEFAULT_STATS_PAGE_LIMIT};
use hop_shortener::{ShortenerSettings, DEFAULT_BASE_URL};
use hop_storage::retention::{DEFAULT_ACTIVITY_CAPACITY, DEFAULT_ERROR_CAPACITY};
use hop_storage::LogRetention;
use hop_throttle::{ThrottleSettings, DEFAULT_LIMIT, DEFAULT_WINDOW};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Runtime options, read from an optional JSON file.
///
/// Keys missing from the file keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    pub throttle_limit: u32,
    pub throttle_window_ms: u64,
    pub stats_page_limit: u32,
    pub base_url: String,
    pub activity_log_capacity: usize,
    pub error_log_capacity: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            throttle_limit: DEFAULT_LIMIT,
            throttle_window_ms: DEFAULT_WINDOW.as_millis() as u64,
            stats_page_limit: DEFAULT_STATS_PAGE_LIMIT,
            base_url: DEFAULT_BASE_URL.to_string(),
            activity_log_capacity: DEFAULT_ACTIVITY_CAPACITY,
            error_log_capacity: DEFAULT_ERROR_CAPACITY,
        }
    }
}

impl Options {
    /// Reads the options file, falling back to the defaults when there is no
    /// file or it cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::default();
        };
        match Self::read(path) {
            Ok(options) => options,
            Err(e) => {
                warn!(error = %format!("{e:#}"), "using default options");
                Self::default()
            }
        }
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read options file {}", path.display()))?;
        Self::from_json(&raw)
            .with_context(|| format!("failed to parse options file {}", path.display()))
    }

    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    pub fn throttle(&self) -> ThrottleSettings {
        ThrottleSettings::builder()
            .limit(self.throttle_limit)
            .window(Duration::from_millis(self.throttle_window_ms))
            .build()
    }

    pub fn shortener(&self) -> ShortenerSettings {
        ShortenerSettings::builder()
            .base_url(self.base_url.as_str())
            .build()
    }

    pub fn history(&self) -> HistorySettings {
        HistorySettings::builder()
            .stats_page_limit(self.stats_page_limit)
            .build()
    }

    pub fn retention(&self) -> LogRetention {
        LogRetention::builder()
            .activity(self.activity_log_capacity)
            .error(self.error_log_capacity)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_keys_keep_defaults() {
        let options = Options::from_json(r#"{"throttle_limit": 3}"#).unwrap();
        assert_eq!(options.throttle_limit, 3);
        assert_eq!(options.throttle_window_ms, 86_400_000);
        assert_eq!(options.stats_page_limit, 20);
        assert_eq!(options.base_url, "http://kili.us");
    }

    #[test]
    fn no_file_means_defaults() {
        assert_eq!(Options::load(None), Options::default());
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let path = Path::new("/nonexistent/hop-options.json");
        let err = Options::read(path).unwrap_err();
        assert!(err.to_string().contains("hop-options.json"));
        assert_eq!(Options::load(Some(path)), Options::default());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("hop-options-{}.json", std::process::id()));
        std::fs::write(&path, "{ not json").unwrap();

        let loaded = Options::load(Some(&path));
        let read = Options::read(&path);
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded, Options::default());
        assert!(read.is_err());
    }

    #[test]
    fn reads_file() {
        let path = std::env::temp_dir().join(format!("hop-options-ok-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"stats_page_limit": 5}"#).unwrap();

        let loaded = Options::load(Some(&path));
        std::fs::remove_file(&path).unwrap();

        assert_eq!(loaded.stats_page_limit, 5);
        assert_eq!(loaded.throttle_limit, 25);
    }

    #[test]
    fn converts_to_settings() {
        let options = Options::from_json(
            r#"{"throttle_window_ms": 1500, "base_url": "https://hop.example", "error_log_capacity": 7}"#,
        )
        .unwrap();

        let throttle = options.throttle();
        assert_eq!(throttle.limit, 25);
        assert_eq!(throttle.window, Duration::from_millis(1500));
        assert_eq!(options.shortener().base_url, "https://hop.example");
        assert_eq!(options.history().stats_page_limit, 20);
        assert_eq!(options.retention().error, 7);
        assert_eq!(options.retention().activity, 50_000);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(Options::from_json(r#"{"throttle_limit": "many"}"#).is_err());
    }
}
