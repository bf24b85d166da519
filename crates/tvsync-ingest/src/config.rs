//! Ingestion configuration
//!
//! Everything is read from the environment (after loading `.env` through
//! `dotenvy`) and can be overridden from the command line.

use anyhow::Context;
use std::path::PathBuf;
use std::time::Duration;

use crate::driver::DriverOptions;
use crate::store::DbConfig;

/// Default API endpoint; the id is appended directly.
pub const DEFAULT_BASE_URL: &str = "https://api.themoviedb.org/3/tv/";

/// Default language tag sent with every request.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Default number of ids per committed batch.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default per-request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default pause between consecutive requests (none).
pub const DEFAULT_REQUEST_DELAY_MS: u64 = 0;

/// Remote API settings
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub api_key: String,
    pub language: String,
    pub request_timeout_secs: u64,
}

impl ApiConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let api_key = std::env::var("TVSYNC_API_KEY").context("TVSYNC_API_KEY must be set")?;

        Ok(Self {
            base_url: std::env::var("TVSYNC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            api_key,
            language: std::env::var("TVSYNC_LANGUAGE")
                .unwrap_or_else(|_| DEFAULT_LANGUAGE.to_string()),
            request_timeout_secs: std::env::var("TVSYNC_REQUEST_TIMEOUT_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_url.is_empty() {
            anyhow::bail!("TVSYNC_BASE_URL cannot be empty");
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            anyhow::bail!("TVSYNC_BASE_URL must be an http(s) URL, got: {}", self.base_url);
        }
        if self.api_key.trim().is_empty() {
            anyhow::bail!("TVSYNC_API_KEY cannot be empty");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("TVSYNC_REQUEST_TIMEOUT_SECS must be greater than 0");
        }
        Ok(())
    }
}

/// Full configuration for an ingestion run
#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub api: ApiConfig,
    pub database: DbConfig,
    /// Inclusive upper bound of the id scan
    pub total: i64,
    /// First id to fetch instead of the resumption point
    pub start_id: Option<i64>,
    pub batch_size: usize,
    pub request_delay_ms: u64,
    /// Where summary, error and dead-letter files are written
    pub artifact_dir: PathBuf,
    pub skip_dedup: bool,
}

impl IngestConfig {
    /// Load and validate from environment variables
    ///
    /// `TVSYNC_API_KEY`, `TVSYNC_TOTAL` and `DATABASE_URL` are required.
    pub fn from_env() -> anyhow::Result<Self> {
        let config = Self::load_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables without validating, so command line
    /// overrides can be applied first. A missing `TVSYNC_TOTAL` becomes 0.
    pub fn load_env() -> anyhow::Result<Self> {
        let total = match std::env::var("TVSYNC_TOTAL") {
            Ok(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("TVSYNC_TOTAL must be an integer, got: {}", raw))?,
            Err(_) => 0,
        };

        Ok(Self {
            api: ApiConfig::from_env()?,
            database: DbConfig::from_env()?,
            total,
            start_id: match std::env::var("TVSYNC_START_ID") {
                Ok(raw) => Some(
                    raw.trim()
                        .parse()
                        .with_context(|| format!("TVSYNC_START_ID must be an integer, got: {}", raw))?,
                ),
                Err(_) => None,
            },
            batch_size: std::env::var("TVSYNC_BATCH_SIZE")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BATCH_SIZE),
            request_delay_ms: std::env::var("TVSYNC_REQUEST_DELAY_MS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_REQUEST_DELAY_MS),
            artifact_dir: std::env::var("TVSYNC_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from(".")),
            skip_dedup: std::env::var("TVSYNC_SKIP_DEDUP")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(false),
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        self.api.validate()?;
        self.database.validate()?;

        if self.total < 1 {
            anyhow::bail!("TVSYNC_TOTAL must be at least 1, got: {}", self.total);
        }
        if let Some(start_id) = self.start_id {
            if start_id < 1 {
                anyhow::bail!("TVSYNC_START_ID must be at least 1, got: {}", start_id);
            }
        }
        if self.batch_size == 0 {
            anyhow::bail!("TVSYNC_BATCH_SIZE must be greater than 0");
        }
        Ok(())
    }

    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }

    pub fn driver_options(&self) -> DriverOptions {
        DriverOptions {
            end_id: self.total,
            batch_size: self.batch_size,
            request_delay: self.request_delay(),
            start_id: self.start_id,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serial_test::serial;

    fn config() -> IngestConfig {
        IngestConfig {
            api: ApiConfig {
                base_url: DEFAULT_BASE_URL.to_string(),
                api_key: "key".to_string(),
                language: DEFAULT_LANGUAGE.to_string(),
                request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            },
            database: DbConfig::default(),
            total: 1000,
            start_id: None,
            batch_size: DEFAULT_BATCH_SIZE,
            request_delay_ms: 0,
            artifact_dir: PathBuf::from("."),
            skip_dedup: false,
        }
    }

    const ENV_KEYS: [&str; 9] = [
        "TVSYNC_API_KEY",
        "TVSYNC_TOTAL",
        "TVSYNC_START_ID",
        "TVSYNC_BASE_URL",
        "TVSYNC_LANGUAGE",
        "TVSYNC_BATCH_SIZE",
        "TVSYNC_REQUEST_DELAY_MS",
        "TVSYNC_SKIP_DEDUP",
        "DATABASE_URL",
    ];

    fn clear_env() {
        for key in ENV_KEYS {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(config().validate().is_ok());
    }

    #[test]
    fn test_zero_batch_size_is_invalid() {
        let mut config = config();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_total_is_invalid() {
        let mut config = config();
        config.total = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_positive_start_id_is_invalid() {
        for start_id in [0, -2] {
            let mut config = config();
            config.start_id = Some(start_id);
            let err = config.validate().unwrap_err();
            assert!(err.to_string().contains("TVSYNC_START_ID"));
        }

        let mut config = config();
        config.start_id = Some(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_blank_api_key_is_invalid() {
        let mut config = config();
        config.api.api_key = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_base_url_must_be_http() {
        let mut config = config();
        config.api.base_url = "ftp://example.org/tv/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_driver_options() {
        let mut config = config();
        config.request_delay_ms = 250;
        config.start_id = Some(40);
        let options = config.driver_options();

        assert_eq!(options.end_id, 1000);
        assert_eq!(options.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(options.request_delay, Duration::from_millis(250));
        assert_eq!(options.start_id, Some(40));
    }

    #[test]
    #[serial]
    fn test_from_env() {
        clear_env();
        std::env::set_var("TVSYNC_API_KEY", "secret");
        std::env::set_var("TVSYNC_TOTAL", " 250 ");
        std::env::set_var("TVSYNC_BATCH_SIZE", "25");
        std::env::set_var("TVSYNC_START_ID", "12");
        std::env::set_var("TVSYNC_SKIP_DEDUP", "true");
        std::env::set_var("DATABASE_URL", "postgresql://localhost/tvsync_test");

        let config = IngestConfig::from_env().unwrap();
        assert_eq!(config.total, 250);
        assert_eq!(config.batch_size, 25);
        assert_eq!(config.start_id, Some(12));
        assert!(config.skip_dedup);
        assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.api.language, DEFAULT_LANGUAGE);

        clear_env();
    }

    #[test]
    #[serial]
    fn test_from_env_requires_total() {
        clear_env();
        std::env::set_var("TVSYNC_API_KEY", "secret");
        std::env::set_var("DATABASE_URL", "postgresql://localhost/tvsync_test");

        let err = IngestConfig::from_env().unwrap_err();
        assert!(err.to_string().contains("TVSYNC_TOTAL"));

        clear_env();
    }
}
