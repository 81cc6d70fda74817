//! Configuration for the coordination layer
//!
//! Loaded from TOML (see `cadash_common::config` for file resolution). Every
//! interval is a tunable: the defaults apply backpressure but none of them is
//! a correctness constraint.
//!
//! ```toml
//! [logging]
//! level = "info"
//!
//! [fetch]
//! page_size = 10
//! min_request_interval_ms = 2000
//!
//! [fetch.rate_limit]
//! capacity = 5
//! refill_per_second = 1.0
//!
//! [upload]
//! max_file_size_bytes = 52428800
//! ```

use crate::error::{CoordError, CoordResult};
use crate::fetch::filter::FilterDefaults;
use crate::rate_limiter::BucketConfig;
use cadash_common::config::LoggingConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Bucket shared by every transcript list fetch
pub const FETCH_BUCKET: &str = "transcript-fetch";

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordConfig {
    pub logging: LoggingConfig,
    pub fetch: FetchConfig,
    pub upload: UploadConfig,
    pub store: StoreConfig,
}

impl CoordConfig {
    /// Load from the resolved config file, falling back to defaults
    pub fn load(explicit: Option<&Path>) -> CoordResult<Self> {
        let config: CoordConfig = cadash_common::config::load_or_default(explicit)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would disable the coordinator outright
    pub fn validate(&self) -> CoordResult<()> {
        if self.fetch.page_size == 0 {
            return Err(CoordError::InvalidConfig(
                "fetch.page_size must be at least 1".to_string(),
            ));
        }
        if self.fetch.recent_fingerprint_capacity == 0 {
            return Err(CoordError::InvalidConfig(
                "fetch.recent_fingerprint_capacity must be at least 1".to_string(),
            ));
        }
        self.fetch.rate_limit.validate()?;
        if self.upload.max_file_size_bytes == 0 {
            return Err(CoordError::InvalidConfig(
                "upload.max_file_size_bytes must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// `[fetch]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Remote table holding transcripts
    pub table: String,
    /// Page size used when a filter does not set one
    pub page_size: u32,
    /// Length of the default trailing date window
    pub default_window_days: i64,
    /// Default window end is rounded up to this many seconds (0 = exact now)
    pub default_window_granularity_secs: i64,
    /// Same-fingerprint requests closer than this are skipped
    pub min_request_interval_ms: u64,
    /// Requests from one call site closer than this are skipped
    pub context_min_interval_ms: u64,
    /// A forced request may bypass the in-flight slot after this long
    pub forced_grace_ms: u64,
    /// Delay between completion and clearing the in-flight flags
    pub settle_delay_ms: u64,
    /// Quiet period before a changed filter triggers a fetch
    pub debounce_ms: u64,
    /// Maximum remembered recent fingerprints
    pub recent_fingerprint_capacity: usize,
    /// How long a fingerprint suppresses duplicates
    pub recent_fingerprint_ttl_ms: u64,
    /// Admission bucket for list fetches
    pub rate_limit: BucketConfig,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            table: "call_transcripts".to_string(),
            page_size: 10,
            default_window_days: 30,
            default_window_granularity_secs: 60,
            min_request_interval_ms: 2000,
            context_min_interval_ms: 2500,
            forced_grace_ms: 5000,
            settle_delay_ms: 500,
            debounce_ms: 1500,
            recent_fingerprint_capacity: 64,
            recent_fingerprint_ttl_ms: 10_000,
            rate_limit: BucketConfig {
                capacity: 5,
                refill_per_second: 1.0,
                max_wait_ms: 0,
            },
        }
    }
}

impl FetchConfig {
    pub fn filter_defaults(&self) -> FilterDefaults {
        FilterDefaults {
            page_size: self.page_size,
            window_days: self.default_window_days,
            window_granularity_secs: self.default_window_granularity_secs,
        }
    }

    pub fn min_request_interval(&self) -> Duration {
        Duration::from_millis(self.min_request_interval_ms)
    }

    pub fn context_min_interval(&self) -> Duration {
        Duration::from_millis(self.context_min_interval_ms)
    }

    pub fn forced_grace(&self) -> Duration {
        Duration::from_millis(self.forced_grace_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn recent_fingerprint_ttl(&self) -> Duration {
        Duration::from_millis(self.recent_fingerprint_ttl_ms)
    }
}

/// `[upload]` section
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Largest accepted file
    pub max_file_size_bytes: u64,
    /// Minimum spacing of throttled lifecycle events
    pub event_throttle_ms: u64,
    /// Table receiving persisted transcripts
    pub transcript_table: String,
    pub keyword_trends_table: String,
    pub sentiment_trends_table: String,
    /// Keywords kept per transcript
    pub max_keywords: usize,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size_bytes: 50 * 1024 * 1024,
            event_throttle_ms: 300,
            transcript_table: "call_transcripts".to_string(),
            keyword_trends_table: "keyword_trends".to_string(),
            sentiment_trends_table: "sentiment_trends".to_string(),
            max_keywords: 10,
        }
    }
}

impl UploadConfig {
    pub fn event_throttle(&self) -> Duration {
        Duration::from_millis(self.event_throttle_ms)
    }
}

/// `[store]` section (HTTP remote store)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// REST endpoint root, e.g. `https://project.supabase.co/rest/v1`
    pub base_url: String,
    /// API key sent as `apikey` and bearer token
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:54321/rest/v1".to_string(),
            api_key: None,
            timeout_secs: 15,
            connect_timeout_secs: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_constants() {
        let config = CoordConfig::default();
        assert_eq!(config.fetch.page_size, 10);
        assert_eq!(config.fetch.min_request_interval(), Duration::from_millis(2000));
        assert_eq!(config.fetch.context_min_interval(), Duration::from_millis(2500));
        assert_eq!(config.fetch.forced_grace(), Duration::from_secs(5));
        assert_eq!(config.fetch.settle_delay(), Duration::from_millis(500));
        assert_eq!(config.fetch.debounce(), Duration::from_millis(1500));
        assert_eq!(config.fetch.rate_limit.capacity, 5);
        assert_eq!(config.upload.max_file_size_bytes, 52_428_800);
        assert_eq!(config.upload.event_throttle(), Duration::from_millis(300));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_overrides() {
        let toml_text = r#"
            [fetch]
            page_size = 25
            debounce_ms = 200

            [fetch.rate_limit]
            capacity = 20
            refill_per_second = 4.0

            [upload]
            max_file_size_bytes = 1024
        "#;
        let config: CoordConfig = toml::from_str(toml_text).unwrap();
        assert_eq!(config.fetch.page_size, 25);
        assert_eq!(config.fetch.debounce(), Duration::from_millis(200));
        // Unspecified fields keep their defaults
        assert_eq!(config.fetch.settle_delay_ms, 500);
        assert_eq!(config.fetch.rate_limit.capacity, 20);
        assert_eq!(config.upload.max_file_size_bytes, 1024);
        assert_eq!(config.upload.transcript_table, "call_transcripts");
    }

    #[test]
    fn test_validate_rejects_zero_page_size() {
        let mut config = CoordConfig::default();
        config.fetch.page_size = 0;
        assert!(matches!(config.validate(), Err(CoordError::InvalidConfig(_))));
    }

    #[test]
    fn test_validate_rejects_non_positive_refill() {
        let mut config = CoordConfig::default();
        config.fetch.rate_limit.refill_per_second = 0.0;
        assert!(config.validate().is_err());
    }
}
