//! Test helper utilities
//!
//! Shared collaborators for cadash-coord integration tests

#![allow(dead_code)]

pub mod engine;
pub mod store;

pub use engine::ScriptedEngine;
pub use store::CountingStore;

use cadash_common::time::ManualClock;
use cadash_coord::config::CoordConfig;
use cadash_coord::error::CoordError;
use cadash_coord::rate_limiter::BucketConfig;
use cadash_coord::reporting::ErrorReporter;
use chrono::{DateTime, TimeZone, Utc};
use std::sync::{Arc, Mutex};

/// Wall-clock instant all fetch tests start from
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 17, 9, 30, 0).unwrap()
}

pub fn manual_clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(test_now()))
}

/// Defaults, except a bucket large enough that admission never interferes
pub fn test_config() -> CoordConfig {
    let mut config = CoordConfig::default();
    config.fetch.rate_limit = BucketConfig {
        capacity: 1000,
        refill_per_second: 1000.0,
        max_wait_ms: 0,
    };
    config
}

/// Error reporter that remembers what it was told
#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<(String, String)>>,
}

impl RecordingReporter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// `(context, message)` pairs in report order
    pub fn reports(&self) -> Vec<(String, String)> {
        self.reports.lock().unwrap().clone()
    }

    pub fn contexts(&self) -> Vec<String> {
        self.reports().into_iter().map(|(context, _)| context).collect()
    }
}

impl ErrorReporter for RecordingReporter {
    fn handle_error(&self, error: &CoordError, context: &str) {
        self.reports
            .lock()
            .unwrap()
            .push((context.to_string(), error.to_string()));
    }
}

pub fn init_test_logging() {
    let _ = cadash_common::logging::init_tracing(&cadash_common::config::LoggingConfig {
        level: "debug".to_string(),
        ..Default::default()
    });
}
