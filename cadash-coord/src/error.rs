//! Error types for the coordination layer
//!
//! Severity categories:
//! - Validation (`FileTooLarge`): fatal for the call, no lock taken
//! - Transient (`PipelineBusy`, `RateLimitExceeded`): retry later or queue
//! - Job-fatal (`TranscriptionFailed`, `PersistenceFailed`): job ends in `error`
//! - Logged only (`BackgroundTaskFailed`): never fails the owning job
//! - Read-path (`RemoteQuery`): surfaced as a string, prior data kept

use crate::store::StoreError;
use thiserror::Error;

/// Coordination error type
#[derive(Debug, Error)]
pub enum CoordError {
    /// Upload exceeds the configured size ceiling
    #[error("File too large: {size_bytes} bytes (maximum is {max_bytes} bytes)")]
    FileTooLarge { size_bytes: u64, max_bytes: u64 },

    /// Another file is currently being processed by this pipeline
    #[error("Another file is currently being processed")]
    PipelineBusy,

    /// No token available in the named bucket
    #[error("Rate limit exceeded for bucket '{0}'")]
    RateLimitExceeded(String),

    /// Transcription engine failed or returned nothing
    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    /// Transcript could not be saved
    #[error("Failed to save transcript: {0}")]
    PersistenceFailed(String),

    /// Fire-and-forget follow-up work failed
    #[error("Background task '{task}' failed: {message}")]
    BackgroundTaskFailed { task: String, message: String },

    /// Remote list query failed
    #[error("Remote query failed: {0}")]
    RemoteQuery(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Remote store error
    #[error(transparent)]
    Store(#[from] StoreError),

    /// cadash-common error
    #[error("Common error: {0}")]
    Common(#[from] cadash_common::Error),
}

impl CoordError {
    /// Transient conditions callers should retry or queue rather than surface
    pub fn is_transient(&self) -> bool {
        matches!(self, CoordError::PipelineBusy | CoordError::RateLimitExceeded(_))
    }
}

/// Result type for coordination operations
pub type CoordResult<T> = Result<T, CoordError>;
