//! Upload job state as seen by the caller
//!
//! The pipeline does not keep jobs; it reports [`StatusUpdate`]s and the
//! caller folds them into its own [`UploadJob`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    #[default]
    Idle,
    Processing,
    Complete,
    Error,
}

impl UploadStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadStatus::Complete | UploadStatus::Error)
    }
}

/// One progress report from the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub status: UploadStatus,
    /// 0-100
    pub progress: u8,
    /// Transcript text once transcription has finished
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Persisted record id once saved
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcript_id: Option<String>,
}

impl StatusUpdate {
    pub fn processing(progress: u8) -> Self {
        Self {
            status: UploadStatus::Processing,
            progress,
            result: None,
            error: None,
            transcript_id: None,
        }
    }

    pub fn complete() -> Self {
        Self {
            status: UploadStatus::Complete,
            ..Self::processing(100)
        }
    }

    pub fn error(progress: u8, message: impl Into<String>) -> Self {
        Self {
            status: UploadStatus::Error,
            error: Some(message.into()),
            ..Self::processing(progress)
        }
    }

    pub fn with_result(mut self, text: impl Into<String>) -> Self {
        self.result = Some(text.into());
        self
    }

    pub fn with_transcript_id(mut self, id: impl Into<String>) -> Self {
        self.transcript_id = Some(id.into());
        self
    }
}

/// Caller-owned record of one file's progress
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadJob {
    pub filename: String,
    pub status: UploadStatus,
    pub progress: u8,
    pub result: Option<String>,
    pub error: Option<String>,
    pub transcript_id: Option<String>,
}

impl UploadJob {
    pub fn new(filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..Default::default()
        }
    }

    /// Fold an update into the job
    ///
    /// Returns `false` (and changes nothing) for updates arriving after a
    /// terminal state or moving progress backwards.
    pub fn apply(&mut self, update: &StatusUpdate) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        if update.status != UploadStatus::Error && update.progress < self.progress {
            return false;
        }

        self.status = update.status;
        self.progress = update.progress.min(100);
        if update.result.is_some() {
            self.result = update.result.clone();
        }
        if update.transcript_id.is_some() {
            self.transcript_id = update.transcript_id.clone();
        }
        self.error = update.error.clone();
        true
    }
}
