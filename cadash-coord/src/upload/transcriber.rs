//! Transcription engine seam

use super::file::AudioFile;
use crate::models::TranscriptSegment;
use async_trait::async_trait;

/// Engine output for one file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptionResult {
    pub text: String,
    pub segments: Vec<TranscriptSegment>,
    /// Detected speakers, when the engine reports them per file
    pub speaker_count: Option<u32>,
}

/// Speech-to-text backend
///
/// Implementations wrap foreign services, so errors are opaque `anyhow`
/// errors. `Ok(None)` means the engine produced nothing usable.
#[async_trait]
pub trait TranscriptionEngine: Send + Sync {
    async fn transcribe(&self, file: &AudioFile) -> anyhow::Result<Option<TranscriptionResult>>;

    /// Configured speaker count, used when a result carries none
    fn speaker_count(&self) -> u32;

    /// Drop any locally cached transcript list
    fn force_refresh_local_cache(&self);
}
