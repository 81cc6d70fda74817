//! Scripted transcription engine

use async_trait::async_trait;
use cadash_coord::models::TranscriptSegment;
use cadash_coord::upload::{AudioFile, TranscriptionEngine, TranscriptionResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

#[derive(Debug, Clone)]
pub enum Script {
    Succeed(TranscriptionResult),
    Fail(String),
    Empty,
}

pub struct ScriptedEngine {
    script: Mutex<Script>,
    calls: AtomicUsize,
    refreshes: AtomicUsize,
    speakers: u32,
    gate: Option<Arc<Notify>>,
}

impl ScriptedEngine {
    pub fn new(script: Script) -> Self {
        Self {
            script: Mutex::new(script),
            calls: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            speakers: 2,
            gate: None,
        }
    }

    /// Succeeds with a short two-segment support call
    pub fn succeeding() -> Self {
        Self::new(Script::Succeed(sample_result()))
    }

    /// Transcription blocks until the returned handle is notified
    pub fn gated(mut self) -> (Self, Arc<Notify>) {
        let gate = Arc::new(Notify::new());
        self.gate = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn set_script(&self, script: Script) {
        *self.script.lock().unwrap() = script;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }
}

pub fn sample_result() -> TranscriptionResult {
    TranscriptionResult {
        text: "Thanks for calling. I have a question about pricing and my invoice. Great, thanks for the help!"
            .to_string(),
        segments: vec![
            TranscriptSegment {
                start: 0.0,
                end: 6.0,
                text: "Thanks for calling.".to_string(),
                speaker: Some("agent".to_string()),
            },
            TranscriptSegment {
                start: 6.0,
                end: 42.5,
                text: "I have a question about pricing and my invoice. Great, thanks for the help!"
                    .to_string(),
                speaker: Some("customer".to_string()),
            },
        ],
        speaker_count: None,
    }
}

#[async_trait]
impl TranscriptionEngine for ScriptedEngine {
    async fn transcribe(&self, _file: &AudioFile) -> anyhow::Result<Option<TranscriptionResult>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let script = self.script.lock().unwrap().clone();
        match script {
            Script::Succeed(result) => Ok(Some(result)),
            Script::Fail(message) => Err(anyhow::anyhow!(message)),
            Script::Empty => Ok(None),
        }
    }

    fn speaker_count(&self) -> u32 {
        self.speakers
    }

    fn force_refresh_local_cache(&self) {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
    }
}
