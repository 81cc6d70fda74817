//! Single-flight upload processing
//!
//! Progress reported to the caller:
//!
//! | progress | meaning                                       |
//! |----------|-----------------------------------------------|
//! | 10       | accepted                                      |
//! | 20       | transcription started                         |
//! | 50       | transcription complete, text available        |
//! | 70       | persisting                                    |
//! | 90       | persisted, trend updates started              |
//! | 100      | complete                                      |
//!
//! Any failure ends the job with an `error` status carrying the last
//! reported progress. The processing lock is an RAII guard, so it is
//! released on every exit path including a dropped future.

use super::analysis::{analyze, audio_duration_secs, Sentiment};
use super::dispatch::ThrottledDispatcher;
use super::file::AudioFile;
use super::job::StatusUpdate;
use super::transcriber::TranscriptionEngine;
use super::trends::TrendUpdater;
use crate::config::UploadConfig;
use crate::error::{CoordError, CoordResult};
use crate::fetch::FetchCoordinator;
use crate::models::NewTranscript;
use crate::reporting::{ErrorReporter, TracingErrorReporter};
use crate::store::RemoteStore;
use cadash_common::events::{DashboardEvent, EventBus};
use cadash_common::time::{Clock, SystemClock};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Held for the duration of one job
struct ProcessingLock<'a>(&'a AtomicBool);

impl<'a> ProcessingLock<'a> {
    fn try_acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ProcessingLock<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct UploadPipeline {
    engine: Arc<dyn TranscriptionEngine>,
    store: Arc<dyn RemoteStore>,
    dispatcher: ThrottledDispatcher,
    reporter: Arc<dyn ErrorReporter>,
    trends: Arc<TrendUpdater>,
    fetch: Option<Arc<FetchCoordinator>>,
    config: UploadConfig,
    processing: AtomicBool,
    assigned_user_id: Mutex<Option<String>>,
    background: TaskTracker,
}

impl UploadPipeline {
    pub fn new(
        engine: Arc<dyn TranscriptionEngine>,
        store: Arc<dyn RemoteStore>,
        events: EventBus,
        config: UploadConfig,
    ) -> Self {
        let trends = TrendUpdater::new(Arc::clone(&store), Arc::new(SystemClock), &config);
        Self {
            engine,
            dispatcher: ThrottledDispatcher::new(events, config.event_throttle()),
            store,
            reporter: Arc::new(TracingErrorReporter),
            trends: Arc::new(trends),
            fetch: None,
            config,
            processing: AtomicBool::new(false),
            assigned_user_id: Mutex::new(None),
            background: TaskTracker::new(),
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Clock for trend timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.trends = Arc::new(TrendUpdater::new(Arc::clone(&self.store), clock, &self.config));
        self
    }

    /// Coordinator whose dedup state is invalidated after each saved upload
    pub fn with_fetch_coordinator(mut self, coordinator: Arc<FetchCoordinator>) -> Self {
        self.fetch = Some(coordinator);
        self
    }

    /// Owner recorded on subsequently uploaded transcripts
    pub fn set_assigned_user_id(&self, user_id: Option<String>) {
        debug!(user_id = ?user_id, "Assigned user for uploads");
        *self.assigned_user_id.lock().unwrap_or_else(|e| e.into_inner()) = user_id;
    }

    pub fn assigned_user_id(&self) -> Option<String> {
        self.assigned_user_id
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::Acquire)
    }

    /// Wait until all background trend updates spawned so far have finished
    pub async fn wait_for_background(&self) {
        self.background.close();
        self.background.wait().await;
        self.background.reopen();
    }

    /// Transcribe and save one file, returning the new transcript id
    ///
    /// Fails fast with `FileTooLarge` (before taking the lock) or
    /// `PipelineBusy`. Both are also reported to `on_status` as an error at
    /// progress 0.
    pub async fn process_file<F>(&self, file: &AudioFile, mut on_status: F) -> CoordResult<String>
    where
        F: FnMut(StatusUpdate) + Send,
    {
        if file.size_bytes > self.config.max_file_size_bytes {
            let err = CoordError::FileTooLarge {
                size_bytes: file.size_bytes,
                max_bytes: self.config.max_file_size_bytes,
            };
            info!(file = %file.name, size_bytes = file.size_bytes, "Rejecting oversized upload");
            on_status(StatusUpdate::error(0, err.to_string()));
            self.reporter.handle_error(&err, "UploadPipeline::process_file");
            return Err(err);
        }

        let Some(_lock) = ProcessingLock::try_acquire(&self.processing) else {
            debug!(file = %file.name, "Pipeline busy");
            let err = CoordError::PipelineBusy;
            on_status(StatusUpdate::error(0, err.to_string()));
            return Err(err);
        };

        let mut progress = 0u8;
        let mut report = |update: StatusUpdate| {
            progress = update.progress;
            on_status(update);
        };

        let outcome = self.run(file, &mut report).await;
        match outcome {
            Ok(id) => Ok(id),
            Err(err) => {
                warn!(file = %file.name, error = %err, "Upload failed");
                self.reporter.handle_error(&err, "UploadPipeline::process_file");
                on_status(StatusUpdate::error(progress, err.to_string()));
                Err(err)
            }
        }
    }

    async fn run<F>(&self, file: &AudioFile, report: &mut F) -> CoordResult<String>
    where
        F: FnMut(StatusUpdate) + Send,
    {
        report(StatusUpdate::processing(10));
        info!(file = %file.name, size_kb = file.size_bytes / 1024, "Processing upload");
        self.dispatcher.emit(DashboardEvent::BulkUploadStarted {
            filename: file.name.clone(),
            size_bytes: file.size_bytes,
        });

        report(StatusUpdate::processing(20));
        let result = self
            .engine
            .transcribe(file)
            .await
            .map_err(|e| CoordError::TranscriptionFailed(format!("{:#}", e)))?
            .ok_or_else(|| {
                CoordError::TranscriptionFailed("engine returned no result".to_string())
            })?;
        report(StatusUpdate::processing(50).with_result(result.text.clone()));

        report(StatusUpdate::processing(70).with_result(result.text.clone()));
        let analysis = analyze(&result.text, self.config.max_keywords);
        let duration = audio_duration_secs(&result.segments, file.size_bytes);
        let user_id = self.assigned_user_id();
        let speaker_count = result
            .speaker_count
            .unwrap_or_else(|| self.engine.speaker_count());
        let transcript = NewTranscript {
            filename: Some(file.name.clone()),
            text: result.text.clone(),
            keywords: analysis.keywords.clone(),
            sentiment: Some(analysis.sentiment.as_str().to_string()),
            call_score: Some(analysis.call_score),
            duration: Some(duration),
            user_id: user_id.clone(),
            speaker_count: Some(speaker_count),
            transcript_segments: (!result.segments.is_empty()).then(|| result.segments.clone()),
        };
        let id = self.persist(&transcript).await?;
        report(
            StatusUpdate::processing(90)
                .with_result(result.text.clone())
                .with_transcript_id(id.clone()),
        );

        self.spawn_trend_updates(
            analysis.keywords,
            analysis.sentiment,
            analysis.call_score,
            user_id,
        );

        if let Some(coordinator) = &self.fetch {
            coordinator.invalidate("transcript uploaded");
        }
        self.engine.force_refresh_local_cache();

        self.dispatcher.emit_immediate(DashboardEvent::TranscriptCreated {
            id: id.clone(),
            filename: Some(file.name.clone()),
            duration_secs: Some(duration),
        });

        report(
            StatusUpdate::complete()
                .with_result(result.text)
                .with_transcript_id(id.clone()),
        );
        info!(file = %file.name, id = %id, duration_secs = duration, "Upload complete");
        Ok(id)
    }

    async fn persist(&self, transcript: &NewTranscript) -> CoordResult<String> {
        let row = transcript
            .to_row()
            .map_err(|e| CoordError::PersistenceFailed(e.to_string()))?;
        let stored = self
            .store
            .insert(&self.config.transcript_table, row)
            .await
            .map_err(|e| CoordError::PersistenceFailed(e.to_string()))?;
        stored
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CoordError::PersistenceFailed("store returned no id".to_string()))
    }

    /// Fire-and-forget: failures go to the reporter, never to the caller
    fn spawn_trend_updates(
        &self,
        keywords: Vec<String>,
        sentiment: Sentiment,
        call_score: i32,
        user_id: Option<String>,
    ) {
        let trends = Arc::clone(&self.trends);
        let reporter = Arc::clone(&self.reporter);
        self.background.spawn(async move {
            let (keyword_result, sentiment_result) = futures::join!(
                trends.update_keyword_trends(&keywords, sentiment),
                trends.update_sentiment_trends(sentiment, call_score, user_id.as_deref()),
            );
            for result in [keyword_result, sentiment_result] {
                if let Err(err) = result {
                    reporter.handle_error(&err, "UploadPipeline::update_trends");
                }
            }
        });
    }
}
