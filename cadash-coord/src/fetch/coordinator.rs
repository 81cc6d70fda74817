//! Deduplicating transcript list coordinator
//!
//! One [`FetchCoordinator`] is shared by every call site in the process; each
//! call site holds its own [`FetchContext`]. A fetch passes, in order:
//!
//! 1. the context's own in-flight check,
//! 2. admission from the `transcript-fetch` token bucket,
//! 3. the shared guards (global in-flight slot, same-request interval,
//!    per-context interval, recent fingerprints),
//!
//! and only then reaches the remote store. Rejections at any stage are
//! silent skips: the caller gets its current snapshot back and no error.
//!
//! Every issued request is stamped with a sequence number. A result is
//! applied only if its sequence is still the context's latest, so a late
//! response can never overwrite newer state.

use super::filter::TranscriptFilter;
use crate::config::{FetchConfig, FETCH_BUCKET};
use crate::error::{CoordError, CoordResult};
use crate::models::{NewTranscript, TranscriptPatch, TranscriptRecord};
use crate::rate_limiter::RateLimiterRegistry;
use crate::reporting::{ErrorReporter, TracingErrorReporter};
use crate::store::RemoteStore;
use cadash_common::events::{DashboardEvent, EventBus};
use cadash_common::time::{Clock, SystemClock};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// Why a fetch did not reach the remote store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// This context already has a request outstanding
    ContextInFlight,
    /// No token in the fetch bucket
    RateLimited,
    /// Another context's request holds the global slot
    GlobalInFlight,
    /// Same fingerprint as the last request, inside the minimum interval
    TooSoon,
    /// This context asked again inside its own interval
    ContextTooSoon,
    /// Fingerprint seen recently
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchDisposition {
    /// Query ran and its result was applied
    Issued { sequence: u64 },
    /// Query ran but a newer request or mutation replaced it first
    Superseded { sequence: u64 },
    Skipped(SkipReason),
}

/// A context's view of the transcript list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContextSnapshot {
    pub records: Vec<TranscriptRecord>,
    pub total_count: u64,
    pub error: Option<String>,
    pub loading: bool,
    pub current_page: u32,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchOutcome {
    pub disposition: FetchDisposition,
    pub snapshot: ContextSnapshot,
}

impl FetchOutcome {
    pub fn issued(&self) -> bool {
        matches!(self.disposition, FetchDisposition::Issued { .. })
    }

    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self.disposition {
            FetchDisposition::Skipped(reason) => Some(reason),
            _ => None,
        }
    }
}

/// Guard state shared by all contexts
#[derive(Debug, Default)]
struct SharedState {
    in_flight: usize,
    last_request_at: Option<Instant>,
    last_key: Option<String>,
    recent: VecDeque<(String, Instant)>,
}

impl SharedState {
    fn prune_recent(&mut self, now: Instant, ttl: Duration) {
        while let Some((_, seen)) = self.recent.front() {
            if now.duration_since(*seen) >= ttl {
                self.recent.pop_front();
            } else {
                break;
            }
        }
    }

    fn remember(&mut self, fingerprint: String, now: Instant, capacity: usize) {
        self.recent.retain(|(key, _)| *key != fingerprint);
        self.recent.push_back((fingerprint, now));
        while self.recent.len() > capacity {
            self.recent.pop_front();
        }
    }

    fn is_recent(&self, fingerprint: &str) -> bool {
        self.recent.iter().any(|(key, _)| key == fingerprint)
    }
}

#[derive(Debug)]
struct ContextState {
    in_flight: bool,
    mutations: u32,
    last_request_at: Option<Instant>,
    last_filter: Option<TranscriptFilter>,
    current_page: u32,
    latest_sequence: u64,
    records: Vec<TranscriptRecord>,
    total_count: u64,
    error: Option<String>,
}

impl Default for ContextState {
    fn default() -> Self {
        Self {
            in_flight: false,
            mutations: 0,
            last_request_at: None,
            last_filter: None,
            current_page: 1,
            latest_sequence: 0,
            records: Vec::new(),
            total_count: 0,
            error: None,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Process-wide fetch coordinator
pub struct FetchCoordinator {
    store: Arc<dyn RemoteStore>,
    limiter: Arc<RateLimiterRegistry>,
    events: EventBus,
    clock: Arc<dyn Clock>,
    reporter: Arc<dyn ErrorReporter>,
    config: FetchConfig,
    shared: Mutex<SharedState>,
    sequence: AtomicU64,
}

impl FetchCoordinator {
    pub fn new(
        store: Arc<dyn RemoteStore>,
        limiter: Arc<RateLimiterRegistry>,
        events: EventBus,
        config: FetchConfig,
    ) -> Self {
        Self {
            store,
            limiter,
            events,
            clock: Arc::new(SystemClock),
            reporter: Arc::new(TracingErrorReporter),
            config,
            shared: Mutex::new(SharedState::default()),
            sequence: AtomicU64::new(0),
        }
    }

    /// Wall clock used for default date windows
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// New call-site context sharing this coordinator's guards
    pub fn context(self: &Arc<Self>) -> FetchContext {
        FetchContext {
            coordinator: Arc::clone(self),
            state: Arc::new(Mutex::new(ContextState::default())),
        }
    }

    pub fn config(&self) -> &FetchConfig {
        &self.config
    }

    /// True while any context holds the global in-flight slot
    pub fn is_fetching(&self) -> bool {
        lock(&self.shared).in_flight > 0
    }

    /// Forget dedup history so the next read goes to the store
    ///
    /// Called after writes made outside a context (uploads). Emits
    /// `transcripts-invalidated`.
    pub fn invalidate(&self, reason: &str) {
        self.forget_requests();
        info!(reason, "Transcript list invalidated");
        self.events.emit_lossy(DashboardEvent::TranscriptsInvalidated {
            reason: reason.to_string(),
        });
    }

    fn forget_requests(&self) {
        let mut shared = lock(&self.shared);
        shared.last_key = None;
        shared.recent.clear();
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Run the shared guards and, if they pass, claim the in-flight slots
    fn admit(
        &self,
        context: &Mutex<ContextState>,
        filter: &TranscriptFilter,
        fingerprint: &str,
    ) -> Result<u64, SkipReason> {
        let now = Instant::now();
        let forced = filter.force;
        let mut shared = lock(&self.shared);
        shared.prune_recent(now, self.config.recent_fingerprint_ttl());

        let since_last = shared.last_request_at.map(|at| now.duration_since(at));

        if shared.in_flight > 0 {
            let starved = since_last.is_some_and(|elapsed| elapsed > self.config.forced_grace());
            if !(forced && starved) {
                return Err(SkipReason::GlobalInFlight);
            }
            debug!(fingerprint, "Forced fetch bypassing in-flight request");
        }

        let mut ctx = lock(context);

        if !forced {
            if shared.last_key.as_deref() == Some(fingerprint)
                && since_last.is_some_and(|elapsed| elapsed < self.config.min_request_interval())
            {
                return Err(SkipReason::TooSoon);
            }
            if ctx.last_request_at.is_some_and(|at| {
                now.duration_since(at) < self.config.context_min_interval()
            }) {
                return Err(SkipReason::ContextTooSoon);
            }
            if shared.is_recent(fingerprint) {
                return Err(SkipReason::Duplicate);
            }
        }

        // Rechecked under the lock; the first check ran before admission awaited
        if ctx.in_flight {
            return Err(SkipReason::ContextInFlight);
        }

        shared.in_flight += 1;
        shared.last_request_at = Some(now);
        shared.last_key = Some(fingerprint.to_string());
        shared.remember(
            fingerprint.to_string(),
            now,
            self.config.recent_fingerprint_capacity.max(1),
        );

        let sequence = self.next_sequence();
        ctx.in_flight = true;
        ctx.last_request_at = Some(now);
        ctx.latest_sequence = sequence;
        ctx.error = None;
        if let Some(page) = filter.page {
            ctx.current_page = page;
        }
        Ok(sequence)
    }
}

/// Clears in-flight flags a settle delay after the request finishes
///
/// Runs on every exit path, including a dropped or panicking fetch future.
struct InFlightGuard {
    coordinator: Arc<FetchCoordinator>,
    context: Arc<Mutex<ContextState>>,
    settle: Duration,
}

impl InFlightGuard {
    fn release(coordinator: &FetchCoordinator, context: &Mutex<ContextState>) {
        lock(context).in_flight = false;
        let mut shared = lock(&coordinator.shared);
        shared.in_flight = shared.in_flight.saturating_sub(1);
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let coordinator = Arc::clone(&self.coordinator);
        let context = Arc::clone(&self.context);
        let settle = self.settle;
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(settle).await;
                    InFlightGuard::release(&coordinator, &context);
                });
            }
            Err(_) => InFlightGuard::release(&coordinator, &context),
        }
    }
}

/// Tracks an outstanding create/update/delete for the `loading` flag
struct MutationGuard<'a>(&'a Mutex<ContextState>);

impl<'a> MutationGuard<'a> {
    fn begin(state: &'a Mutex<ContextState>) -> Self {
        let mut ctx = lock(state);
        ctx.mutations += 1;
        ctx.error = None;
        drop(ctx);
        Self(state)
    }
}

impl Drop for MutationGuard<'_> {
    fn drop(&mut self) {
        let mut ctx = lock(self.0);
        ctx.mutations = ctx.mutations.saturating_sub(1);
    }
}

/// One call site's handle on the coordinator
///
/// Cheap to clone; clones share the same held list and flags.
#[derive(Clone)]
pub struct FetchContext {
    coordinator: Arc<FetchCoordinator>,
    state: Arc<Mutex<ContextState>>,
}

impl FetchContext {
    pub fn coordinator(&self) -> &Arc<FetchCoordinator> {
        &self.coordinator
    }

    pub fn snapshot(&self) -> ContextSnapshot {
        let ctx = lock(&self.state);
        ContextSnapshot {
            records: ctx.records.clone(),
            total_count: ctx.total_count,
            error: ctx.error.clone(),
            loading: ctx.in_flight || ctx.mutations > 0,
            current_page: ctx.current_page,
            page_size: self.coordinator.config.page_size,
        }
    }

    fn skipped(&self, reason: SkipReason, fingerprint: Option<&str>) -> FetchOutcome {
        debug!(?reason, fingerprint, "Skipping transcript fetch");
        FetchOutcome {
            disposition: FetchDisposition::Skipped(reason),
            snapshot: self.snapshot(),
        }
    }

    /// List transcripts matching `filter`
    ///
    /// Never fails: query errors are stored in the snapshot's `error` while
    /// the previous records stay in place, and skips return the current
    /// snapshot unchanged.
    pub async fn fetch(&self, filter: TranscriptFilter) -> FetchOutcome {
        let coordinator = &self.coordinator;
        let config = &coordinator.config;
        let defaults = config.filter_defaults();
        let now = coordinator.clock.now();

        let mut requested = filter;
        {
            let mut ctx = lock(&self.state);
            ctx.last_filter = Some(requested.clone());
            if requested.page.is_none() {
                requested.page = Some(ctx.current_page);
            }
            if ctx.in_flight {
                drop(ctx);
                return self.skipped(SkipReason::ContextInFlight, None);
            }
        }

        if let Err(err) = coordinator
            .limiter
            .acquire(FETCH_BUCKET, &config.rate_limit)
            .await
        {
            debug!(error = %err, "Fetch admission denied");
            return self.skipped(SkipReason::RateLimited, None);
        }

        let normalized = requested.normalize(now, &defaults);
        let fingerprint = normalized.fingerprint();
        let sequence = match coordinator.admit(&self.state, &normalized, &fingerprint) {
            Ok(sequence) => sequence,
            Err(reason) => return self.skipped(reason, Some(&fingerprint)),
        };

        let _in_flight = InFlightGuard {
            coordinator: Arc::clone(coordinator),
            context: Arc::clone(&self.state),
            settle: config.settle_delay(),
        };

        debug!(
            sequence,
            fingerprint = %fingerprint,
            forced = normalized.force,
            "Issuing transcript fetch"
        );
        // Forced requests skip the default window for dedup, not for the query
        let query = normalized.with_default_window(now, &defaults).to_query();

        let result = coordinator
            .store
            .query(&config.table, &query)
            .await
            .map_err(|e| CoordError::RemoteQuery(e.to_string()))
            .and_then(|page| {
                let records = TranscriptRecord::from_rows(page.rows)
                    .map_err(|e| CoordError::RemoteQuery(e.to_string()))?;
                Ok((records, page.total_count))
            });

        if let Err(err) = &result {
            coordinator.reporter.handle_error(err, "FetchContext::fetch");
        }

        let applied = {
            let mut ctx = lock(&self.state);
            if ctx.latest_sequence != sequence {
                false
            } else {
                match result {
                    Ok((records, total_count)) => {
                        ctx.records = records;
                        ctx.total_count = total_count;
                        ctx.error = None;
                    }
                    Err(err) => ctx.error = Some(err.to_string()),
                }
                true
            }
        };

        let disposition = if applied {
            FetchDisposition::Issued { sequence }
        } else {
            debug!(sequence, "Discarding superseded fetch result");
            FetchDisposition::Superseded { sequence }
        };
        FetchOutcome {
            disposition,
            snapshot: self.snapshot(),
        }
    }

    /// Fetch `page` of the most recently requested filter
    pub async fn go_to_page(&self, page: u32) -> FetchOutcome {
        let base = {
            let mut ctx = lock(&self.state);
            ctx.current_page = page.max(1);
            ctx.last_filter.clone().unwrap_or_default()
        };
        let filter = TranscriptFilter {
            page: Some(page.max(1)),
            force: false,
            force_timestamp: None,
            ..base
        };
        self.fetch(filter).await
    }

    /// Replace this context's pending fetch result with local state
    fn supersede(&self) {
        let sequence = self.coordinator.next_sequence();
        lock(&self.state).latest_sequence = sequence;
    }

    fn mutation_failed(&self, err: CoordError, label: &str) -> CoordError {
        self.coordinator.reporter.handle_error(&err, label);
        lock(&self.state).error = Some(err.to_string());
        err
    }

    /// Insert a transcript; on success it is prepended to the held list
    pub async fn create(&self, transcript: NewTranscript) -> CoordResult<TranscriptRecord> {
        let _pending = MutationGuard::begin(&self.state);
        let coordinator = &self.coordinator;

        let stored = async {
            let row = transcript.to_row()?;
            let row = coordinator.store.insert(&coordinator.config.table, row).await?;
            Ok::<_, CoordError>(TranscriptRecord::from_row(row)?)
        }
        .await
        .map_err(|err| self.mutation_failed(err, "FetchContext::create"))?;

        self.supersede();
        {
            let mut ctx = lock(&self.state);
            ctx.records.insert(0, stored.clone());
            ctx.total_count += 1;
        }
        coordinator.forget_requests();
        info!(id = %stored.id, "Transcript created");
        coordinator.events.emit_lossy(DashboardEvent::TranscriptCreated {
            id: stored.id.clone(),
            filename: stored.filename.clone(),
            duration_secs: stored.duration,
        });
        Ok(stored)
    }

    /// Apply `patch` to a transcript and replace it in the held list
    pub async fn update(&self, id: &str, patch: TranscriptPatch) -> CoordResult<TranscriptRecord> {
        let _pending = MutationGuard::begin(&self.state);
        let coordinator = &self.coordinator;

        let stored = async {
            let row = patch.to_row()?;
            let row = coordinator
                .store
                .update(&coordinator.config.table, id, row)
                .await?;
            Ok::<_, CoordError>(TranscriptRecord::from_row(row)?)
        }
        .await
        .map_err(|err| self.mutation_failed(err, "FetchContext::update"))?;

        self.supersede();
        {
            let mut ctx = lock(&self.state);
            for record in ctx.records.iter_mut().filter(|r| r.id == id) {
                *record = stored.clone();
            }
        }
        coordinator.forget_requests();
        info!(id, "Transcript updated");
        coordinator
            .events
            .emit_lossy(DashboardEvent::TranscriptUpdated { id: id.to_string() });
        Ok(stored)
    }

    /// Delete a transcript and drop it from the held list
    pub async fn delete(&self, id: &str) -> CoordResult<()> {
        let _pending = MutationGuard::begin(&self.state);
        let coordinator = &self.coordinator;

        if let Err(err) = coordinator.store.delete(&coordinator.config.table, id).await {
            return Err(self.mutation_failed(err.into(), "FetchContext::delete"));
        }

        self.supersede();
        {
            let mut ctx = lock(&self.state);
            ctx.records.retain(|r| r.id != id);
            ctx.total_count = ctx.total_count.saturating_sub(1);
        }
        coordinator.forget_requests();
        info!(id, "Transcript deleted");
        coordinator
            .events
            .emit_lossy(DashboardEvent::TranscriptDeleted { id: id.to_string() });
        Ok(())
    }
}

impl std::fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ctx = lock(&self.state);
        f.debug_struct("FetchContext")
            .field("in_flight", &ctx.in_flight)
            .field("current_page", &ctx.current_page)
            .field("latest_sequence", &ctx.latest_sequence)
            .field("records", &ctx.records.len())
            .finish()
    }
}
