//! cadash-coord: request coordination for the call-analytics dashboard
//!
//! Two consumers share one scarce backend:
//! - reads go through [`fetch::FetchCoordinator`], which deduplicates,
//!   debounces and rate-limits transcript list queries;
//! - writes go through [`upload::UploadPipeline`], which processes one
//!   audio file at a time and fans trend updates out in the background.
//!
//! [`Coordination`] wires both to a store, an engine and one event bus.

pub mod config;
pub mod error;
pub mod fetch;
pub mod models;
pub mod rate_limiter;
pub mod reporting;
pub mod store;
pub mod upload;

pub use crate::error::{CoordError, CoordResult};

use crate::config::CoordConfig;
use crate::fetch::FetchCoordinator;
use crate::rate_limiter::RateLimiterRegistry;
use crate::reporting::{ErrorReporter, TracingErrorReporter};
use crate::store::RemoteStore;
use crate::upload::{TranscriptionEngine, UploadPipeline};
use cadash_common::events::EventBus;
use cadash_common::time::{Clock, SystemClock};
use std::sync::Arc;

/// Default event bus capacity
pub const EVENT_BUS_CAPACITY: usize = 100;

/// Process-wide coordination state shared by all call sites
#[derive(Clone)]
pub struct Coordination {
    pub events: EventBus,
    pub limiter: Arc<RateLimiterRegistry>,
    pub fetch: Arc<FetchCoordinator>,
    pub uploads: Arc<UploadPipeline>,
}

impl Coordination {
    pub fn new(
        config: &CoordConfig,
        store: Arc<dyn RemoteStore>,
        engine: Arc<dyn TranscriptionEngine>,
    ) -> Self {
        Self::with_collaborators(
            config,
            store,
            engine,
            Arc::new(SystemClock),
            Arc::new(TracingErrorReporter),
        )
    }

    pub fn with_collaborators(
        config: &CoordConfig,
        store: Arc<dyn RemoteStore>,
        engine: Arc<dyn TranscriptionEngine>,
        clock: Arc<dyn Clock>,
        reporter: Arc<dyn ErrorReporter>,
    ) -> Self {
        let events = EventBus::new(EVENT_BUS_CAPACITY);
        let limiter = Arc::new(RateLimiterRegistry::new());

        let fetch = Arc::new(
            FetchCoordinator::new(
                Arc::clone(&store),
                Arc::clone(&limiter),
                events.clone(),
                config.fetch.clone(),
            )
            .with_clock(Arc::clone(&clock))
            .with_reporter(Arc::clone(&reporter)),
        );

        let uploads = Arc::new(
            UploadPipeline::new(engine, store, events.clone(), config.upload.clone())
                .with_clock(clock)
                .with_reporter(reporter)
                .with_fetch_coordinator(Arc::clone(&fetch)),
        );

        Self {
            events,
            limiter,
            fetch,
            uploads,
        }
    }
}
