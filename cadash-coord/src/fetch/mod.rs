//! Transcript list reads: filters, the shared coordinator, debouncing

pub mod coordinator;
pub mod debounce;
pub mod filter;

pub use coordinator::{
    ContextSnapshot, FetchContext, FetchCoordinator, FetchDisposition, FetchOutcome, SkipReason,
};
pub use debounce::FilterDebouncer;
pub use filter::{FilterDefaults, SortDirection, SortField, TranscriptFilter};
