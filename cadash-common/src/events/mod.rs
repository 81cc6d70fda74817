//! Event types for the dashboard event system
//!
//! Provides the lifecycle notifications emitted by the fetch coordinator and
//! the upload pipeline, and the EventBus that fans them out to subscribers.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Dashboard lifecycle events
///
/// Serialized with a `type` tag so they can be forwarded to browser clients
/// unchanged. `event_type()` gives the dispatch name used by listeners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DashboardEvent {
    /// A file was accepted by the upload pipeline
    BulkUploadStarted {
        /// Original file name
        filename: String,
        /// File size in bytes
        size_bytes: u64,
    },

    /// A transcript record was created
    ///
    /// Emitted by the upload pipeline (with filename and computed audio
    /// duration) and by direct creates (where those may be absent).
    TranscriptCreated {
        /// Persisted record identifier
        id: String,
        filename: Option<String>,
        duration_secs: Option<f64>,
    },

    /// A transcript record was updated
    TranscriptUpdated {
        id: String,
    },

    /// A transcript record was deleted
    TranscriptDeleted {
        id: String,
    },

    /// Cached transcript lists must be considered stale
    TranscriptsInvalidated {
        /// Why the cache was invalidated (e.g. "transcript-created")
        reason: String,
    },
}

impl DashboardEvent {
    /// Dispatch name of the event
    pub fn event_type(&self) -> &'static str {
        match self {
            DashboardEvent::BulkUploadStarted { .. } => "bulk-upload-started",
            DashboardEvent::TranscriptCreated { .. } => "transcript-created",
            DashboardEvent::TranscriptUpdated { .. } => "transcript-updated",
            DashboardEvent::TranscriptDeleted { .. } => "transcript-deleted",
            DashboardEvent::TranscriptsInvalidated { .. } => "transcripts-invalidated",
        }
    }
}

/// Fan-out of dashboard lifecycle events to every open view
///
/// Backed by a tokio broadcast channel. Publishing never waits on a view; a
/// view that falls more than `capacity` events behind gets `Lagged` and skips
/// ahead. Delivery is at-most-once with no acknowledgement.
///
/// ```
/// use cadash_common::events::{DashboardEvent, EventBus};
///
/// let bus = EventBus::new(16);
/// let mut view = bus.subscribe();
/// bus.emit_lossy(DashboardEvent::TranscriptDeleted { id: "t-1".into() });
/// assert_eq!(view.try_recv().unwrap().event_type(), "transcript-deleted");
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<DashboardEvent>,
    capacity: usize,
}

impl EventBus {
    /// `capacity` events are buffered per view before the oldest are dropped
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Receiver for events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<DashboardEvent> {
        self.tx.subscribe()
    }

    /// Returns how many views received the event, or `Err` when none are open
    pub fn emit(
        &self,
        event: DashboardEvent,
    ) -> Result<usize, broadcast::error::SendError<DashboardEvent>> {
        self.tx.send(event)
    }

    /// Emit without caring whether any view is open
    pub fn emit_lossy(&self, event: DashboardEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
