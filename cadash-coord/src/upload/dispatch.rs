//! Rate-bounded lifecycle event dispatch
//!
//! Throttled events pass a last-emission gate: at most one per interval.
//! An event arriving inside the interval is held as the pending trailing
//! event (replacing any earlier one) and sent when the interval ends, so a
//! burst produces one leading and one trailing event.
//!
//! Events that must always arrive go through `emit_immediate`.

use cadash_common::events::{DashboardEvent, EventBus};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

#[derive(Debug, Default)]
struct Gate {
    last_emission: Option<Instant>,
    pending: Option<DashboardEvent>,
    flush_scheduled: bool,
}

#[derive(Clone)]
pub struct ThrottledDispatcher {
    events: EventBus,
    interval: Duration,
    gate: Arc<Mutex<Gate>>,
}

impl ThrottledDispatcher {
    pub fn new(events: EventBus, interval: Duration) -> Self {
        Self {
            events,
            interval,
            gate: Arc::new(Mutex::new(Gate::default())),
        }
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DashboardEvent> {
        self.events.subscribe()
    }

    /// Send through the gate
    ///
    /// Returns true if the event went out now, false if it was held back as
    /// the trailing event.
    pub fn emit(&self, event: DashboardEvent) -> bool {
        let now = Instant::now();
        let mut gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());

        let remaining = gate
            .last_emission
            .map(|last| self.interval.saturating_sub(now.duration_since(last)))
            .unwrap_or(Duration::ZERO);

        if remaining.is_zero() && !gate.flush_scheduled {
            gate.last_emission = Some(now);
            drop(gate);
            self.send(event, "throttled");
            return true;
        }

        debug!(
            event = event.event_type(),
            remaining_ms = remaining.as_millis() as u64,
            "Throttling event"
        );
        gate.pending = Some(event);
        if !gate.flush_scheduled {
            gate.flush_scheduled = true;
            drop(gate);
            self.schedule_flush(remaining);
        }
        false
    }

    fn schedule_flush(&self, after: Duration) {
        let dispatcher = self.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    tokio::time::sleep(after).await;
                    dispatcher.flush();
                });
            }
            Err(_) => self.flush(),
        }
    }

    fn flush(&self) {
        let pending = {
            let mut gate = self.gate.lock().unwrap_or_else(|e| e.into_inner());
            gate.flush_scheduled = false;
            let pending = gate.pending.take();
            if pending.is_some() {
                gate.last_emission = Some(Instant::now());
            }
            pending
        };
        if let Some(event) = pending {
            self.send(event, "trailing");
        }
    }

    /// Send right away, bypassing (and not resetting) the gate
    pub fn emit_immediate(&self, event: DashboardEvent) -> bool {
        self.send(event, "immediate")
    }

    fn send(&self, event: DashboardEvent, kind: &str) -> bool {
        let event_type = event.event_type();
        match self.events.emit(event) {
            Ok(receivers) => {
                debug!(event = event_type, kind, receivers, "Event dispatched");
                true
            }
            Err(_) => {
                debug!(event = event_type, kind, "No receivers for event");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started(name: &str) -> DashboardEvent {
        DashboardEvent::BulkUploadStarted {
            filename: name.to_string(),
            size_bytes: 1,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_coalesces_to_leading_and_trailing() {
        let dispatcher = ThrottledDispatcher::new(EventBus::new(16), Duration::from_millis(300));
        let mut rx = dispatcher.subscribe();

        assert!(dispatcher.emit(started("a")));
        assert!(!dispatcher.emit(started("b")));
        assert!(!dispatcher.emit(started("c")));

        assert_eq!(rx.recv().await.unwrap(), started("a"));
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(310)).await;
        assert_eq!(rx.try_recv().unwrap(), started("c"));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spaced_events_all_pass() {
        let dispatcher = ThrottledDispatcher::new(EventBus::new(16), Duration::from_millis(300));
        let mut rx = dispatcher.subscribe();

        assert!(dispatcher.emit(started("a")));
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(dispatcher.emit(started("b")));

        assert_eq!(rx.try_recv().unwrap(), started("a"));
        assert_eq!(rx.try_recv().unwrap(), started("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_immediate_bypasses_gate() {
        let dispatcher = ThrottledDispatcher::new(EventBus::new(16), Duration::from_millis(300));
        let mut rx = dispatcher.subscribe();

        assert!(dispatcher.emit(started("a")));
        assert!(dispatcher.emit_immediate(DashboardEvent::TranscriptDeleted { id: "t-1".into() }));

        assert_eq!(rx.try_recv().unwrap(), started("a"));
        assert_eq!(rx.try_recv().unwrap().event_type(), "transcript-deleted");
    }
}
