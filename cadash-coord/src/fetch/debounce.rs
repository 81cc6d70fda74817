//! Quiet-period debouncing of filter edits
//!
//! Each call to [`FilterDebouncer::update`] restarts the quiet period; only
//! the filter present when the period elapses is fetched. A burst of edits
//! therefore produces at most one fetch attempt.

use super::coordinator::{FetchContext, FetchOutcome};
use super::filter::TranscriptFilter;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct FilterDebouncer {
    tx: watch::Sender<Option<TranscriptFilter>>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl FilterDebouncer {
    /// Start the debounce task for `context`
    pub fn spawn(context: FetchContext, quiet: Duration) -> Self {
        Self::spawn_inner(context, quiet, None)
    }

    /// Like [`spawn`](Self::spawn), also forwarding each fetch outcome
    pub fn spawn_with_outcomes(
        context: FetchContext,
        quiet: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<FetchOutcome>) {
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        (Self::spawn_inner(context, quiet, Some(outcome_tx)), outcome_rx)
    }

    fn spawn_inner(
        context: FetchContext,
        quiet: Duration,
        outcomes: Option<mpsc::UnboundedSender<FetchOutcome>>,
    ) -> Self {
        let (tx, rx) = watch::channel(None);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(context, quiet, rx, cancel.clone(), outcomes));
        Self {
            tx,
            cancel,
            handle: Some(handle),
        }
    }

    /// Record a new filter value; restarts the quiet period
    pub fn update(&self, filter: TranscriptFilter) {
        self.tx.send_replace(Some(filter));
    }

    /// Stop the task, dropping any pending filter
    pub async fn shutdown(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for FilterDebouncer {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run(
    context: FetchContext,
    quiet: Duration,
    mut rx: watch::Receiver<Option<TranscriptFilter>>,
    cancel: CancellationToken,
    outcomes: Option<mpsc::UnboundedSender<FetchOutcome>>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return,
            changed = rx.changed() => {
                if changed.is_err() {
                    return;
                }
            }
        }

        // Wait out the quiet period, restarting on every change
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(quiet) => break,
                changed = rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        }

        let filter = rx.borrow_and_update().clone();
        if let Some(filter) = filter {
            let outcome = context.fetch(filter).await;
            debug!(disposition = ?outcome.disposition, "Debounced fetch finished");
            if let Some(tx) = &outcomes {
                let _ = tx.send(outcome);
            }
        }
    }
}
