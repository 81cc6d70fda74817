//! Error reporting collaborator
//!
//! Fatal and background failures are funneled here with a label naming the
//! operation that raised them. Implementations must not panic or block.

use crate::error::CoordError;
use tracing::{error, warn};

pub trait ErrorReporter: Send + Sync {
    fn handle_error(&self, error: &CoordError, context: &str);
}

/// Reports through `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingErrorReporter;

impl ErrorReporter for TracingErrorReporter {
    fn handle_error(&self, err: &CoordError, context: &str) {
        match err {
            CoordError::BackgroundTaskFailed { .. } => {
                warn!(context, error = %err, "Background task failed")
            }
            _ if err.is_transient() => warn!(context, error = %err, "Transient failure"),
            _ => error!(context, error = %err, "Operation failed"),
        }
    }
}
