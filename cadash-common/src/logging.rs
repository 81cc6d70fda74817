//! Tracing initialisation shared by binaries and tests
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Reported failures (error collaborator) |
//! | WARN  | Recoverable issue, fallback applied (background fan-out failures) |
//! | INFO  | Lifecycle: uploads accepted/completed, fetches issued |
//! | DEBUG | Admission decisions: skips, throttling, rate-limit denials |

use crate::config::LoggingConfig;
use crate::{Error, Result};
use tracing_subscriber::EnvFilter;

/// Build the filter: `RUST_LOG` wins, otherwise the configured level
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", config.level, e)))
}

/// Install a global fmt subscriber
///
/// Returns `Ok(false)` when a global subscriber was already installed, which
/// happens routinely when several tests initialise logging.
pub fn init_tracing(config: &LoggingConfig) -> Result<bool> {
    let filter = build_filter(config)?;
    let installed = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.show_target)
        .try_init()
        .is_ok();
    Ok(installed)
}
