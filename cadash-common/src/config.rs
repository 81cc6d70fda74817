//! Configuration file resolution and TOML loading
//!
//! Config file resolution priority:
//! 1. Explicit path (command line or embedding application)
//! 2. `CADASH_CONFIG` environment variable
//! 3. `<user config dir>/cadash/config.toml`
//! 4. None: callers fall back to compiled defaults

use crate::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "CADASH_CONFIG";

/// Logging section shared by every config file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `"info"` or `"cadash_coord=debug,info"`
    pub level: String,
    /// Include the event target (module path) in formatted output
    pub show_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            show_target: false,
        }
    }
}

/// Resolve which config file to read, if any
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: explicit path
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    // Priority 2: environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: per-user config directory
    let user_config = dirs::config_dir().map(|d| d.join("cadash").join("config.toml"));
    match user_config {
        Some(path) if path.exists() => Some(path),
        _ => None,
    }
}

/// Deserialize a TOML file into any config type
pub fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let parsed = toml::from_str(&content)?;
    Ok(parsed)
}

/// Load the resolved config file, or defaults when none is present
///
/// A missing file is not an error (defaults are used); an unreadable or
/// malformed file is.
pub fn load_or_default<T: DeserializeOwned + Default>(explicit: Option<&Path>) -> Result<T> {
    match resolve_config_path(explicit) {
        Some(path) if path.exists() => {
            debug!(path = %path.display(), "Loading configuration file");
            load_toml(&path)
        }
        Some(path) => {
            warn!(
                path = %path.display(),
                "Configuration file not found, using defaults"
            );
            Ok(T::default())
        }
        None => Ok(T::default()),
    }
}
