//! # Call Analytics Dashboard Common Library
//!
//! Shared code for the cadash crates:
//! - Error type
//! - Dashboard lifecycle events and the broadcast EventBus
//! - TOML configuration loading
//! - Tracing initialisation
//! - Wall-clock abstraction

pub mod config;
pub mod error;
pub mod events;
pub mod logging;
pub mod time;

pub use error::{Error, Result};
