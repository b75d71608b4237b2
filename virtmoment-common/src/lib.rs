//! # virtmoment Common
//!
//! Shared utilities for the virtmoment crates.
//!
//! ## Logging
//!
//! ```no_run
//! use virtmoment_common::{init_with_format, LogFormat};
//!
//! init_with_format(LogFormat::Pretty, "info").unwrap();
//! tracing::info!("moment trees ready");
//! ```

pub mod logging;

// Re-export logging functions
pub use logging::{init_logging, init_logging_json, init_with_format, LogFormat};
