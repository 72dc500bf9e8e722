#![forbid(unsafe_code)]

//! Structured logging for qdom.
//!
//! All crates log through `tracing`. The macros are re-exported here so
//! downstream crates can write `qdom_core::warn!(..)` without a direct
//! `tracing` dependency. Installing a subscriber is the host's job; the
//! `tracing-json` feature provides a ready-made JSON one.

pub use tracing::{
    debug, debug_span, error, error_span, info, info_span, trace, trace_span, warn, warn_span,
};

/// Environment variable holding the `EnvFilter` directive for
/// [`init_json_subscriber`].
pub const LOG_ENV: &str = "QDOM_LOG";

/// Default filter when [`LOG_ENV`] is unset or invalid.
pub const DEFAULT_FILTER: &str = "warn";

/// Errors from subscriber installation.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    /// A global subscriber was already installed.
    #[error("failed to install tracing subscriber: {0}")]
    Init(String),
}

/// Install a JSON `tracing` subscriber filtered by `QDOM_LOG`.
#[cfg(feature = "tracing-json")]
pub fn init_json_subscriber() -> Result<(), LoggingError> {
    use tracing_subscriber::EnvFilter;

    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| LoggingError::Init(e.to_string()))
}
