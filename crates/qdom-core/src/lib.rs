#![forbid(unsafe_code)]

//! Core: configuration and logging shared by the qdom crates.
//!
//! # Role in qdom
//! `qdom-core` sits below everything else. The reactive layer reads its
//! [`config::ReactiveConfig`] for drain bounds and deep-notification policy;
//! the DOM layer reads the input-guard switch. Every crate logs through the
//! `tracing` macros re-exported from [`logging`].

pub mod config;
pub mod logging;

pub use config::{
    ConfigError, ConfigGuard, NotifyMode, ReactiveConfig, ReactiveConfigParse, push_config,
    with_config,
};
pub use logging::{debug, error, info, trace, warn};
