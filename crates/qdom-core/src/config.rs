#![forbid(unsafe_code)]

//! Runtime configuration for the reactive layer.
//!
//! Configuration is read from environment variables once per thread and can
//! be overridden for a scope with [`with_config`] (or the RAII
//! [`push_config`] guard). Overrides nest; the innermost one wins.
//!
//! | Variable | Values | Default |
//! |----------|--------|---------|
//! | `QDOM_DEEP_NOTIFY` | `coalesced`, `immediate` | `coalesced` |
//! | `QDOM_MAX_DRAIN` | integer >= 1 | `1024` |
//! | `QDOM_INPUT_GUARD` | `on`, `off` (also `1/0`, `true/false`) | `on` |
//!
//! # Failure Modes
//!
//! Malformed values never abort: the default is kept and a [`ConfigError`]
//! is reported through [`ReactiveConfig::from_env_with_diagnostics`] (and
//! logged at `warn` when the thread's base config is first loaded).

use std::cell::{OnceCell, RefCell};
use std::env;
use std::fmt;

/// Default bound on queued notifications drained in one pass.
pub const DEFAULT_MAX_DRAIN: usize = 1024;

/// How deep observables deliver notifications after an in-place mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NotifyMode {
    /// Defer to the next scheduler flush; mutations in one tick collapse
    /// into a single notification.
    #[default]
    Coalesced,
    /// Notify synchronously when each write completes.
    Immediate,
}

impl NotifyMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Coalesced => "coalesced",
            Self::Immediate => "immediate",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "coalesced" | "coalesce" | "batched" => Some(Self::Coalesced),
            "immediate" | "sync" => Some(Self::Immediate),
            _ => None,
        }
    }
}

impl fmt::Display for NotifyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reactive-layer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReactiveConfig {
    /// Delivery policy for deep observables.
    pub deep_notify: NotifyMode,
    /// Maximum number of queued notifications drained by one `set` before
    /// the remainder is dropped as a runaway cycle.
    pub max_drain: usize,
    /// Whether two-way input bindings suppress node/observable echo loops.
    pub input_guard: bool,
}

impl Default for ReactiveConfig {
    fn default() -> Self {
        Self {
            deep_notify: NotifyMode::Coalesced,
            max_drain: DEFAULT_MAX_DRAIN,
            input_guard: true,
        }
    }
}

/// Configuration error with field context.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}={value} ({message})")]
pub struct ConfigError {
    pub field: &'static str,
    pub value: String,
    pub message: String,
}

impl ConfigError {
    fn new(field: &'static str, value: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field,
            value: value.into(),
            message: message.into(),
        }
    }
}

/// Configuration parse diagnostics (env + validation).
#[derive(Debug, Clone)]
pub struct ReactiveConfigParse {
    pub config: ReactiveConfig,
    pub errors: Vec<ConfigError>,
}

impl ReactiveConfig {
    #[must_use]
    pub fn with_deep_notify(mut self, mode: NotifyMode) -> Self {
        self.deep_notify = mode;
        self
    }

    /// Set the drain bound. Values below 1 are clamped to 1.
    #[must_use]
    pub fn with_max_drain(mut self, max_drain: usize) -> Self {
        self.max_drain = max_drain.max(1);
        self
    }

    #[must_use]
    pub fn with_input_guard(mut self, enabled: bool) -> Self {
        self.input_guard = enabled;
        self
    }

    /// Parse config from environment variables.
    #[must_use]
    pub fn from_env() -> ReactiveConfig {
        Self::from_env_with_diagnostics().config
    }

    /// Parse config from environment variables and return diagnostics.
    #[must_use]
    pub fn from_env_with_diagnostics() -> ReactiveConfigParse {
        from_env_with(|key| env::var(key).ok())
    }

    /// Validate config constraints and return all violations.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();
        if self.max_drain == 0 {
            errors.push(ConfigError::new(
                "QDOM_MAX_DRAIN",
                "0",
                "drain bound must be at least 1",
            ));
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Build a config from an arbitrary key lookup.
///
/// Used by [`ReactiveConfig::from_env_with_diagnostics`]; exposed so tests
/// and hosts without a process environment (wasm) can supply their own map.
pub fn from_env_with<F>(mut get: F) -> ReactiveConfigParse
where
    F: FnMut(&str) -> Option<String>,
{
    let mut config = ReactiveConfig::default();
    let mut errors = Vec::new();

    if let Some(raw) = get("QDOM_DEEP_NOTIFY") {
        match NotifyMode::parse(&raw) {
            Some(mode) => config.deep_notify = mode,
            None => errors.push(ConfigError::new(
                "QDOM_DEEP_NOTIFY",
                raw,
                "expected coalesced|immediate",
            )),
        }
    }

    if let Some(raw) = get("QDOM_MAX_DRAIN") {
        match raw.trim().parse::<usize>() {
            Ok(n) if n >= 1 => config.max_drain = n,
            Ok(_) => errors.push(ConfigError::new(
                "QDOM_MAX_DRAIN",
                raw,
                "drain bound must be at least 1",
            )),
            Err(_) => errors.push(ConfigError::new(
                "QDOM_MAX_DRAIN",
                raw,
                "expected a positive integer",
            )),
        }
    }

    if let Some(raw) = get("QDOM_INPUT_GUARD") {
        match parse_flag(&raw) {
            Some(flag) => config.input_guard = flag,
            None => errors.push(ConfigError::new(
                "QDOM_INPUT_GUARD",
                raw,
                "expected on|off",
            )),
        }
    }

    ReactiveConfigParse { config, errors }
}

// ---------------------------------------------------------------------------
// Thread-local current config
// ---------------------------------------------------------------------------

thread_local! {
    static BASE_CONFIG: OnceCell<ReactiveConfig> = const { OnceCell::new() };
    static CONFIG_STACK: RefCell<Vec<ReactiveConfig>> = const { RefCell::new(Vec::new()) };
}

fn base_config() -> ReactiveConfig {
    BASE_CONFIG.with(|cell| {
        *cell.get_or_init(|| {
            let parsed = ReactiveConfig::from_env_with_diagnostics();
            for err in &parsed.errors {
                tracing::warn!(field = err.field, value = %err.value, "{}", err.message);
            }
            parsed.config
        })
    })
}

/// The config in effect on this thread: the innermost override, or the
/// environment-derived base.
#[must_use]
pub fn current() -> ReactiveConfig {
    CONFIG_STACK
        .with(|stack| stack.borrow().last().copied())
        .unwrap_or_else(base_config)
}

/// RAII guard returned by [`push_config`]. Dropping it restores the
/// previous config.
#[must_use = "the override is removed when the guard is dropped"]
#[derive(Debug)]
pub struct ConfigGuard {
    depth: usize,
}

impl Drop for ConfigGuard {
    fn drop(&mut self) {
        CONFIG_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            debug_assert_eq!(stack.len(), self.depth, "config guards dropped out of order");
            stack.truncate(self.depth.saturating_sub(1));
        });
    }
}

/// Push a config override for the current thread.
pub fn push_config(config: ReactiveConfig) -> ConfigGuard {
    let depth = CONFIG_STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(config);
        stack.len()
    });
    ConfigGuard { depth }
}

/// Run `f` with `config` as the current config.
pub fn with_config<R>(config: ReactiveConfig, f: impl FnOnce() -> R) -> R {
    let _guard = push_config(config);
    f()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn parse(pairs: &[(&str, &str)]) -> ReactiveConfigParse {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        from_env_with(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_env_gives_defaults() {
        let parsed = parse(&[]);
        assert_eq!(parsed.config, ReactiveConfig::default());
        assert!(parsed.errors.is_empty());
    }

    #[test]
    fn all_fields_parse() {
        let parsed = parse(&[
            ("QDOM_DEEP_NOTIFY", "Immediate"),
            ("QDOM_MAX_DRAIN", " 16 "),
            ("QDOM_INPUT_GUARD", "off"),
        ]);
        assert!(parsed.errors.is_empty());
        assert_eq!(parsed.config.deep_notify, NotifyMode::Immediate);
        assert_eq!(parsed.config.max_drain, 16);
        assert!(!parsed.config.input_guard);
    }

    #[test]
    fn bad_values_keep_defaults_and_report() {
        let parsed = parse(&[
            ("QDOM_DEEP_NOTIFY", "eventually"),
            ("QDOM_MAX_DRAIN", "0"),
            ("QDOM_INPUT_GUARD", "maybe"),
        ]);
        assert_eq!(parsed.config, ReactiveConfig::default());
        let fields: Vec<_> = parsed.errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["QDOM_DEEP_NOTIFY", "QDOM_MAX_DRAIN", "QDOM_INPUT_GUARD"]
        );
    }

    #[test]
    fn error_display_has_context() {
        let parsed = parse(&[("QDOM_MAX_DRAIN", "lots")]);
        let msg = parsed.errors[0].to_string();
        assert_eq!(msg, "QDOM_MAX_DRAIN=lots (expected a positive integer)");
    }

    #[test]
    fn validate_rejects_zero_drain() {
        let cfg = ReactiveConfig {
            max_drain: 0,
            ..ReactiveConfig::default()
        };
        assert!(cfg.validate().is_err());
        assert!(ReactiveConfig::default().validate().is_ok());
    }

    #[test]
    fn builder_clamps_drain() {
        let cfg = ReactiveConfig::default().with_max_drain(0);
        assert_eq!(cfg.max_drain, 1);
    }

    #[test]
    fn overrides_nest_and_restore() {
        let base = current();
        let outer = ReactiveConfig::default().with_deep_notify(NotifyMode::Immediate);
        let inner = outer.with_max_drain(3);

        with_config(outer, || {
            assert_eq!(current(), outer);
            with_config(inner, || assert_eq!(current().max_drain, 3));
            assert_eq!(current(), outer);
        });
        assert_eq!(current(), base);
    }

    #[test]
    fn guard_restores_on_drop() {
        let base = current();
        {
            let _g = push_config(base.with_input_guard(!base.input_guard));
            assert_ne!(current().input_guard, base.input_guard);
        }
        assert_eq!(current(), base);
    }
}
