//! Runtime Configuration
//!
//! Knobs that change how a [`Runtime`](crate::Runtime) behaves without
//! changing the graph algorithms themselves. A config is plain data and can
//! be loaded from JSON:
//!
//! ```rust
//! use strand_core::{RuntimeConfig, PullErrorPolicy};
//!
//! let config = RuntimeConfig::from_json(r#"{ "pull_errors": "surface" }"#).unwrap();
//! assert_eq!(config.pull_errors, PullErrorPolicy::Surface);
//! assert_eq!(config.frame_interval_ms, 16);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What happens when a pull closure reports a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PullErrorPolicy {
    /// Log the failure and keep serving the last good value.
    #[default]
    KeepStale,

    /// Log the failure and also report it from `Memo::try_get` until the
    /// cell recomputes successfully.
    Surface,
}

/// Which host mechanism arms deferred flushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverKind {
    /// The runtime's own [`EventLoop`](crate::schedule::EventLoop), pumped by the host.
    #[default]
    EventLoop,

    /// `tokio::task::spawn_local`; flushes run on the current `LocalSet`.
    Tokio,
}

/// Configuration for a [`Runtime`](crate::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Failure policy for pull closures.
    pub pull_errors: PullErrorPolicy,

    /// Driver used by the built-in deferred schedulers.
    pub driver: DriverKind,

    /// Delay between frames for the frame-based time domain.
    pub frame_interval_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            pull_errors: PullErrorPolicy::KeepStale,
            driver: DriverKind::EventLoop,
            frame_interval_ms: 16,
        }
    }
}

impl RuntimeConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// The frame interval as a `Duration`.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_json_yields_defaults() {
        let config = RuntimeConfig::from_json("{}").unwrap();
        assert_eq!(config, RuntimeConfig::default());
    }

    #[test]
    fn parses_driver_and_interval() {
        let config =
            RuntimeConfig::from_json(r#"{ "driver": "tokio", "frame_interval_ms": 8 }"#).unwrap();
        assert_eq!(config.driver, DriverKind::Tokio);
        assert_eq!(config.frame_interval(), Duration::from_millis(8));
    }

    #[test]
    fn rejects_unknown_policy() {
        assert!(RuntimeConfig::from_json(r#"{ "pull_errors": "explode" }"#).is_err());
    }
}
