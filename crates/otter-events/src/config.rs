//! Configuration types for event emitters.
//!
//! An emitter's configuration is chosen once, at construction. Only the
//! max-listener threshold can be adjusted afterwards through
//! [`EventEmitter::set_max_listeners`](crate::EventEmitter::set_max_listeners).

use serde::{Deserialize, Serialize};

use crate::error::EventResult;

/// Default maximum number of listeners per event before a warning is logged.
pub const DEFAULT_MAX_LISTENERS: usize = 10;

/// When listeners run relative to the `emit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Listeners run inside `emit`, in registration order, before it returns.
    Sync,
    /// Each listener invocation is handed to the emitter's scheduler and runs
    /// after the current call stack unwinds.
    #[default]
    Async,
}

/// What synchronous delivery does when a listener fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorPolicy {
    /// Stop at the first failure and return it from `emit`.
    #[default]
    Propagate,
    /// Keep delivering to the remaining listeners; `emit` returns the first
    /// failure once every listener has run.
    Continue,
}

/// Emitter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmitterConfig {
    /// Delivery timing.
    /// Default: async
    pub delivery: DeliveryMode,

    /// Listener count per event above which a warning is logged (0 = unlimited).
    /// Default: 10
    pub max_listeners: usize,

    /// Failure handling for synchronous delivery.
    /// Default: propagate
    pub error_policy: ErrorPolicy,
}

impl Default for EmitterConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryMode::default(),
            max_listeners: DEFAULT_MAX_LISTENERS,
            error_policy: ErrorPolicy::default(),
        }
    }
}

impl EmitterConfig {
    /// Create a new config with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create config for synchronous delivery.
    pub fn synchronous() -> Self {
        Self {
            delivery: DeliveryMode::Sync,
            ..Default::default()
        }
    }

    /// Create config for deferred delivery.
    pub fn asynchronous() -> Self {
        Self {
            delivery: DeliveryMode::Async,
            ..Default::default()
        }
    }

    /// Set the delivery mode.
    pub fn delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the max-listener warning threshold.
    pub fn max_listeners(mut self, n: usize) -> Self {
        self.max_listeners = n;
        self
    }

    /// Set the synchronous error policy.
    pub fn error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }

    /// Parse configuration from JSON. Missing fields keep their defaults.
    ///
    /// ```
    /// use otter_events::{DeliveryMode, EmitterConfig};
    ///
    /// let config = EmitterConfig::from_json(r#"{ "delivery": "sync" }"#).unwrap();
    /// assert_eq!(config.delivery, DeliveryMode::Sync);
    /// assert_eq!(config.max_listeners, 10);
    /// ```
    pub fn from_json(json: &str) -> EventResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
