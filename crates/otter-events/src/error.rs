//! Error types for otter-events

use thiserror::Error;

/// Error returned by a failing listener callback.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while registering or delivering events
#[derive(Error, Debug)]
pub enum EventError {
    /// A listener failed during synchronous delivery
    #[error("listener for '{event}' failed: {source}")]
    Listener {
        event: String,
        #[source]
        source: ListenerError,
    },

    /// Deferred delivery was requested outside of a tokio runtime
    #[error("no tokio runtime available for deferred delivery")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    /// Emitter configuration could not be parsed
    #[error("invalid emitter configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl EventError {
    /// Wrap a listener failure with the name of the event being delivered
    pub fn listener(event: impl Into<String>, source: ListenerError) -> Self {
        Self::Listener {
            event: event.into(),
            source,
        }
    }

    /// Name of the event whose listener failed, if this is a listener failure
    pub fn event(&self) -> Option<&str> {
        match self {
            Self::Listener { event, .. } => Some(event.as_str()),
            _ => None,
        }
    }
}

/// Result type alias for emitter operations
pub type EventResult<T> = Result<T, EventError>;
