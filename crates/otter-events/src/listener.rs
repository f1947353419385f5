//! Listener callbacks and their identity.
//!
//! A [`Listener`] is compared by the identity of the registration it was
//! created for, never by what the callback does. Cloning a listener keeps its
//! identity, so the clone handed to [`EventEmitter::on`] can later be passed
//! to [`EventEmitter::remove_listener`].
//!
//! [`EventEmitter::on`]: crate::EventEmitter::on
//! [`EventEmitter::remove_listener`]: crate::EventEmitter::remove_listener

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::ListenerError;
use crate::value::Value;

/// Closure type for event listeners.
pub type ListenerFn = dyn Fn(&[Value]) -> Result<(), ListenerError> + Send + Sync;

/// Unique listener ID source.
static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Generate a unique listener ID.
pub(crate) fn next_listener_id() -> u64 {
    NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)
}

/// A registered (or registrable) event callback.
#[derive(Clone)]
pub struct Listener {
    id: u64,
    callback: Arc<ListenerFn>,
    /// The user listener a one-shot wrapper stands in for.
    wraps: Option<Arc<Listener>>,
}

impl Listener {
    /// Create a listener from a fallible callback.
    ///
    /// An `Err` returned by the callback aborts synchronous delivery (see
    /// [`ErrorPolicy`](crate::ErrorPolicy)) and is logged for deferred
    /// delivery.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&[Value]) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Self {
            id: next_listener_id(),
            callback: Arc::new(callback),
            wraps: None,
        }
    }

    /// Create a listener from a callback that cannot fail.
    pub fn infallible<F>(callback: F) -> Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        Self::new(move |args| {
            callback(args);
            Ok(())
        })
    }

    /// Build a one-shot wrapper with a pre-allocated id.
    pub(crate) fn once_wrapper<F>(id: u64, callback: F, original: Listener) -> Self
    where
        F: Fn(&[Value]) -> Result<(), ListenerError> + Send + Sync + 'static,
    {
        Self {
            id,
            callback: Arc::new(callback),
            wraps: Some(Arc::new(original.original())),
        }
    }

    /// Unique identifier shared by all clones of this listener.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this is a one-shot wrapper registered through `once`.
    pub fn is_once(&self) -> bool {
        self.wraps.is_some()
    }

    /// The listener the caller registered: the wrapped listener for one-shot
    /// wrappers, otherwise `self`.
    pub fn original(&self) -> Listener {
        match &self.wraps {
            Some(original) => Listener::clone(original),
            None => self.clone(),
        }
    }

    /// True if `other` is this listener or the listener this wrapper wraps.
    pub fn matches(&self, other: &Listener) -> bool {
        self.id == other.id || self.wraps.as_ref().is_some_and(|w| w.id == other.id)
    }

    /// Invoke the callback with `args`.
    pub fn call(&self, args: &[Value]) -> Result<(), ListenerError> {
        (self.callback)(args)
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id)
            .field("once", &self.is_once())
            .finish()
    }
}
