//! Node.js-style event emitter for Otter.
//!
//! An [`EventEmitter`] maps event names to ordered listener sequences and
//! delivers emitted arguments either synchronously or through a deferred task
//! queue.
//!
//! # Modules
//!
//! - `emitter` - the [`EventEmitter`] registry and dispatch
//! - `listener` - [`Listener`] callbacks and their identity
//! - `value` - [`Value`] arguments and [`IntoArgs`]
//! - `scheduler` - deferred delivery ([`TaskQueue`], [`CurrentThreadQueue`], [`TokioScheduler`])
//! - `config` - [`EmitterConfig`]
//!
//! # Example
//!
//! ```
//! use otter_events::{EventEmitter, Listener, run_pending};
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! // Deferred delivery is the default.
//! let emitter = EventEmitter::new();
//! let calls = Arc::new(AtomicUsize::new(0));
//!
//! let counter = Arc::clone(&calls);
//! emitter.on("tick", Listener::infallible(move |_| {
//!     counter.fetch_add(1, Ordering::SeqCst);
//! }));
//!
//! assert!(emitter.emit("tick", ()).unwrap());
//! assert_eq!(calls.load(Ordering::SeqCst), 0);
//!
//! run_pending();
//! assert_eq!(calls.load(Ordering::SeqCst), 1);
//! ```

pub mod config;
pub mod emitter;
pub mod error;
pub mod listener;
pub mod scheduler;
pub mod value;

pub use config::{DEFAULT_MAX_LISTENERS, DeliveryMode, EmitterConfig, ErrorPolicy};
pub use emitter::{EventEmitter, NEW_LISTENER, REMOVE_LISTENER};
pub use error::{EventError, EventResult, ListenerError};
pub use listener::{Listener, ListenerFn};
pub use scheduler::{
    CurrentThreadQueue, Scheduler, Task, TaskQueue, TokioScheduler, pending, run_pending,
};
pub use value::{Args, IntoArgs, Value};
