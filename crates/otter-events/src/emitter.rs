//! Node.js-style EventEmitter.
//!
//! The emitter keeps, per event name, the listeners in registration order and
//! dispatches them either synchronously inside [`EventEmitter::emit`] or by
//! handing one task per listener to a [`Scheduler`].
//!
//! Every emit works on a snapshot of the listener sequence taken when it
//! starts:
//!   - A listener removed *during* delivery still completes that round.
//!   - A listener added *during* delivery is not called until the next emit.
//!
//! The registry lock is never held while a listener runs, so listeners may
//! call back into the emitter (register, remove, emit) freely.

use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use crate::config::{DeliveryMode, EmitterConfig, ErrorPolicy};
use crate::error::{EventError, EventResult};
use crate::listener::{Listener, next_listener_id};
use crate::scheduler::{CurrentThreadQueue, Scheduler};
use crate::value::{Args, IntoArgs};

/// Notification emitted with `(event, listener)` before a listener is added.
pub const NEW_LISTENER: &str = "newListener";

/// Notification emitted with `(event, listener)` for every removed listener.
pub const REMOVE_LISTENER: &str = "removeListener";

/// Listener sequences indexed by event name.
///
/// An event name is present only while it has at least one listener.
#[derive(Debug)]
struct ListenerRegistry {
    listeners: HashMap<String, Vec<Listener>>,

    /// Maximum listeners per event before warning (0 = unlimited).
    max_listeners: usize,

    /// Events that already triggered the max listeners warning. A name
    /// leaves this set together with its listener sequence.
    warned: HashSet<String>,
}

impl ListenerRegistry {
    fn new(max_listeners: usize) -> Self {
        Self {
            listeners: HashMap::new(),
            max_listeners,
            warned: HashSet::new(),
        }
    }

    fn set_max_listeners(&mut self, n: usize) {
        self.max_listeners = n;
        self.warned.clear();
    }

    /// Add a listener. Returns the new listener count if this registration
    /// crossed the max listeners threshold for the first time.
    fn add(&mut self, event: &str, listener: Listener, prepend: bool) -> Option<usize> {
        let listeners = self.listeners.entry(event.to_string()).or_default();

        if prepend {
            listeners.insert(0, listener);
        } else {
            listeners.push(listener);
        }

        let count = listeners.len();
        let exceeded = self.max_listeners > 0 && count > self.max_listeners;
        (exceeded && self.warned.insert(event.to_string())).then_some(count)
    }

    /// Remove every listener matching `pred`, returning them in their
    /// original order. The retained sequence is rebuilt by filtering.
    fn remove_matching(
        &mut self,
        event: &str,
        pred: impl Fn(&Listener) -> bool,
    ) -> Vec<Listener> {
        let Some(listeners) = self.listeners.get_mut(event) else {
            return Vec::new();
        };

        let (removed, kept): (Vec<_>, Vec<_>) =
            std::mem::take(listeners).into_iter().partition(|l| pred(l));
        *listeners = kept;

        if listeners.is_empty() {
            self.listeners.remove(event);
            self.warned.remove(event);
        }
        removed
    }

    /// Detach the whole sequence for `event`.
    fn detach(&mut self, event: &str) -> Option<Vec<Listener>> {
        self.warned.remove(event);
        self.listeners.remove(event)
    }

    /// Detach every sequence except the one for `keep`.
    fn detach_all_except(&mut self, keep: &str) -> Vec<(String, Vec<Listener>)> {
        let names: Vec<String> = self
            .listeners
            .keys()
            .filter(|name| name.as_str() != keep)
            .cloned()
            .collect();

        names
            .into_iter()
            .filter_map(|name| {
                self.warned.remove(&name);
                let listeners = self.listeners.remove(&name)?;
                Some((name, listeners))
            })
            .collect()
    }

    fn snapshot(&self, event: &str) -> Option<Vec<Listener>> {
        self.listeners.get(event).cloned()
    }

    fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map(|l| l.len()).unwrap_or(0)
    }

    fn event_names(&self) -> Vec<String> {
        self.listeners.keys().cloned().collect()
    }
}

struct Inner {
    registry: Mutex<ListenerRegistry>,
    config: EmitterConfig,
    scheduler: Arc<dyn Scheduler>,
}

/// Named-event publish/subscribe registry.
///
/// Cloning an `EventEmitter` yields another handle to the same registry.
///
/// # Example
///
/// ```
/// use otter_events::{EventEmitter, Listener};
/// use std::sync::{Arc, Mutex};
///
/// let emitter = EventEmitter::synchronous();
/// let seen = Arc::new(Mutex::new(Vec::new()));
///
/// let sink = Arc::clone(&seen);
/// let listener = Listener::infallible(move |args| {
///     sink.lock().unwrap().push(args[0].as_str().unwrap_or_default().to_string());
/// });
///
/// emitter.on("data", listener.clone());
/// assert!(emitter.emit("data", ("hello",)).unwrap());
/// emitter.remove_listener("data", &listener);
/// assert!(!emitter.emit("data", ("ignored",)).unwrap());
///
/// assert_eq!(*seen.lock().unwrap(), vec!["hello".to_string()]);
/// ```
#[derive(Clone)]
pub struct EventEmitter {
    inner: Arc<Inner>,
}

impl EventEmitter {
    /// Create an emitter with deferred delivery on the current thread's queue.
    ///
    /// Deferred listeners run when the thread calls
    /// [`run_pending`](crate::run_pending).
    pub fn new() -> Self {
        Self::with_config(EmitterConfig::default())
    }

    /// Create an emitter that delivers inside `emit`.
    pub fn synchronous() -> Self {
        Self::with_config(EmitterConfig::synchronous())
    }

    /// Create an emitter from `config`, deferring onto the current thread's queue.
    pub fn with_config(config: EmitterConfig) -> Self {
        Self::with_scheduler(config, Arc::new(CurrentThreadQueue))
    }

    /// Create an emitter that hands deferred deliveries to `scheduler`.
    pub fn with_scheduler(config: EmitterConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            inner: Arc::new(Inner {
                registry: Mutex::new(ListenerRegistry::new(config.max_listeners)),
                config,
                scheduler,
            }),
        }
    }

    /// Configuration the emitter was created with.
    pub fn config(&self) -> &EmitterConfig {
        &self.inner.config
    }

    /// Delivery mode, fixed at construction.
    pub fn delivery_mode(&self) -> DeliveryMode {
        self.inner.config.delivery
    }

    /// Append `listener` to the listeners of `event`.
    ///
    /// `newListener` observers are notified before the listener is stored.
    pub fn on(&self, event: &str, listener: Listener) -> &Self {
        self.register(event, listener, false)
    }

    /// Alias for [`on`](Self::on).
    pub fn add_listener(&self, event: &str, listener: Listener) -> &Self {
        self.on(event, listener)
    }

    /// Insert `listener` before every listener already registered for `event`.
    pub fn prepend_listener(&self, event: &str, listener: Listener) -> &Self {
        self.register(event, listener, true)
    }

    /// Register `listener` for a single delivery of `event`.
    ///
    /// The listener is wrapped in a one-shot adapter that removes itself and
    /// then calls `listener`. The adapter fires at most once even when several
    /// deferred deliveries were scheduled before it first ran. Passing the
    /// original listener to [`remove_listener`](Self::remove_listener) removes
    /// the pending adapter.
    pub fn once(&self, event: &str, listener: Listener) -> &Self {
        let adapter = self.once_adapter(event, listener);
        self.register(event, adapter, false)
    }

    /// Front-inserting variant of [`once`](Self::once).
    pub fn prepend_once_listener(&self, event: &str, listener: Listener) -> &Self {
        let adapter = self.once_adapter(event, listener);
        self.register(event, adapter, true)
    }

    /// Remove every occurrence of `listener` from `event`.
    ///
    /// Emits one `removeListener` notification per removed occurrence. Does
    /// nothing if the listener or the event is unknown.
    pub fn remove_listener(&self, event: &str, listener: &Listener) -> &Self {
        self.remove_where(event, |l| l.matches(listener));
        self
    }

    /// Alias for [`remove_listener`](Self::remove_listener).
    pub fn off(&self, event: &str, listener: &Listener) -> &Self {
        self.remove_listener(event, listener)
    }

    /// Remove all listeners of `event`, or of every event when `None`.
    ///
    /// Sequences are detached before any `removeListener` notification is
    /// sent, so a listener that re-registers itself from such a notification
    /// stays registered. With `None`, `removeListener` observers are dropped
    /// last, after every other event has been notified.
    pub fn remove_all_listeners(&self, event: Option<&str>) -> &Self {
        match event {
            Some(event) => {
                let detached = self.inner.registry.lock().detach(event);
                for listener in detached.unwrap_or_default() {
                    self.notify(REMOVE_LISTENER, event, &listener);
                }
            }
            None => {
                let detached = self.inner.registry.lock().detach_all_except(REMOVE_LISTENER);
                for (event, listeners) in detached {
                    for listener in listeners {
                        self.notify(REMOVE_LISTENER, &event, &listener);
                    }
                }
                self.inner.registry.lock().detach(REMOVE_LISTENER);
            }
        }
        self
    }

    /// Copy of the listeners registered for `event`, in delivery order.
    ///
    /// One-shot registrations are reported as the listener passed to `once`.
    /// Mutating the returned `Vec` does not affect the emitter.
    pub fn listeners(&self, event: &str) -> Vec<Listener> {
        self.raw_listeners(event)
            .iter()
            .map(Listener::original)
            .collect()
    }

    /// Copy of the listeners registered for `event`, including one-shot
    /// wrappers as stored.
    pub fn raw_listeners(&self, event: &str) -> Vec<Listener> {
        self.inner.registry.lock().snapshot(event).unwrap_or_default()
    }

    /// Number of listeners registered for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner.registry.lock().listener_count(event)
    }

    /// Names of all events with at least one listener.
    pub fn event_names(&self) -> Vec<String> {
        self.inner.registry.lock().event_names()
    }

    /// Set the listener count per event above which a warning is logged
    /// (0 = unlimited). Registration is never refused.
    pub fn set_max_listeners(&self, n: usize) -> &Self {
        self.inner.registry.lock().set_max_listeners(n);
        self
    }

    /// Current max listeners threshold.
    pub fn get_max_listeners(&self) -> usize {
        self.inner.registry.lock().max_listeners
    }

    /// Deliver `args` to every listener of `event`.
    ///
    /// Returns `Ok(true)` if `event` had listeners when called, `Ok(false)`
    /// otherwise. With synchronous delivery a failing listener is handled
    /// according to the configured [`ErrorPolicy`]; with deferred delivery each
    /// listener runs as its own task and failures are logged.
    pub fn emit(&self, event: &str, args: impl IntoArgs) -> EventResult<bool> {
        let Some(listeners) = self.inner.registry.lock().snapshot(event) else {
            tracing::trace!(event, "emit without listeners");
            return Ok(false);
        };

        let args = args.into_args();
        tracing::trace!(event, listeners = listeners.len(), "emit");

        match self.inner.config.delivery {
            DeliveryMode::Sync => self.deliver_sync(event, &listeners, &args)?,
            DeliveryMode::Async => self.deliver_deferred(event, listeners, args),
        }
        Ok(true)
    }

    fn deliver_sync(&self, event: &str, listeners: &[Listener], args: &Args) -> EventResult<()> {
        let mut first_error = None;

        for listener in listeners {
            let Err(source) = listener.call(args) else {
                continue;
            };
            let error = EventError::listener(event, source);
            match self.inner.config.error_policy {
                ErrorPolicy::Propagate => return Err(error),
                ErrorPolicy::Continue => {
                    tracing::warn!(event, error = %error, "listener failed, continuing delivery");
                    first_error.get_or_insert(error);
                }
            }
        }

        first_error.map_or(Ok(()), Err)
    }

    fn deliver_deferred(&self, event: &str, listeners: Vec<Listener>, args: Args) {
        for listener in listeners {
            let args = Arc::clone(&args);
            let event = event.to_owned();
            self.inner.scheduler.schedule(Box::new(move || {
                if let Err(err) = listener.call(&args) {
                    tracing::error!(event = %event, error = %err, "deferred listener failed");
                }
            }));
        }
    }

    fn register(&self, event: &str, listener: Listener, prepend: bool) -> &Self {
        self.notify(NEW_LISTENER, event, &listener);

        let exceeded = self.inner.registry.lock().add(event, listener, prepend);
        if let Some(count) = exceeded {
            tracing::warn!(
                event,
                count,
                max = self.get_max_listeners(),
                "MaxListenersExceededWarning: possible EventEmitter memory leak detected, \
                 use set_max_listeners() to increase the limit"
            );
        }
        tracing::trace!(event, prepend, "listener registered");
        self
    }

    fn remove_where(&self, event: &str, pred: impl Fn(&Listener) -> bool) {
        let removed = self.inner.registry.lock().remove_matching(event, pred);
        for listener in &removed {
            tracing::trace!(event, id = listener.id(), "listener removed");
            self.notify(REMOVE_LISTENER, event, listener);
        }
    }

    fn once_adapter(&self, event: &str, listener: Listener) -> Listener {
        let id = next_listener_id();
        let fired = AtomicBool::new(false);
        let emitter: Weak<Inner> = Arc::downgrade(&self.inner);
        let event_name = event.to_owned();
        let target = listener.clone();

        Listener::once_wrapper(
            id,
            move |args| {
                if fired.swap(true, Ordering::AcqRel) {
                    return Ok(());
                }
                if let Some(inner) = emitter.upgrade() {
                    EventEmitter { inner }.remove_where(&event_name, |l| l.id() == id);
                }
                target.call(args)
            },
            listener,
        )
    }

    /// Deliver a lifecycle notification synchronously, whatever the delivery
    /// mode. Observer failures are logged and never block the mutation that
    /// triggered them.
    fn notify(&self, kind: &str, event: &str, listener: &Listener) {
        let Some(observers) = self.inner.registry.lock().snapshot(kind) else {
            return;
        };

        let args = (event, listener.original()).into_args();
        for observer in observers {
            if let Err(err) = observer.call(&args) {
                tracing::warn!(
                    notification = kind,
                    event,
                    error = %err,
                    "lifecycle listener failed"
                );
            }
        }
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("config", &self.inner.config)
            .field("events", &self.event_names())
            .finish()
    }
}
