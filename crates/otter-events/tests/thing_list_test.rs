//! Synchronous delivery through a composed consumer.
//!
//! `ThingList` owns an `EventEmitter` and reports its own state changes as
//! `addThing`, `removeThing` and `error` events.

use otter_events::{
    ErrorPolicy, EmitterConfig, EventEmitter, EventError, EventResult, Listener, NEW_LISTENER,
    REMOVE_LISTENER, Value,
};
use parking_lot::Mutex;
use std::sync::Arc;

struct ThingList {
    events: EventEmitter,
    things: Mutex<Vec<String>>,
}

impl ThingList {
    fn new() -> Self {
        Self {
            events: EventEmitter::synchronous(),
            things: Mutex::new(Vec::new()),
        }
    }

    fn add(&self, name: &str) -> EventResult<bool> {
        let duplicate = {
            let mut things = self.things.lock();
            let duplicate = things.iter().any(|t| t == name);
            if !duplicate {
                things.push(name.to_string());
            }
            duplicate
        };

        if duplicate {
            self.events.emit(
                "error",
                (format!("cannot add \"{name}\", already added."),),
            )
        } else {
            self.events.emit("addThing", (name,))
        }
    }

    fn remove(&self, name: &str) -> EventResult<bool> {
        let removed = {
            let mut things = self.things.lock();
            let before = things.len();
            things.retain(|t| t != name);
            things.len() != before
        };

        if removed {
            self.events.emit("removeThing", (name,))
        } else {
            self.events.emit(
                "error",
                (format!("cannot remove \"{name}\", no such thing."),),
            )
        }
    }

    fn on(&self, event: &str, listener: Listener) -> &Self {
        self.events.on(event, listener);
        self
    }

    /// Typed subscription to `addThing`.
    fn on_add_thing(&self, f: impl Fn(&str) + Send + Sync + 'static) -> Listener {
        let listener = Listener::infallible(move |args| {
            f(args.first().and_then(Value::as_str).unwrap_or_default())
        });
        self.events.on("addThing", listener.clone());
        listener
    }

    fn remove_listener(&self, event: &str, listener: &Listener) -> &Self {
        self.events.remove_listener(event, listener);
        self
    }
}

type Log = Arc<Mutex<Vec<String>>>;

/// Listener recording its first string argument.
fn recorder() -> (Listener, Log) {
    let log: Log = Arc::default();
    let sink = Arc::clone(&log);
    let listener = Listener::infallible(move |args| {
        let arg = args.first().and_then(Value::as_str).unwrap_or_default();
        sink.lock().push(arg.to_string());
    });
    (listener, log)
}

/// Listener recording `(event, listener id)` of lifecycle notifications.
fn notification_recorder() -> (Listener, Arc<Mutex<Vec<(String, u64)>>>) {
    let log: Arc<Mutex<Vec<(String, u64)>>> = Arc::default();
    let sink = Arc::clone(&log);
    let listener = Listener::infallible(move |args| {
        let event = args[0].as_str().unwrap_or_default().to_string();
        let id = args[1].as_listener().map(Listener::id).unwrap_or_default();
        sink.lock().push((event, id));
    });
    (listener, log)
}

mod scenarios {
    use super::*;

    #[test]
    fn test_single_listener_single_addition() {
        let things = ThingList::new();
        let (listener, log) = recorder();

        things.on("addThing", listener);
        assert!(things.add("train").unwrap());

        assert_eq!(*log.lock(), vec!["train"]);
    }

    #[test]
    fn test_two_listeners_single_addition() {
        let things = ThingList::new();
        let (first, first_log) = recorder();
        let (second, second_log) = recorder();

        things.on("addThing", first).on("addThing", second);
        things.add("train").unwrap();

        assert_eq!(*first_log.lock(), vec!["train"]);
        assert_eq!(*second_log.lock(), vec!["train"]);
    }

    #[test]
    fn test_two_listeners_two_additions() {
        let things = ThingList::new();
        let (first, first_log) = recorder();
        let (second, second_log) = recorder();

        things.on("addThing", first).on("addThing", second);
        things.add("train").unwrap();
        things.add("drums").unwrap();

        assert_eq!(*first_log.lock(), vec!["train", "drums"]);
        assert_eq!(*second_log.lock(), vec!["train", "drums"]);
    }

    #[test]
    fn test_remove_second_listener_between_additions() {
        let things = ThingList::new();
        let (first, first_log) = recorder();
        let (second, second_log) = recorder();

        things
            .on("addThing", first)
            .on("addThing", second.clone());
        things.add("train").unwrap();
        things.remove_listener("addThing", &second);
        things.add("drums").unwrap();

        assert_eq!(first_log.lock().len(), 2);
        assert_eq!(second_log.lock().len(), 1);
    }

    #[test]
    fn test_typed_wrapper() {
        let things = ThingList::new();
        let seen: Log = Arc::default();

        let sink = Arc::clone(&seen);
        let listener = things.on_add_thing(move |name| sink.lock().push(name.to_string()));
        things.add("train").unwrap();
        things.remove_listener("addThing", &listener);
        things.add("drums").unwrap();

        assert_eq!(*seen.lock(), vec!["train"]);
    }

    #[test]
    fn test_consumer_errors_are_events() {
        let things = ThingList::new();
        let (errors, error_log) = recorder();
        let (removed, removed_log) = recorder();

        things.on("error", errors).on("removeThing", removed);

        things.add("train").unwrap();
        things.add("train").unwrap();
        things.remove("train").unwrap();
        things.remove("train").unwrap();

        assert_eq!(*removed_log.lock(), vec!["train"]);
        assert_eq!(
            *error_log.lock(),
            vec![
                "cannot add \"train\", already added.",
                "cannot remove \"train\", no such thing.",
            ]
        );
    }

    #[test]
    fn test_unobserved_event_reports_no_listeners() {
        let things = ThingList::new();
        assert!(!things.add("train").unwrap());
    }
}

mod registry {
    use super::*;

    #[test]
    fn test_registration_order_preserved() {
        let emitter = EventEmitter::synchronous();
        let order = Arc::new(Mutex::new(Vec::new()));

        for i in 0..5 {
            let order = Arc::clone(&order);
            emitter.on("x", Listener::infallible(move |_| order.lock().push(i)));
        }
        emitter.emit("x", ()).unwrap();

        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_duplicate_registration_fires_twice_and_is_removed_together() {
        let emitter = EventEmitter::synchronous();
        let (listener, log) = recorder();

        emitter.on("x", listener.clone()).on("x", listener.clone());
        emitter.emit("x", ("a",)).unwrap();
        assert_eq!(log.lock().len(), 2);

        emitter.remove_listener("x", &listener);
        assert!(!emitter.emit("x", ("b",)).unwrap());
        assert_eq!(log.lock().len(), 2);
        assert!(emitter.event_names().is_empty());
    }

    #[test]
    fn test_removal_after_remove_all() {
        let emitter = EventEmitter::synchronous();
        emitter
            .on("x", recorder().0)
            .on("x", recorder().0)
            .on("y", recorder().0);

        emitter.remove_all_listeners(Some("x"));

        assert!(emitter.listeners("x").is_empty());
        assert_eq!(emitter.event_names(), vec!["y".to_string()]);
    }

    #[test]
    fn test_listeners_returns_a_copy() {
        let emitter = EventEmitter::synchronous();
        let (listener, _) = recorder();
        emitter.on("x", listener);

        let mut copy = emitter.listeners("x");
        copy.clear();

        assert_eq!(emitter.listener_count("x"), 1);
    }

    #[test]
    fn test_forwarded_arguments() {
        let emitter = EventEmitter::synchronous();
        let received = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&received);
        emitter.on(
            "x",
            Listener::infallible(move |args| sink.lock().extend_from_slice(args)),
        );
        emitter
            .emit("x", ("a", 2, true, serde_json::json!({ "k": "v" })))
            .unwrap();

        let received = received.lock();
        assert_eq!(received.len(), 4);
        assert_eq!(received[0].as_str(), Some("a"));
        assert_eq!(received[1].as_f64(), Some(2.0));
        assert_eq!(received[2].as_bool(), Some(true));
        assert_eq!(received[3].as_json().unwrap()["k"], "v");
    }
}

mod notifications {
    use super::*;

    #[test]
    fn test_new_listener_sees_registration_before_it_is_stored() {
        let emitter = EventEmitter::synchronous();
        let visible = Arc::new(Mutex::new(Vec::new()));

        let handle = emitter.clone();
        let sink = Arc::clone(&visible);
        emitter.on(
            NEW_LISTENER,
            Listener::infallible(move |args| {
                let event = args[0].as_str().unwrap_or_default();
                sink.lock().push(handle.listener_count(event));
            }),
        );

        let (f, _) = recorder();
        emitter.on("x", f.clone());
        emitter.on("x", f);

        assert_eq!(*visible.lock(), vec![0, 1]);
    }

    #[test]
    fn test_new_listener_carries_event_and_listener() {
        let emitter = EventEmitter::synchronous();
        let (observer, log) = notification_recorder();
        let (f, _) = recorder();

        emitter.on(NEW_LISTENER, observer);
        emitter.on("x", f.clone());

        assert_eq!(*log.lock(), vec![("x".to_string(), f.id())]);
    }

    #[test]
    fn test_remove_all_listeners_notifies_each() {
        let emitter = EventEmitter::synchronous();
        let (observer, log) = notification_recorder();
        let listeners: Vec<Listener> = (0..3).map(|_| recorder().0).collect();

        emitter.on(REMOVE_LISTENER, observer);
        for listener in &listeners {
            emitter.on("x", listener.clone());
        }
        emitter.remove_all_listeners(Some("x"));

        let expected: Vec<(String, u64)> = listeners
            .iter()
            .map(|l| ("x".to_string(), l.id()))
            .collect();
        assert_eq!(*log.lock(), expected);
    }

    #[test]
    fn test_remove_listener_notifies_per_occurrence() {
        let emitter = EventEmitter::synchronous();
        let (observer, log) = notification_recorder();
        let (f, _) = recorder();
        let (g, _) = recorder();

        emitter.on(REMOVE_LISTENER, observer);
        emitter.on("x", f.clone()).on("x", g.clone()).on("x", f.clone());
        emitter.remove_listener("x", &f);
        emitter.remove_listener("x", &f);

        assert_eq!(
            *log.lock(),
            vec![("x".to_string(), f.id()), ("x".to_string(), f.id())]
        );
        assert_eq!(emitter.listeners("x"), vec![g]);
    }

    #[test]
    fn test_reregistering_from_removal_notification_survives() {
        let emitter = EventEmitter::synchronous();
        let (f, _) = recorder();

        let handle = emitter.clone();
        let again = f.clone();
        emitter.on(
            REMOVE_LISTENER,
            Listener::infallible(move |args| {
                if args[1].as_listener() == Some(&again) {
                    handle.on("x", again.clone());
                }
            }),
        );
        emitter.on("x", f.clone());
        emitter.remove_all_listeners(Some("x"));

        assert_eq!(emitter.listeners("x"), vec![f]);
    }

    #[test]
    fn test_remove_all_events() {
        let emitter = EventEmitter::synchronous();
        let (observer, log) = notification_recorder();

        emitter.on(REMOVE_LISTENER, observer);
        emitter.on("x", recorder().0).on("y", recorder().0);
        emitter.remove_all_listeners(None);

        let mut events: Vec<String> = log.lock().iter().map(|(e, _)| e.clone()).collect();
        events.sort();
        assert_eq!(events, vec!["x", "y"]);
        assert!(emitter.event_names().is_empty());
    }

    #[test]
    fn test_failing_observer_does_not_block_registration() {
        let emitter = EventEmitter::synchronous();
        emitter.on(NEW_LISTENER, Listener::new(|_| Err("observer broke".into())));

        let (f, _) = recorder();
        emitter.on("x", f.clone());

        assert_eq!(emitter.listeners("x"), vec![f]);
    }
}

mod dispatch {
    use super::*;

    #[test]
    fn test_failure_aborts_remaining_listeners() {
        let emitter = EventEmitter::synchronous();
        let (before, before_log) = recorder();
        let (after, after_log) = recorder();

        emitter
            .on("x", before)
            .on("x", Listener::new(|_| Err("boom".into())))
            .on("x", after);

        let err = emitter.emit("x", ("a",)).unwrap_err();
        assert!(matches!(err, EventError::Listener { ref event, .. } if event == "x"));
        assert_eq!(before_log.lock().len(), 1);
        assert!(after_log.lock().is_empty());
    }

    #[test]
    fn test_continue_policy_runs_everyone_and_reports_first_failure() {
        let emitter = EventEmitter::with_config(
            EmitterConfig::synchronous().error_policy(ErrorPolicy::Continue),
        );
        let (after, after_log) = recorder();

        emitter
            .on("x", Listener::new(|_| Err("first".into())))
            .on("x", Listener::new(|_| Err("second".into())))
            .on("x", after);

        let err = emitter.emit("x", ("a",)).unwrap_err();
        assert_eq!(err.to_string(), "listener for 'x' failed: first");
        assert_eq!(*after_log.lock(), vec!["a"]);
    }

    #[test]
    fn test_removal_during_delivery_uses_snapshot() {
        let emitter = EventEmitter::synchronous();
        let (victim, victim_log) = recorder();

        let handle = emitter.clone();
        let target = victim.clone();
        emitter.on(
            "x",
            Listener::infallible(move |_| {
                handle.remove_listener("x", &target);
            }),
        );
        emitter.on("x", victim);

        emitter.emit("x", ("first",)).unwrap();
        emitter.emit("x", ("second",)).unwrap();

        assert_eq!(*victim_log.lock(), vec!["first"]);
    }

    #[test]
    fn test_listener_added_during_delivery_waits_for_next_emit() {
        let emitter = EventEmitter::synchronous();
        let (late, late_log) = recorder();

        let handle = emitter.clone();
        emitter.once(
            "x",
            Listener::infallible(move |_| {
                handle.on("x", late.clone());
            }),
        );

        emitter.emit("x", ("first",)).unwrap();
        assert!(late_log.lock().is_empty());

        emitter.emit("x", ("second",)).unwrap();
        assert_eq!(*late_log.lock(), vec!["second"]);
    }

    #[test]
    fn test_once_fires_once() {
        let emitter = EventEmitter::synchronous();
        let (listener, log) = recorder();

        emitter.once("x", listener);
        assert!(emitter.emit("x", ("a",)).unwrap());
        assert!(!emitter.emit("x", ("b",)).unwrap());

        assert_eq!(*log.lock(), vec!["a"]);
        assert!(emitter.event_names().is_empty());
    }

    #[test]
    fn test_once_reentrant_emit_fires_once() {
        let emitter = EventEmitter::synchronous();
        let calls = Arc::new(Mutex::new(0));

        let handle = emitter.clone();
        let counter = Arc::clone(&calls);
        emitter.once(
            "x",
            Listener::new(move |_| {
                *counter.lock() += 1;
                handle.emit("x", ())?;
                Ok(())
            }),
        );
        emitter.emit("x", ()).unwrap();

        assert_eq!(*calls.lock(), 1);
    }

    #[test]
    fn test_once_can_be_removed_by_original() {
        let emitter = EventEmitter::synchronous();
        let (observer, removals) = notification_recorder();
        let (listener, log) = recorder();

        emitter.on(REMOVE_LISTENER, observer);
        emitter.once("x", listener.clone());
        emitter.remove_listener("x", &listener);

        assert!(!emitter.emit("x", ("a",)).unwrap());
        assert!(log.lock().is_empty());
        assert_eq!(*removals.lock(), vec![("x".to_string(), listener.id())]);
    }

    #[test]
    fn test_prepend_once_listener_runs_first() {
        let emitter = EventEmitter::synchronous();
        let order = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&order);
        emitter.on("x", Listener::infallible(move |_| sink.lock().push("on")));
        let sink = Arc::clone(&order);
        emitter.prepend_once_listener(
            "x",
            Listener::infallible(move |_| sink.lock().push("once")),
        );

        emitter.emit("x", ()).unwrap();
        emitter.emit("x", ()).unwrap();

        assert_eq!(*order.lock(), vec!["once", "on", "on"]);
    }
}
