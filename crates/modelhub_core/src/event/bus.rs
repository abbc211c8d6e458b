//! Synchronous topic-based publish/subscribe.
//!
//! # Responsibility
//! - Keep subscriptions in insertion order and deliver matching emissions.
//!
//! # Invariants
//! - Delivery runs on a snapshot of the subscriber list; a subscription
//!   removed mid-delivery is not called afterwards.
//! - Nested emissions from inside a callback are delivered depth-first.
//! - Callback panics are not caught.

use super::topic::{Topic, TopicError};
use crate::value::Value;
use log::trace;
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

/// One delivery to one subscriber.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: String,
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
    pub value: Value,
}

impl Delivery {
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    pub fn kwarg(&self, name: &str) -> Option<&Value> {
        self.kwargs.get(name)
    }
}

type Callback = Rc<dyn Fn(&Delivery)>;

struct Entry {
    id: u64,
    topic: Rc<Topic>,
    callback: Callback,
}

#[derive(Default)]
struct Subscribers {
    next_id: Cell<u64>,
    entries: RefCell<Vec<Entry>>,
}

impl Subscribers {
    fn is_active(&self, id: u64) -> bool {
        self.entries.borrow().iter().any(|entry| entry.id == id)
    }

    fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries.borrow_mut();
        let before = entries.len();
        entries.retain(|entry| entry.id != id);
        entries.len() != before
    }
}

/// Handle returned by [`EventBus::on`].
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to remove it.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    topic: String,
    subscribers: Weak<Subscribers>,
}

impl std::fmt::Debug for Subscribers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscribers")
            .field("count", &self.entries.borrow().len())
            .finish()
    }
}

impl Subscription {
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Returns `false` when already removed or when the bus is gone.
    pub fn unsubscribe(&self) -> bool {
        self.subscribers
            .upgrade()
            .is_some_and(|subscribers| subscribers.remove(self.id))
    }

    pub fn is_active(&self) -> bool {
        self.subscribers
            .upgrade()
            .is_some_and(|subscribers| subscribers.is_active(self.id))
    }
}

/// Cloneable bus handle; clones share subscriptions.
#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Rc<Subscribers>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(
        &self,
        topic: &str,
        callback: impl Fn(&Delivery) + 'static,
    ) -> Result<Subscription, TopicError> {
        let parsed = Topic::parse(topic)?;
        let id = self.subscribers.next_id.get();
        self.subscribers.next_id.set(id + 1);
        self.subscribers.entries.borrow_mut().push(Entry {
            id,
            topic: Rc::new(parsed),
            callback: Rc::new(callback),
        });
        trace!("event=event_subscribe module=event status=ok topic={topic} id={id}");
        Ok(Subscription {
            id,
            topic: topic.to_string(),
            subscribers: Rc::downgrade(&self.subscribers),
        })
    }

    /// Delivers `value` to every matching subscription; returns the number of
    /// callbacks invoked.
    pub fn emit(&self, topic: &str, value: Value) -> usize {
        let snapshot: Vec<(u64, Rc<Topic>, Callback)> = self
            .subscribers
            .entries
            .borrow()
            .iter()
            .map(|entry| (entry.id, Rc::clone(&entry.topic), Rc::clone(&entry.callback)))
            .collect();

        let mut delivered = 0;
        for (id, pattern, callback) in snapshot {
            let Some(captures) = pattern.matches(topic) else {
                continue;
            };
            if !self.subscribers.is_active(id) {
                continue;
            }
            let delivery = Delivery {
                topic: topic.to_string(),
                args: captures.args,
                kwargs: captures.kwargs,
                value: value.clone(),
            };
            callback(&delivery);
            delivered += 1;
        }
        trace!("event=event_emit module=event status=ok topic={topic} delivered={delivered}");
        delivered
    }

    pub fn len(&self) -> usize {
        self.subscribers.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;
    use crate::value::Value;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn delivers_captures_in_subscription_order() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let first = Rc::clone(&log);
        bus.on("Book/#/<action>", move |delivery| {
            first.borrow_mut().push(format!(
                "a:{:?}:{:?}",
                delivery.arg(0),
                delivery.kwarg("action")
            ));
        })
        .unwrap();
        let second = Rc::clone(&log);
        bus.on("Book/*/create", move |_| second.borrow_mut().push("b".into()))
            .unwrap();

        assert_eq!(bus.emit("Book/7/create", Value::Null), 2);
        assert_eq!(
            log.borrow().as_slice(),
            &[
                "a:Some(Int(7)):Some(Str(\"create\"))".to_string(),
                "b".to_string()
            ]
        );
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let subscription = bus.on("x", |_| {}).unwrap();
        assert!(subscription.unsubscribe());
        assert!(!subscription.unsubscribe());
        assert_eq!(bus.emit("x", Value::Null), 0);
    }

    #[test]
    fn nested_emission_is_depth_first() {
        let bus = EventBus::new();
        let log = Rc::new(RefCell::new(Vec::new()));

        let inner_bus = bus.clone();
        let outer = Rc::clone(&log);
        bus.on("a", move |_| {
            outer.borrow_mut().push("a:start");
            inner_bus.emit("b", Value::Null);
            outer.borrow_mut().push("a:end");
        })
        .unwrap();
        let inner = Rc::clone(&log);
        bus.on("b", move |_| inner.borrow_mut().push("b")).unwrap();

        bus.emit("a", Value::Null);
        assert_eq!(log.borrow().as_slice(), &["a:start", "b", "a:end"]);
    }
}
