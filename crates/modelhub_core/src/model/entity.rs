//! Entity storage and the shared instance handle.
//!
//! # Invariants
//! - `uid` is read from the `uid` field; a live entity always has `uid > 0`.
//! - Two [`Instance`] handles are equal only when they share one entity.

use super::field::UID_FIELD;
use crate::query::Record;
use crate::value::{EntityRef, Value};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Attribute values of one entity, keyed by field name.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    model: String,
    values: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(model: impl Into<String>, values: BTreeMap<String, Value>) -> Self {
        Self {
            model: model.into(),
            values,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// `0` when no positive uid is set.
    pub fn uid(&self) -> u64 {
        self.values
            .get(UID_FIELD)
            .and_then(Value::as_i64)
            .and_then(|uid| u64::try_from(uid).ok())
            .unwrap_or(0)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.values.insert(name.into(), value);
    }

    pub fn values(&self) -> &BTreeMap<String, Value> {
        &self.values
    }
}

/// Shared handle to a live entity.
#[derive(Clone)]
pub struct Instance(Rc<RefCell<Entity>>);

impl Instance {
    pub(crate) fn new(entity: Entity) -> Self {
        Self(Rc::new(RefCell::new(entity)))
    }

    pub fn model(&self) -> String {
        self.0.borrow().model.clone()
    }

    pub fn uid(&self) -> u64 {
        self.0.borrow().uid()
    }

    pub fn entity_ref(&self) -> EntityRef {
        let entity = self.0.borrow();
        EntityRef::new(entity.model.clone(), entity.uid())
    }

    /// Stored value, or null when unset.
    pub fn get(&self, name: &str) -> Value {
        self.0.borrow().get(name).cloned().unwrap_or_default()
    }

    pub(crate) fn set(&self, name: &str, value: Value) {
        self.0.borrow_mut().set(name, value);
    }

    /// Copy of the entity at this moment.
    pub fn snapshot(&self) -> Entity {
        self.0.borrow().clone()
    }
}

impl PartialEq for Instance {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Instance {}

impl Debug for Instance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let entity = self.0.borrow();
        write!(f, "{}(", entity.model)?;
        for (index, (name, value)) in entity.values.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        write!(f, ")")
    }
}

impl Record for Instance {
    fn attr(&self, name: &str) -> Option<Value> {
        self.0.borrow().get(name).cloned()
    }
}
