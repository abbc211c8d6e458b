//! Per-model container: resolved attributes, live instances, event helpers.
//!
//! # Responsibility
//! - Hold the attribute set resolved along the inheritance chain.
//! - Track live instances of the model, unique by uid.
//! - Build `<Model>/<uid>/<method>[/<name>]` topics.
//!
//! # Invariants
//! - Attribute names are unique; re-adding a name replaces the old attribute.
//! - `fields`, `foreign_keys` and `methods` are live views over `attributes`.
//! - At most one live instance per uid.

use super::attribute::{Attribute, AttributeKind};
use super::declaration::{DeleteKind, DeleteMode};
use super::entity::Instance;
use super::field::Field;
use super::foreign_key::ForeignKey;
use super::method::Method;
use crate::error::{RuntimeError, RuntimeResult};
use crate::event::{entity_topic, Delivery, EventBus, Subscription, TopicError};
use crate::query::{Query, Record};
use crate::service::Rights;
use crate::value::Value;
use std::cell::RefCell;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

pub struct ModelHandler {
    name: String,
    parent: Option<String>,
    ancestors: Vec<String>,
    is_abstract: bool,
    delete_mode: DeleteMode,
    effective_delete_mode: DeleteMode,
    attributes: Query<Attribute>,
    fields: Query<Attribute>,
    foreign_keys: Query<Attribute>,
    methods: Query<Attribute>,
    instances: Query<Instance>,
    rights: Option<Rc<dyn Rights>>,
    subscriptions: RefCell<Vec<Subscription>>,
}

impl Debug for ModelHandler {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelHandler")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("is_abstract", &self.is_abstract)
            .field("delete_mode", &self.effective_delete_mode)
            .field("attributes", &self.attribute_names())
            .field("instances", &self.instances.backing_len())
            .finish()
    }
}

impl ModelHandler {
    pub(crate) fn new(
        name: String,
        parent: Option<String>,
        ancestors: Vec<String>,
        is_abstract: bool,
        delete_mode: DeleteMode,
        effective_delete_mode: DeleteMode,
        rights: Option<Rc<dyn Rights>>,
    ) -> Self {
        let attributes: Query<Attribute> = Query::new().safe();
        let of_kind = |kind: AttributeKind| {
            attributes
                .keep(move |attribute| attribute.kind() == kind)
                .safe()
        };
        let fields = of_kind(AttributeKind::Field);
        let foreign_keys = of_kind(AttributeKind::ForeignKey);
        let methods = of_kind(AttributeKind::Method);
        Self {
            name,
            parent,
            ancestors,
            is_abstract,
            delete_mode,
            effective_delete_mode,
            attributes,
            fields,
            foreign_keys,
            methods,
            instances: Query::new().safe(),
            rights,
            subscriptions: RefCell::new(Vec::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Ancestor names, most-base first.
    pub fn ancestors(&self) -> &[String] {
        &self.ancestors
    }

    /// True for this model and any of its ancestors.
    pub fn is_a(&self, model: &str) -> bool {
        self.name == model || self.ancestors.iter().any(|ancestor| ancestor == model)
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// Mode as declared, possibly `Inherit`.
    pub fn declared_delete_mode(&self) -> DeleteMode {
        self.delete_mode
    }

    /// Mode after walking the ancestors; never `Inherit`.
    pub fn delete_mode(&self) -> DeleteMode {
        self.effective_delete_mode
    }

    pub fn on_delete(&self, requested: Option<DeleteKind>) -> RuntimeResult<DeleteKind> {
        self.effective_delete_mode
            .resolve(requested)
            .ok_or_else(|| RuntimeError::DeleteModeForbidden {
                model: self.name.clone(),
                requested: requested.unwrap_or(DeleteKind::Soft),
                policy: self.effective_delete_mode,
            })
    }

    pub fn rights(&self) -> Option<&Rc<dyn Rights>> {
        self.rights.as_ref()
    }

    pub fn attributes(&self) -> Query<Attribute> {
        self.attributes.clone()
    }

    pub fn fields(&self) -> Query<Attribute> {
        self.fields.clone()
    }

    pub fn foreign_keys(&self) -> Query<Attribute> {
        self.foreign_keys.clone()
    }

    pub fn methods(&self) -> Query<Attribute> {
        self.methods.clone()
    }

    pub fn attribute_names(&self) -> Vec<String> {
        self.attributes
            .iter()
            .map(|attribute| attribute.name().to_string())
            .collect()
    }

    /// Adds or replaces (by name) an attribute.
    pub fn add_attribute(&self, attribute: Attribute) -> RuntimeResult<()> {
        let name = attribute.name().to_string();
        if self.get_attribute(&name).is_some() {
            self.attributes
                .replace_where(|candidate| candidate.name() == name, attribute)?;
        } else {
            self.attributes.append(attribute)?;
        }
        Ok(())
    }

    pub fn get_attribute(&self, name: &str) -> Option<Attribute> {
        self.attributes
            .iter()
            .find(|attribute| attribute.name() == name)
    }

    pub fn get_field(&self, name: &str) -> Option<Rc<Field>> {
        self.get_attribute(name)
            .and_then(|attribute| attribute.as_field().cloned())
    }

    pub fn get_foreign_key(&self, name: &str) -> Option<Rc<ForeignKey>> {
        self.get_attribute(name)
            .and_then(|attribute| attribute.as_foreign_key().cloned())
    }

    pub fn get_method(&self, name: &str) -> Option<Rc<Method>> {
        self.get_attribute(name)
            .and_then(|attribute| attribute.as_method().cloned())
    }

    /// Stored fields as descriptors.
    pub fn field_list(&self) -> Vec<Rc<Field>> {
        self.fields
            .iter()
            .filter_map(|attribute| attribute.as_field().cloned())
            .collect()
    }

    pub fn instances(&self) -> Query<Instance> {
        self.instances.clone()
    }

    pub fn add_instance(&self, instance: Instance) -> RuntimeResult<()> {
        let uid = instance.uid();
        if self.get_instance(uid).is_some() {
            return Err(RuntimeError::AlreadyExists {
                model: self.name.clone(),
                uid,
            });
        }
        self.instances.append(instance)?;
        Ok(())
    }

    pub fn get_instance(&self, uid: u64) -> Option<Instance> {
        self.instances
            .iter()
            .find(|instance| instance.uid() == uid)
    }

    /// No-op when the instance is not tracked.
    pub fn del_instance(&self, instance: &Instance) {
        let _ = self.instances.remove(instance);
    }

    pub(crate) fn clear_instances(&self) -> RuntimeResult<usize> {
        Ok(self.instances.remove_where(|_| true)?)
    }

    /// `<Model>/<uid>/<method>` or `<Model>/<uid>/<method>/<name>`.
    pub fn event(&self, uid: u64, method: &str, name: Option<&str>) -> String {
        entity_topic(&self.name, uid, method, name)
    }

    pub fn emit(
        &self,
        events: &EventBus,
        uid: u64,
        method: &str,
        name: Option<&str>,
        value: Value,
    ) -> usize {
        events.emit(&self.event(uid, method, name), value)
    }

    /// Subscribes to this model's topics; `uid` and `name` accept patterns
    /// such as `#` or `*`.
    pub fn on(
        &self,
        events: &EventBus,
        uid: &str,
        method: &str,
        name: Option<&str>,
        callback: impl Fn(&Delivery) + 'static,
    ) -> Result<Subscription, TopicError> {
        let topic = match name {
            Some(name) => format!("{}/{uid}/{method}/{name}", self.name),
            None => format!("{}/{uid}/{method}", self.name),
        };
        events.on(&topic, callback)
    }

    pub(crate) fn keep_subscriptions(&self, subscriptions: Vec<Subscription>) {
        self.subscriptions.borrow_mut().extend(subscriptions);
    }

    /// Drops the subscriptions owned by this model (used on redeclaration).
    pub(crate) fn release_subscriptions(&self) {
        for subscription in self.subscriptions.borrow_mut().drain(..) {
            subscription.unsubscribe();
        }
    }

    /// One line per field in rpy notation.
    pub fn rpy(&self) -> String {
        self.field_list()
            .iter()
            .map(|field| field.to_rpy())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Record for Rc<ModelHandler> {
    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(self.name())),
            "abstract" => Some(Value::Bool(self.is_abstract())),
            _ => None,
        }
    }
}
