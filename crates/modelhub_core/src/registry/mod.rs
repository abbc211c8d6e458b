//! Model catalogue and runtime context.
//!
//! # Responsibility
//! - Declare models: resolve inheritance, validate datatypes, wire foreign
//!   keys to the event bus.
//! - Own the event bus, the record store, and the runtime configuration.
//! - Resolve relation values to entity references.
//!
//! # Invariants
//! - Every registry declares the abstract root model `Model` (with `uid`).
//! - Model names are unique unless a declaration asks to overwrite.
//! - Abstract models are never instantiated and never listed in `models()`.
//! - The handle is single-threaded (`!Send`); clones share one catalogue.

mod lifecycle;

use crate::config::RuntimeConfig;
use crate::error::{DeclarationError, RuntimeError, RuntimeResult};
use crate::event::EventBus;
use crate::model::{Attribute, DataType, DeleteMode, Instance, ModelDef, ModelHandler};
use crate::query::Query;
use crate::repo::{MemoryStore, RecordStore};
use crate::value::Value;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Debug, Formatter};
use std::rc::{Rc, Weak};

static MODEL_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid model name regex"));
static UID_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9]+$").expect("valid uid text regex"));

/// Shared handle to a declared model.
pub type Model = Rc<ModelHandler>;

struct RegistryInner {
    config: RuntimeConfig,
    models: Query<Model>,
    declared: RefCell<BTreeMap<String, Model>>,
    events: EventBus,
    store: Box<dyn RecordStore>,
}

/// Cloneable runtime handle passed to the CRUD layer and the api.
#[derive(Clone)]
pub struct Registry {
    inner: Rc<RegistryInner>,
}

/// Non-owning registry handle held by event callbacks.
#[derive(Clone)]
pub struct WeakRegistry(Weak<RegistryInner>);

impl WeakRegistry {
    pub fn upgrade(&self) -> Option<Registry> {
        self.0.upgrade().map(|inner| Registry { inner })
    }
}

impl Debug for Registry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field(
                "declared",
                &self.inner.declared.borrow().keys().collect::<Vec<_>>(),
            )
            .field("subscriptions", &self.inner.events.len())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Builds a registry over `store` and declares the root model.
    pub fn new(config: RuntimeConfig, store: impl RecordStore + 'static) -> RuntimeResult<Self> {
        let registry = Self {
            inner: Rc::new(RegistryInner {
                config,
                models: Query::new().safe(),
                declared: RefCell::new(BTreeMap::new()),
                events: EventBus::new(),
                store: Box::new(store),
            }),
        };
        registry.declare(ModelDef::root(), false)?;
        Ok(registry)
    }

    /// Default configuration over a [`MemoryStore`].
    pub fn in_memory() -> RuntimeResult<Self> {
        Self::new(RuntimeConfig::default(), MemoryStore::new())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.inner.store.as_ref()
    }

    pub fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Rc::downgrade(&self.inner))
    }

    /// Loads every stored record when `load_all` is configured.
    pub fn warm_up(&self) -> RuntimeResult<()> {
        if self.inner.config.load_all {
            self.load_everything()?;
        }
        Ok(())
    }

    /// Concrete (instantiable) models.
    pub fn models(&self) -> Query<Model> {
        self.inner.models.clone()
    }

    pub fn get_model(&self, name: &str) -> Option<Model> {
        self.inner
            .models
            .where_eq("name", Value::from(name))
            .first()
    }

    pub fn model(&self, name: &str) -> RuntimeResult<Model> {
        self.get_model(name)
            .ok_or_else(|| RuntimeError::UnknownModel(name.to_string()))
    }

    /// Any declared model, abstract ones included.
    pub fn declaration(&self, name: &str) -> Option<Model> {
        self.inner.declared.borrow().get(name).cloned()
    }

    /// Declares a model from `def`.
    ///
    /// Attributes are resolved along the inheritance chain, most-base first,
    /// so a redeclared attribute overrides the inherited one. Relation
    /// datatypes must name a declared model or the model itself.
    pub fn declare(&self, def: ModelDef, overwrite: bool) -> RuntimeResult<Model> {
        let ModelDef {
            name,
            parent,
            is_abstract,
            delete_mode,
            attributes,
            rights,
        } = def;

        if !MODEL_NAME_RE.is_match(&name) {
            return Err(DeclarationError::InvalidModelName(name).into());
        }
        if self.declaration(&name).is_some() && !overwrite {
            return Err(DeclarationError::DuplicateModel(name).into());
        }

        let parent_model = match &parent {
            Some(parent_name) => Some(self.declaration(parent_name).ok_or_else(|| {
                DeclarationError::UnknownParent {
                    model: name.clone(),
                    parent: parent_name.clone(),
                }
            })?),
            None => None,
        };
        let ancestors = parent_model
            .as_ref()
            .map(|parent| {
                let mut chain = parent.ancestors().to_vec();
                chain.push(parent.name().to_string());
                chain
            })
            .unwrap_or_default();

        let effective_delete_mode = match (delete_mode, &parent_model) {
            (DeleteMode::Inherit, Some(parent)) => parent.delete_mode(),
            (DeleteMode::Inherit, None) => {
                return Err(DeclarationError::InvalidDeleteMode(format!(
                    "`{name}` inherits its delete mode but has no parent"
                ))
                .into())
            }
            (mode, _) => mode,
        };
        let rights = rights.or_else(|| parent_model.as_ref().and_then(|p| p.rights().cloned()));

        let handler = Rc::new(ModelHandler::new(
            name.clone(),
            parent,
            ancestors.clone(),
            is_abstract,
            delete_mode,
            effective_delete_mode,
            rights,
        ));
        for ancestor in &ancestors {
            if let Some(ancestor) = self.declaration(ancestor) {
                for attribute in ancestor.attributes().iter() {
                    handler.add_attribute(attribute)?;
                }
            }
        }
        for attribute in attributes {
            self.validate_attribute(&name, &attribute)?;
            handler.add_attribute(attribute)?;
        }

        self.add_model(Rc::clone(&handler), overwrite)?;

        if !is_abstract {
            let mut subscriptions = Vec::new();
            for attribute in handler.foreign_keys().iter() {
                if let Some(foreign_key) = attribute.as_foreign_key() {
                    subscriptions.extend(foreign_key.wire(self, &name)?);
                }
            }
            handler.keep_subscriptions(subscriptions);
        }

        info!(
            "event=model_declare module=registry status=ok model={} abstract={} attributes={} delete_mode={}",
            name,
            is_abstract,
            handler.attributes().count(),
            effective_delete_mode.as_str()
        );
        Ok(handler)
    }

    fn validate_attribute(&self, model: &str, attribute: &Attribute) -> RuntimeResult<()> {
        let Some(field) = attribute.as_field() else {
            return Ok(());
        };
        if let DataType::Model(target) = field.datatype() {
            if target != model && self.declaration(target).is_none() {
                return Err(DeclarationError::UnknownDataType {
                    model: model.to_string(),
                    field: field.name().to_string(),
                    datatype: target.clone(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Registers a built handler. Overwriting drops the previous model's
    /// subscriptions and live instances.
    pub fn add_model(&self, model: Model, overwrite: bool) -> RuntimeResult<()> {
        let name = model.name().to_string();
        if let Some(previous) = self.declaration(&name) {
            if !overwrite {
                return Err(DeclarationError::DuplicateModel(name).into());
            }
            previous.release_subscriptions();
            previous.clear_instances()?;
            self.inner
                .models
                .remove_where(|candidate| candidate.name() == name)?;
            warn!("event=model_overwrite module=registry status=ok model={name}");
        }
        self.inner
            .declared
            .borrow_mut()
            .insert(name, Rc::clone(&model));
        if !model.is_abstract() {
            self.inner.models.append(model)?;
        }
        Ok(())
    }

    /// Type check that accepts references to descendants of a relation target.
    pub fn value_matches(&self, datatype: &DataType, value: &Value) -> bool {
        match (datatype, value) {
            (DataType::Model(target), Value::Ref(reference)) => {
                &reference.model == target
                    || self
                        .declaration(&reference.model)
                        .is_some_and(|model| model.is_a(target))
            }
            _ => datatype.accepts(value),
        }
    }

    /// Relation depth: `0` without relation fields, else one more than the
    /// deepest target. Self references and cycles count as `0`.
    pub fn level(&self, name: &str) -> usize {
        self.level_within(name, &mut BTreeSet::new())
    }

    fn level_within(&self, name: &str, visiting: &mut BTreeSet<String>) -> usize {
        if !visiting.insert(name.to_string()) {
            return 0;
        }
        let level = self.declaration(name).map_or(0, |model| {
            model
                .field_list()
                .iter()
                .filter_map(|field| field.target_model().map(str::to_string))
                .filter(|target| target != name)
                .map(|target| self.level_within(&target, visiting) + 1)
                .max()
                .unwrap_or(0)
        });
        visiting.remove(name);
        level
    }

    pub fn get_instance(&self, model: &str, uid: u64) -> Option<Instance> {
        self.get_model(model)?.get_instance(uid)
    }

    /// Resolves one relation item for `target`.
    ///
    /// References pass through; a positive uid (int or digit text) resolves
    /// to the live or stored entity; a map materializes a new entity. Items
    /// that cannot be resolved are returned unchanged for validation to
    /// report.
    pub fn resolve_ref(&self, target: &str, item: Value) -> RuntimeResult<Value> {
        if let Value::Map(config) = &item {
            let instance = self.instantiate(target, config.clone())?;
            return Ok(Value::Ref(instance.entity_ref()));
        }
        let Some(uid) = stored_uid(&item) else {
            return Ok(item);
        };
        match self.fetch(target, uid) {
            Ok(instance) => Ok(Value::Ref(instance.entity_ref())),
            Err(RuntimeError::NotFound { .. } | RuntimeError::UnknownModel(_)) => Ok(item),
            Err(err) => Err(err),
        }
    }

    /// Highest uid the store has seen for `model`, when any.
    pub(crate) fn stored_max_uid(&self, model: &str) -> Option<i64> {
        match self.inner.store.max_uid(model) {
            Ok(0) => None,
            Ok(uid) => i64::try_from(uid).ok(),
            Err(err) => {
                warn!(
                    "event=store_max_uid module=registry status=error model={model} error={err}"
                );
                None
            }
        }
    }
}

/// Positive uid carried by an int or by digit text.
pub(crate) fn stored_uid(item: &Value) -> Option<u64> {
    let uid = match item {
        Value::Int(uid) => u64::try_from(*uid).ok(),
        Value::Str(text) if UID_TEXT_RE.is_match(text) => text.parse::<u64>().ok(),
        _ => None,
    };
    uid.filter(|uid| *uid > 0)
}
