//! Entity lifecycle: construction, updates, persistence, deletion.
//!
//! # Invariants
//! - A payload is validated as a whole; nothing is applied when any field
//!   fails, and every failing field is reported.
//! - A live instance exists at most once per `(model, uid)`.
//! - Store failures abort in strict mode and are ignored (optionally logged)
//!   in permissive mode. A read miss is always `NotFound`.

use super::{Model, Registry};
use crate::error::{RuntimeError, RuntimeResult, ValidationError, ValidationKind};
use crate::model::{Attribute, DeleteKind, Entity, Instance, ViewMode, UID_FIELD};
use crate::repo::{Record, StoreError, StoreResult};
use crate::value::Value;
use log::{debug, error, info, warn};
use std::collections::BTreeMap;

impl Registry {
    /// Builds an entity from `config`, or updates the live one when `config`
    /// carries the uid of a live instance.
    pub fn instantiate(&self, model: &str, mut config: BTreeMap<String, Value>) -> RuntimeResult<Instance> {
        let handler = self.model(model)?;
        let live = config
            .get(UID_FIELD)
            .and_then(Value::as_i64)
            .and_then(|uid| u64::try_from(uid).ok())
            .and_then(|uid| handler.get_instance(uid));
        match live {
            Some(instance) => {
                config.remove(UID_FIELD);
                self.apply(&handler, Some(&instance), config)
            }
            None => self.apply(&handler, None, config),
        }
    }

    /// Builds a new entity; a uid already live for the model fails validation.
    pub fn create(&self, model: &str, config: BTreeMap<String, Value>) -> RuntimeResult<Instance> {
        let handler = self.model(model)?;
        self.apply(&handler, None, config)
    }

    /// Applies the fields present in `config` to `instance`.
    pub fn update(&self, instance: &Instance, config: BTreeMap<String, Value>) -> RuntimeResult<Instance> {
        let handler = self.model(&instance.model())?;
        self.apply(&handler, Some(instance), config)
    }

    fn apply(
        &self,
        handler: &Model,
        instance: Option<&Instance>,
        mut config: BTreeMap<String, Value>,
    ) -> RuntimeResult<Instance> {
        let create = instance.is_none();
        let mut errors: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut parsed = Vec::new();

        for field in handler.field_list() {
            let raw = match config.remove(field.name()) {
                Some(raw) => raw,
                None if create => Value::Null,
                None => continue,
            };
            let value = field.deserialize(self, handler, raw)?;
            let messages = field.check(self, handler, instance, &value, create);
            if !messages.is_empty() {
                errors.insert(field.name().to_string(), messages);
            }
            parsed.push((field, value));
        }

        // Foreign keys and methods are computed; their keys are ignored.
        for key in config.keys() {
            let distant = handler
                .get_attribute(key)
                .is_some_and(|attribute| attribute.is_distant());
            if !distant {
                errors.insert(
                    key.clone(),
                    vec![format!("Unknown attribute for model {}", handler.name())],
                );
            }
        }

        if !errors.is_empty() {
            let kind = if create {
                ValidationKind::Create
            } else {
                ValidationKind::Update
            };
            debug!(
                "event=entity_{} module=registry status=invalid model={} fields={}",
                kind.as_str(),
                handler.name(),
                errors.len()
            );
            return Err(ValidationError {
                kind,
                model: handler.name().to_string(),
                errors,
            }
            .into());
        }

        if let Some(instance) = instance {
            for (field, value) in parsed {
                field.set(self, instance, value);
            }
            handler.emit(
                self.events(),
                instance.uid(),
                "update",
                None,
                Value::Ref(instance.entity_ref()),
            );
            return Ok(instance.clone());
        }

        let values = parsed
            .iter()
            .map(|(field, value)| (field.name().to_string(), value.clone()))
            .collect();
        let instance = Instance::new(Entity::new(handler.name(), values));
        handler.add_instance(instance.clone())?;
        let uid = instance.uid();
        for (field, value) in parsed {
            handler.emit(self.events(), uid, "set", Some(field.name()), value);
        }
        handler.emit(
            self.events(),
            uid,
            "create",
            None,
            Value::Ref(instance.entity_ref()),
        );
        debug!(
            "event=entity_create module=registry status=ok model={} uid={uid}",
            handler.name()
        );
        Ok(instance)
    }

    /// Reads any attribute; foreign keys are resolved and methods invoked.
    pub fn get(&self, instance: &Instance, name: &str) -> RuntimeResult<Value> {
        let handler = self.model(&instance.model())?;
        let attribute = handler
            .get_attribute(name)
            .ok_or_else(|| RuntimeError::UnknownAttribute {
                model: handler.name().to_string(),
                name: name.to_string(),
            })?;
        attribute.get(self, instance)
    }

    /// Stores a field value without validation.
    pub fn set(&self, instance: &Instance, name: &str, value: Value) -> RuntimeResult<()> {
        let handler = self.model(&instance.model())?;
        match handler.get_attribute(name) {
            Some(Attribute::Field(field)) => {
                field.set(self, instance, value);
                Ok(())
            }
            Some(_) => Err(RuntimeError::InvalidOperation(format!(
                "{}.{name} is read-only",
                handler.name()
            ))),
            None => Err(RuntimeError::UnknownAttribute {
                model: handler.name().to_string(),
                name: name.to_string(),
            }),
        }
    }

    /// Looks up a live instance, loading it from the store on a miss.
    pub fn fetch(&self, model: &str, uid: u64) -> RuntimeResult<Instance> {
        match self.model(model)?.get_instance(uid) {
            Some(instance) => Ok(instance),
            None => self.load(model, uid, false),
        }
    }

    /// Stored representation: every non-null field, relations as uids.
    pub fn to_database(&self, instance: &Instance) -> RuntimeResult<Record> {
        let handler = self.model(&instance.model())?;
        let mut record = Record::new();
        for field in handler.field_list() {
            let value = field.get(instance);
            if !value.is_null() {
                record.insert(field.name().to_string(), field.to_database(&value));
            }
        }
        Ok(record)
    }

    /// Parses a stored record into field values. Unknown keys are skipped and
    /// relations stay references to whatever uid was stored.
    pub fn from_database(&self, model: &str, record: &Record) -> RuntimeResult<BTreeMap<String, Value>> {
        let handler = self.model(model)?;
        let mut values = BTreeMap::new();
        for field in handler.field_list() {
            if let Some(json) = record.get(field.name()) {
                values.insert(field.name().to_string(), field.from_database(json)?);
            }
        }
        Ok(values)
    }

    pub fn save(&self, instance: &Instance) -> RuntimeResult<()> {
        let record = self.to_database(instance)?;
        let model = instance.model();
        let uid = instance.uid();
        let result = self.store().save(&model, &record);
        self.persist(result, "save", &model, uid)
    }

    /// Saves every live instance of `model`, or of every model.
    pub fn save_all(&self, model: Option<&str>) -> RuntimeResult<usize> {
        let models = match model {
            Some(name) => vec![self.model(name)?],
            None => self.models().list(),
        };
        let mut saved = 0;
        for handler in models {
            for instance in handler.instances().iter() {
                self.save(&instance)?;
                saved += 1;
            }
        }
        Ok(saved)
    }

    /// Materializes the stored record; a live instance is returned as is
    /// unless `force_reload`, in which case it is refreshed from the store.
    pub fn load(&self, model: &str, uid: u64, force_reload: bool) -> RuntimeResult<Instance> {
        let handler = self.model(model)?;
        if !force_reload {
            if let Some(instance) = handler.get_instance(uid) {
                return Ok(instance);
            }
        }
        let record = match self.store().read(model, uid) {
            Ok(record) => record,
            Err(err) if err.is_missing() => {
                return Err(RuntimeError::NotFound {
                    model: model.to_string(),
                    uid,
                })
            }
            Err(err) => {
                self.persist(Err(err), "read", model, uid)?;
                return Err(RuntimeError::NotFound {
                    model: model.to_string(),
                    uid,
                });
            }
        };
        let mut values = self.from_database(model, &record)?;
        let instance = match handler.get_instance(uid) {
            Some(live) => {
                // The stored record is authoritative; static fields included.
                values.remove(UID_FIELD);
                for field in handler.field_list() {
                    if let Some(value) = values.remove(field.name()) {
                        field.set(self, &live, value);
                    }
                }
                handler.emit(self.events(), uid, "update", None, Value::Ref(live.entity_ref()));
                live
            }
            None => self.create(model, values)?,
        };
        // The instance is live before its relations load, so cycles end here.
        self.load_references(&handler, &instance)?;
        debug!("event=entity_load module=registry status=ok model={model} uid={uid}");
        Ok(instance)
    }

    /// Brings every entity `instance` refers to into the live set. Dangling
    /// references are kept as they are.
    fn load_references(&self, handler: &Model, instance: &Instance) -> RuntimeResult<()> {
        for field in handler.field_list() {
            if field.target_model().is_none() {
                continue;
            }
            let value = field.get(instance);
            let items: Vec<&Value> = match &value {
                Value::List(items) => items.iter().collect(),
                single => vec![single],
            };
            for reference in items.into_iter().filter_map(Value::as_entity_ref) {
                match self.fetch(&reference.model, reference.uid) {
                    Ok(_) | Err(RuntimeError::NotFound { .. } | RuntimeError::UnknownModel(_)) => {}
                    Err(err) => return Err(err),
                }
            }
        }
        Ok(())
    }

    /// Refreshes a live instance from its stored record.
    pub fn reload(&self, instance: &Instance) -> RuntimeResult<Instance> {
        self.load(&instance.model(), instance.uid(), true)
    }

    /// Loads every live stored record of `model`.
    pub fn load_all(&self, model: &str) -> RuntimeResult<Vec<Instance>> {
        let uids = match self.store().list_all(model, false) {
            Ok(uids) => uids,
            Err(err) => {
                self.persist(Err(err), "list", model, 0)?;
                Vec::new()
            }
        };
        uids.into_iter()
            .map(|uid| self.load(model, uid, false))
            .collect()
    }

    /// Loads every model, referenced models first.
    pub fn load_everything(&self) -> RuntimeResult<usize> {
        let ordered = self
            .models()
            .sorted_by_key(|handler| (self.level(handler.name()), handler.name().to_string()));
        let mut loaded = 0;
        for handler in ordered {
            loaded += self.load_all(handler.name())?.len();
        }
        info!("event=registry_load module=registry status=ok instances={loaded}");
        Ok(loaded)
    }

    /// Removes the instance from the store and from the live set, then emits
    /// `<Model>/<uid>/delete`.
    pub fn delete(&self, instance: &Instance, kind: DeleteKind) -> RuntimeResult<()> {
        let handler = self.model(&instance.model())?;
        let uid = instance.uid();
        let result = self
            .store()
            .delete(handler.name(), uid, kind == DeleteKind::Soft);
        self.persist(result, "delete", handler.name(), uid)?;
        handler.del_instance(instance);
        handler.emit(
            self.events(),
            uid,
            "delete",
            None,
            Value::Ref(instance.entity_ref()),
        );
        info!(
            "event=entity_delete module=registry status=ok model={} uid={uid} mode={}",
            handler.name(),
            kind.as_str()
        );
        Ok(())
    }

    /// Brings a soft-deleted record back and loads it.
    pub fn restore(&self, model: &str, uid: u64) -> RuntimeResult<Instance> {
        self.model(model)?;
        let result = self.store().restore(model, uid);
        self.persist(result, "restore", model, uid)?;
        info!("event=entity_restore module=registry status=ok model={model} uid={uid}");
        self.load(model, uid, false)
    }

    /// Attribute name to value map for `instance`.
    ///
    /// Lazy views skip distant attributes unless flagged `on_lazy`; private
    /// attributes appear only when `safe`. Null values are omitted and
    /// foreign-key references are expanded into nested lazy snapshots.
    pub fn snapshot(&self, instance: &Instance, mode: ViewMode, safe: bool) -> RuntimeResult<BTreeMap<String, Value>> {
        let handler = self.model(&instance.model())?;
        let mut view = BTreeMap::new();
        for attribute in handler.attributes().iter() {
            if attribute.is_private() && !safe {
                continue;
            }
            if attribute.is_distant() && mode == ViewMode::Lazy && !attribute.is_on_lazy() {
                continue;
            }
            let value = attribute.get(self, instance)?;
            let value = match attribute {
                Attribute::ForeignKey(_) => self.expand(value, safe)?,
                _ => value,
            };
            if !value.is_null() {
                view.insert(attribute.name().to_string(), value);
            }
        }
        Ok(view)
    }

    fn expand(&self, value: Value, safe: bool) -> RuntimeResult<Value> {
        match value {
            Value::Ref(reference) => match self.get_instance(&reference.model, reference.uid) {
                Some(related) => Ok(Value::Map(self.snapshot(&related, ViewMode::Lazy, safe)?)),
                None => Ok(Value::Ref(reference)),
            },
            Value::List(items) => Ok(Value::List(
                items
                    .into_iter()
                    .map(|item| self.expand(item, safe))
                    .collect::<RuntimeResult<_>>()?,
            )),
            other => Ok(other),
        }
    }

    fn persist(&self, result: StoreResult<()>, action: &str, model: &str, uid: u64) -> RuntimeResult<()> {
        let err: StoreError = match result {
            Ok(()) => return Ok(()),
            Err(err) => err,
        };
        if self.config().strict_persistence {
            error!(
                "event=store_{action} module=registry status=error model={model} uid={uid} error={err}"
            );
            return Err(err.into());
        }
        if self.config().warn_persistence {
            warn!(
                "event=store_{action} module=registry status=ignored model={model} uid={uid} error={err}"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::config::RuntimeConfig;
    use crate::error::RuntimeError;
    use crate::model::{DeleteKind, Field, ModelDef};
    use crate::registry::Registry;
    use crate::repo::MemoryStore;
    use crate::value::Value;
    use std::collections::BTreeMap;

    fn registry(config: RuntimeConfig) -> Registry {
        let registry = Registry::new(config, MemoryStore::new()).unwrap();
        registry
            .declare(
                ModelDef::new("Note")
                    .field(Field::new("title", "str"))
                    .field(Field::new("pinned", "bool").default(false)),
                false,
            )
            .unwrap();
        registry
    }

    fn config_of(pairs: &[(&str, Value)]) -> BTreeMap<String, Value> {
        pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn create_assigns_increasing_uids() {
        let registry = registry(RuntimeConfig::default());
        let first = registry
            .create("Note", config_of(&[("title", Value::from("a"))]))
            .unwrap();
        let second = registry
            .create("Note", config_of(&[("title", Value::from("b"))]))
            .unwrap();
        assert_eq!(first.uid(), 1);
        assert_eq!(second.uid(), 2);
        assert_eq!(second.get("pinned"), Value::Bool(false));
    }

    #[test]
    fn unknown_keys_fail_the_whole_payload() {
        let registry = registry(RuntimeConfig::default());
        let err = registry
            .create(
                "Note",
                config_of(&[("title", Value::Int(3)), ("color", Value::from("red"))]),
            )
            .unwrap_err();
        let RuntimeError::Validation(validation) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert_eq!(validation.errors.len(), 2);
        assert!(registry.model("Note").unwrap().instances().is_empty());
    }

    #[test]
    fn permissive_mode_ignores_store_failures() {
        let registry = registry(RuntimeConfig::default().permissive());
        let note = registry
            .create("Note", config_of(&[("title", Value::from("a"))]))
            .unwrap();
        // Never saved, so the store has nothing to delete.
        registry.delete(&note, DeleteKind::Hard).unwrap();
        assert!(registry.get_instance("Note", note.uid()).is_none());
    }

    #[test]
    fn strict_mode_reports_store_failures() {
        let registry = registry(RuntimeConfig::default());
        let note = registry
            .create("Note", config_of(&[("title", Value::from("a"))]))
            .unwrap();
        assert!(matches!(
            registry.delete(&note, DeleteKind::Hard),
            Err(RuntimeError::Persistence(_))
        ));
        assert!(registry.get_instance("Note", note.uid()).is_some());
    }

    #[test]
    fn load_reuses_live_instances_unless_forced() {
        let registry = registry(RuntimeConfig::default());
        let note = registry
            .create("Note", config_of(&[("title", Value::from("a"))]))
            .unwrap();
        registry.save(&note).unwrap();
        registry.set(&note, "title", Value::from("edited")).unwrap();

        let cached = registry.load("Note", note.uid(), false).unwrap();
        assert_eq!(cached.get("title"), Value::from("edited"));

        let reloaded = registry.load("Note", note.uid(), true).unwrap();
        assert_eq!(reloaded, note);
        assert_eq!(note.get("title"), Value::from("a"));
    }
}
