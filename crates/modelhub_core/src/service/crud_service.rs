//! CRUD use-case service for one model.
//!
//! # Responsibility
//! - Route a signed uid to create (`0`), update or read (`> 0`) and delete
//!   (`< 0`).
//! - Gate every transition through the model's rights policy.
//! - Turn client payloads into registry calls and entities into client views.
//!
//! # Invariants
//! - Writes are validated as a whole and persisted only on success. Nested
//!   writes are journaled and committed with the outermost write; when it
//!   fails, nested creates and updates are undone and nothing is saved.
//! - A nested relation item refused by rights is skipped; the parent write
//!   goes on without it.
//! - Delete modes the model policy forbids fail; they are never downgraded.
//! - Null values never appear in client views.

use super::rights::{Action, Actor, Grant};
use super::view::{SubFormat, ViewFormat};
use crate::error::{RuntimeError, RuntimeResult};
use crate::model::{Attribute, DeleteKind, Field, Instance, ViewMode, UID_FIELD};
use crate::registry::{Model, Registry};
use crate::value::Value;
use log::{debug, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value as Json};
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};

static SIGNED_UID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]+$").expect("valid signed uid regex"));

/// Client payload: attribute name to client-tier value.
pub type Payload = Map<String, Json>;

/// Why a nested item was left out instead of failing the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkipReason {
    pub message: String,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// Inner result of rights-gated steps: `Err` means skip, not fail.
type Gated<T> = Result<T, SkipReason>;

fn surface<T>(gated: Gated<T>) -> RuntimeResult<T> {
    gated.map_err(|skip| RuntimeError::Rights(skip.message))
}

fn article(name: &str) -> &'static str {
    match name.chars().next().map(|c| c.to_ascii_lowercase()) {
        Some('a' | 'e' | 'i' | 'o' | 'u' | 'y') => "an",
        _ => "a",
    }
}

/// Accepts an integer or decimal text; `null` reads as `0`.
pub fn parse_uid(uid: &Json) -> RuntimeResult<i64> {
    match uid {
        Json::Null => Ok(0),
        Json::Number(number) => number
            .as_i64()
            .ok_or_else(|| RuntimeError::InvalidUid(number.to_string())),
        Json::String(text) if SIGNED_UID_RE.is_match(text) => text
            .parse::<i64>()
            .map_err(|_| RuntimeError::InvalidUid(text.clone())),
        other => Err(RuntimeError::InvalidUid(other.to_string())),
    }
}

/// Writes made during one request, committed or undone together.
#[derive(Default)]
struct Journal {
    created: Vec<Instance>,
    updated: Vec<(Instance, Vec<(String, Value)>)>,
    deletes: Vec<(Instance, DeleteKind)>,
}

impl Journal {
    fn commit(self, registry: &Registry) -> RuntimeResult<()> {
        for instance in self.created.iter().chain(self.updated.iter().map(|(instance, _)| instance)) {
            registry.save(instance)?;
        }
        for (instance, kind) in &self.deletes {
            delete_now(registry, instance, *kind)?;
        }
        Ok(())
    }

    fn rollback(self, registry: &Registry) {
        for (instance, previous) in self.updated.into_iter().rev() {
            for (name, value) in previous {
                instance.set(&name, value);
            }
        }
        for instance in self.created.iter().rev() {
            match registry.model(&instance.model()) {
                Ok(handler) => handler.del_instance(instance),
                Err(err) => warn!(
                    "event=crud_rollback module=service status=error model={} uid={} error={err}",
                    instance.model(),
                    instance.uid()
                ),
            }
        }
        if !self.created.is_empty() {
            debug!(
                "event=crud_rollback module=service status=ok created={}",
                self.created.len()
            );
        }
    }
}

fn delete_now(registry: &Registry, resource: &Instance, kind: DeleteKind) -> RuntimeResult<()> {
    registry.delete(resource, kind)?;
    info!(
        "event=crud_delete module=service status=ok model={} uid={} mode={}",
        resource.model(),
        resource.uid(),
        kind.as_str()
    );
    Ok(())
}

/// CRUD entry points for one model over a shared registry.
#[derive(Debug, Clone)]
pub struct CrudService {
    registry: Registry,
    model: String,
}

impl CrudService {
    pub fn new(registry: Registry, model: impl Into<String>) -> Self {
        Self {
            registry,
            model: model.into(),
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn handler(&self) -> RuntimeResult<Model> {
        self.registry.model(&self.model)
    }

    fn grant(&self, actor: &Actor, action: Action, resource: Option<&Instance>) -> RuntimeResult<Grant> {
        let handler = self.handler()?;
        Ok(handler
            .rights()
            .map_or(Grant::Deny, |rights| rights.can(actor, action, resource)))
    }

    fn for_model(&self, model: &str) -> Self {
        Self::new(self.registry.clone(), model)
    }

    /// Runs one outermost write; its journal is committed only on success.
    fn journaled<T>(
        &self,
        write: impl FnOnce(&mut Journal) -> RuntimeResult<Gated<T>>,
    ) -> RuntimeResult<T> {
        let mut journal = Journal::default();
        match write(&mut journal) {
            Ok(Ok(value)) => {
                journal.commit(&self.registry)?;
                Ok(value)
            }
            outcome => {
                journal.rollback(&self.registry);
                surface(outcome?)
            }
        }
    }

    // Server side: entities in, entities out.

    /// Dispatches on the signed uid; `None` after a delete.
    pub fn apply_server(&self, actor: &Actor, uid: i64, payload: &Payload) -> RuntimeResult<Option<Instance>> {
        self.journaled(|journal| self.try_apply_server(actor, uid, payload, journal))
    }

    fn try_apply_server(
        &self,
        actor: &Actor,
        uid: i64,
        payload: &Payload,
        journal: &mut Journal,
    ) -> RuntimeResult<Gated<Option<Instance>>> {
        let target = uid.unsigned_abs();
        let gated = match uid {
            0 => self.try_create(actor, payload, journal)?.map(Some),
            uid if uid > 0 && payload.is_empty() => self.try_read(actor, target)?.map(Some),
            uid if uid > 0 => self.try_update(actor, target, payload, journal)?.map(Some),
            _ => self.try_delete(actor, target, None)?.map(|planned| {
                journal.deletes.push(planned);
                None
            }),
        };
        Ok(gated)
    }

    pub fn create_server(&self, actor: &Actor, payload: &Payload) -> RuntimeResult<Instance> {
        self.journaled(|journal| self.try_create(actor, payload, journal))
    }

    fn try_create(&self, actor: &Actor, payload: &Payload, journal: &mut Journal) -> RuntimeResult<Gated<Instance>> {
        let grant = self.grant(actor, Action::Create, None)?;
        if grant.is_denied() {
            return Ok(Err(SkipReason {
                message: format!("You can't create {} {}", article(&self.model), self.model),
            }));
        }
        let instance = self.apply_resource(actor, None, payload, &grant, journal)?;
        info!(
            "event=crud_create module=service status=ok model={} uid={}",
            self.model,
            instance.uid()
        );
        Ok(Ok(instance))
    }

    pub fn read_server(&self, actor: &Actor, uid: u64) -> RuntimeResult<Instance> {
        surface(self.try_read(actor, uid)?)
    }

    fn try_read(&self, actor: &Actor, uid: u64) -> RuntimeResult<Gated<Instance>> {
        let resource = self.registry.fetch(&self.model, uid)?;
        let grant = self.grant(actor, Action::Read, Some(&resource))?;
        if grant.is_denied() {
            return Ok(Err(SkipReason {
                message: format!("You can't read {}:{uid}", self.model),
            }));
        }
        Ok(Ok(resource))
    }

    pub fn update_server(&self, actor: &Actor, uid: u64, payload: &Payload) -> RuntimeResult<Instance> {
        self.journaled(|journal| self.try_update(actor, uid, payload, journal))
    }

    fn try_update(
        &self,
        actor: &Actor,
        uid: u64,
        payload: &Payload,
        journal: &mut Journal,
    ) -> RuntimeResult<Gated<Instance>> {
        let resource = self.registry.fetch(&self.model, uid)?;
        let grant = self.grant(actor, Action::Update, Some(&resource))?;
        if grant.is_denied() {
            return Ok(Err(SkipReason {
                message: format!("You can't update {}:{uid}", self.model),
            }));
        }
        let instance = self.apply_resource(actor, Some(resource), payload, &grant, journal)?;
        info!(
            "event=crud_update module=service status=ok model={} uid={uid}",
            self.model
        );
        Ok(Ok(instance))
    }

    /// Deletes with the requested kind, or the model's default kind.
    pub fn delete_server(&self, actor: &Actor, uid: u64, kind: Option<DeleteKind>) -> RuntimeResult<()> {
        let (resource, kind) = surface(self.try_delete(actor, uid, kind)?)?;
        delete_now(&self.registry, &resource, kind)
    }

    /// Checks a delete; the caller decides when it runs.
    fn try_delete(
        &self,
        actor: &Actor,
        uid: u64,
        kind: Option<DeleteKind>,
    ) -> RuntimeResult<Gated<(Instance, DeleteKind)>> {
        let kind = self.handler()?.on_delete(kind)?;
        let resource = self.registry.fetch(&self.model, uid)?;
        let action = match kind {
            DeleteKind::Soft => Action::SoftDelete,
            DeleteKind::Hard => Action::HardDelete,
        };
        if self.grant(actor, action, Some(&resource))?.is_denied() {
            return Ok(Err(SkipReason {
                message: format!("You can't {} {}:{uid}", action.as_str(), self.model),
            }));
        }
        Ok(Ok((resource, kind)))
    }

    /// Brings a soft-deleted entity back.
    pub fn restore(&self, actor: &Actor, uid: u64) -> RuntimeResult<Instance> {
        if self.grant(actor, Action::Restore, None)?.is_denied() {
            return Err(RuntimeError::Rights(format!(
                "You can't restore {}:{uid}",
                self.model
            )));
        }
        let instance = self.registry.restore(&self.model, uid)?;
        info!(
            "event=crud_restore module=service status=ok model={} uid={uid}",
            self.model
        );
        Ok(instance)
    }

    // Apply pipeline.

    fn apply_resource(
        &self,
        actor: &Actor,
        resource: Option<Instance>,
        payload: &Payload,
        grant: &Grant,
        journal: &mut Journal,
    ) -> RuntimeResult<Instance> {
        let handler = self.handler()?;
        let mut config = BTreeMap::new();
        for (name, client_value) in payload {
            if !grant.permits(name, client_value) {
                debug!(
                    "event=crud_field_denied module=service status=skipped model={} field={name}",
                    self.model
                );
                continue;
            }
            match handler.get_attribute(name) {
                Some(Attribute::Field(field)) => {
                    if let Ok(value) = self.apply_attribute(actor, &field, client_value, journal)? {
                        config.insert(name.clone(), value);
                    }
                }
                // Computed attributes are read-only.
                Some(_) => {}
                // Left for validation to report.
                None => {
                    config.insert(name.clone(), Value::from_json(client_value));
                }
            }
        }

        match resource {
            None => {
                let instance = self.registry.create(&self.model, config)?;
                journal.created.push(instance.clone());
                Ok(instance)
            }
            Some(resource) if config.is_empty() => Ok(resource),
            Some(resource) => {
                let previous = handler
                    .field_list()
                    .iter()
                    .map(|field| (field.name().to_string(), field.get(&resource)))
                    .collect();
                let instance = self.registry.update(&resource, config)?;
                journal.updated.push((instance.clone(), previous));
                Ok(instance)
            }
        }
    }

    fn apply_attribute(
        &self,
        actor: &Actor,
        field: &Field,
        client_value: &Json,
        journal: &mut Journal,
    ) -> RuntimeResult<Gated<Value>> {
        let Some(target) = field.target_model() else {
            return Ok(Ok(Value::from_json(client_value)));
        };
        let Json::Array(items) = client_value else {
            return self.apply_value(actor, target, client_value, journal);
        };
        let mut values = Vec::with_capacity(items.len());
        for item in items {
            match self.apply_value(actor, target, item, journal)? {
                Ok(Value::Null) => {}
                Ok(value) => values.push(value),
                Err(skip) => debug!(
                    "event=crud_nested_skip module=service status=skipped model={target} reason={skip}"
                ),
            }
        }
        Ok(Ok(Value::List(values)))
    }

    /// Resolves one relation item under the caller's rights.
    fn apply_value(
        &self,
        actor: &Actor,
        target: &str,
        item: &Json,
        journal: &mut Journal,
    ) -> RuntimeResult<Gated<Value>> {
        let nested = self.for_model(target);
        let outcome = match item {
            Json::Object(object) => {
                let mut object = object.clone();
                let uid = match object.remove(UID_FIELD) {
                    Some(uid) => parse_uid(&uid)?,
                    None => 0,
                };
                nested.try_apply_server(actor, uid, &object, journal)?
            }
            Json::Number(_) | Json::String(_) => match parse_uid(item) {
                Ok(uid) if uid > 0 => nested.try_read(actor, uid.unsigned_abs())?.map(Some),
                _ => return Ok(Ok(Value::from_json(item))),
            },
            _ => return Ok(Ok(Value::from_json(item))),
        };
        Ok(outcome.map(|instance| {
            instance.map_or(Value::Null, |instance| Value::Ref(instance.entity_ref()))
        }))
    }

    // Client side: views out.

    pub fn apply_client(
        &self,
        actor: &Actor,
        uid: i64,
        payload: &Payload,
        format: &ViewFormat,
        mode: ViewMode,
    ) -> RuntimeResult<Json> {
        let target = uid.unsigned_abs();
        match uid {
            0 => self.create_client(actor, payload, format, mode),
            uid if uid > 0 && payload.is_empty() => self.read_client(actor, target, format, mode),
            uid if uid > 0 => self.update_client(actor, target, payload, format, mode),
            _ => self.delete_client(actor, target),
        }
    }

    pub fn create_client(&self, actor: &Actor, payload: &Payload, format: &ViewFormat, mode: ViewMode) -> RuntimeResult<Json> {
        let instance = self.create_server(actor, payload)?;
        self.read_client(actor, instance.uid(), format, mode)
    }

    pub fn read_client(&self, actor: &Actor, uid: u64, format: &ViewFormat, mode: ViewMode) -> RuntimeResult<Json> {
        surface(self.try_read_client(actor, uid, format, mode)?)
    }

    fn try_read_client(&self, actor: &Actor, uid: u64, format: &ViewFormat, mode: ViewMode) -> RuntimeResult<Gated<Json>> {
        let resource = match self.try_read(actor, uid)? {
            Ok(resource) => resource,
            Err(skip) => return Ok(Err(skip)),
        };
        let grant = self.grant(actor, Action::Read, Some(&resource))?;
        let view = self.read_resource(actor, &resource, format, &grant, mode)?;
        Ok(Ok(Json::Object(view)))
    }

    pub fn update_client(
        &self,
        actor: &Actor,
        uid: u64,
        payload: &Payload,
        format: &ViewFormat,
        mode: ViewMode,
    ) -> RuntimeResult<Json> {
        let instance = self.update_server(actor, uid, payload)?;
        self.read_client(actor, instance.uid(), format, mode)
    }

    /// Deletes with the model's default kind; the view is an empty object.
    pub fn delete_client(&self, actor: &Actor, uid: u64) -> RuntimeResult<Json> {
        self.delete_server(actor, uid, None)?;
        Ok(Json::Object(Map::new()))
    }

    // Read pipeline.

    fn read_resource(
        &self,
        actor: &Actor,
        resource: &Instance,
        format: &ViewFormat,
        grant: &Grant,
        mode: ViewMode,
    ) -> RuntimeResult<Payload> {
        let handler = self.handler()?;
        let visible = handler
            .attributes()
            .filter(|attribute| attribute.is_private())
            .keep(move |attribute| {
                mode == ViewMode::Eager || !attribute.is_distant() || attribute.is_on_lazy()
            });

        let mut view = Payload::new();
        for attribute in visible.iter() {
            let Ok(json) = self.read_attribute(actor, resource, &attribute, format)? else {
                continue;
            };
            if json.is_null() || !grant.permits(attribute.name(), &json) {
                continue;
            }
            view.insert(attribute.name().to_string(), json);
        }
        Ok(view)
    }

    fn read_attribute(
        &self,
        actor: &Actor,
        resource: &Instance,
        attribute: &Attribute,
        format: &ViewFormat,
    ) -> RuntimeResult<Gated<Json>> {
        let subformat = format.subformat(attribute);
        if subformat == SubFormat::Omit {
            return Ok(Ok(Json::Null));
        }
        let value = attribute.get(&self.registry, resource)?;
        if attribute.target_model().is_none() {
            let json = match subformat {
                SubFormat::Cast(cast) => cast.apply(&value),
                SubFormat::Include => match attribute {
                    Attribute::Field(field) => field.to_client(&value),
                    _ => value.to_json(),
                },
                _ => Json::Null,
            };
            return Ok(Ok(json));
        }
        match value {
            Value::List(items) => {
                let mut rendered = Vec::with_capacity(items.len());
                for item in &items {
                    match self.read_value(actor, item, &subformat)? {
                        Ok(Json::Null) => {}
                        Ok(json) => rendered.push(json),
                        Err(skip) => debug!(
                            "event=crud_nested_skip module=service status=skipped field={} reason={skip}",
                            attribute.name()
                        ),
                    }
                }
                Ok(Ok(Json::Array(rendered)))
            }
            value => self.read_value(actor, &value, &subformat),
        }
    }

    fn read_value(&self, actor: &Actor, value: &Value, subformat: &SubFormat) -> RuntimeResult<Gated<Json>> {
        let Value::Ref(reference) = value else {
            return Ok(Ok(value.to_json()));
        };
        match subformat {
            SubFormat::Uid | SubFormat::Include => Ok(Ok(Json::from(reference.uid))),
            SubFormat::Cast(cast) => Ok(Ok(cast.apply(value))),
            SubFormat::Nested(format) => self.for_model(&reference.model).try_read_client(
                actor,
                reference.uid,
                format,
                ViewMode::Lazy,
            ),
            SubFormat::Omit => Ok(Ok(Json::Null)),
        }
    }
}
