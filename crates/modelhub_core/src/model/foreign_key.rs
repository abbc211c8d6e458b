//! Reverse relation descriptor.
//!
//! # Responsibility
//! - Answer "which `target` entities point at this owner through
//!   `owner_field`" without storing anything on the owner.
//! - Re-emit target lifecycle events under the owner's topic space.
//!
//! # Invariants
//! - Never stored and never part of the database tier.
//! - Re-emitted topics have four segments and cannot trigger another
//!   re-emission.

use super::entity::Instance;
use crate::error::RuntimeResult;
use crate::event::{entity_topic, Subscription};
use crate::query::Query;
use crate::registry::Registry;
use crate::value::{EntityRef, Value};
use log::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    name: String,
    target: String,
    owner_field: String,
    multiple: bool,
    private: bool,
    on_lazy: bool,
}

impl ForeignKey {
    /// `target` entities whose `owner_field` references the owner.
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        owner_field: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            owner_field: owner_field.into(),
            multiple: false,
            private: false,
            on_lazy: false,
        }
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Included in `LAZY` reads and snapshots.
    pub fn on_lazy(mut self) -> Self {
        self.on_lazy = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn owner_field(&self) -> &str {
        &self.owner_field
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn is_on_lazy(&self) -> bool {
        self.on_lazy
    }

    /// Live view of the target instances that reference `owner`.
    pub fn query(&self, registry: &Registry, owner: &Instance) -> RuntimeResult<Query<Instance>> {
        let target = registry.model(&self.target)?;
        let owner_ref = Value::Ref(owner.entity_ref());
        let owner_field = self.owner_field.clone();
        Ok(target.instances().keep(move |candidate| {
            match candidate.get(&owner_field) {
                Value::List(items) => items.contains(&owner_ref),
                single => single == owner_ref,
            }
        }))
    }

    /// List of references when multiple, else the first match or null.
    pub fn get(&self, registry: &Registry, owner: &Instance) -> RuntimeResult<Value> {
        let matches = self.query(registry, owner)?;
        if self.multiple {
            return Ok(Value::List(
                matches
                    .iter()
                    .map(|instance| Value::Ref(instance.entity_ref()))
                    .collect(),
            ));
        }
        Ok(matches
            .first()
            .map_or(Value::Null, |instance| Value::Ref(instance.entity_ref())))
    }

    /// Subscribes to `<target>/#/create` and `<target>/#/update` and re-emits
    /// them as `<owner>/<uid>/append/<name>` (create only) and
    /// `<owner>/<uid>/update/<name>` for owners of model `owner_model`.
    pub(crate) fn wire(
        &self,
        registry: &Registry,
        owner_model: &str,
    ) -> RuntimeResult<Vec<Subscription>> {
        let mut subscriptions = Vec::with_capacity(2);
        for action in ["create", "update"] {
            let weak = registry.downgrade();
            let name = self.name.clone();
            let owner_field = self.owner_field.clone();
            let owner_model = owner_model.to_string();
            let topic = format!("{}/#/{action}", self.target);

            let subscription = registry.events().on(&topic, move |delivery| {
                let Some(registry) = weak.upgrade() else {
                    return;
                };
                let Some(owned) = delivery.value.as_entity_ref() else {
                    return;
                };
                let Some(instance) = registry.get_instance(&owned.model, owned.uid) else {
                    return;
                };
                for owner in owners_of(&instance, &owner_field, &owner_model) {
                    if action == "create" {
                        let append = entity_topic(&owner.model, owner.uid, "append", Some(&name));
                        registry.events().emit(&append, delivery.value.clone());
                    }
                    let update = entity_topic(&owner.model, owner.uid, "update", Some(&name));
                    registry.events().emit(&update, Value::Ref(owner));
                }
            })?;
            subscriptions.push(subscription);
        }
        debug!(
            "event=foreign_key_wire module=model status=ok owner={} name={} target={}",
            owner_model, self.name, self.target
        );
        Ok(subscriptions)
    }
}

fn owners_of(instance: &Instance, owner_field: &str, owner_model: &str) -> Vec<EntityRef> {
    let candidates = match instance.get(owner_field) {
        Value::List(items) => items,
        single => vec![single],
    };
    candidates
        .into_iter()
        .filter_map(|candidate| match candidate {
            Value::Ref(owner) if owner.model == owner_model => Some(owner),
            _ => None,
        })
        .collect()
}
