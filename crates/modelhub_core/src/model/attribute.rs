//! Closed set of attribute descriptors a model can carry.

use super::entity::Instance;
use super::field::Field;
use super::foreign_key::ForeignKey;
use super::method::Method;
use crate::error::RuntimeResult;
use crate::query::Record;
use crate::registry::Registry;
use crate::value::Value;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeKind {
    Field,
    ForeignKey,
    Method,
}

impl AttributeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Field => "field",
            Self::ForeignKey => "foreign_key",
            Self::Method => "method",
        }
    }
}

/// Field (stored), ForeignKey (derived reverse relation) or Method
/// (computed). Foreign keys and methods are "distant": never stored.
#[derive(Debug, Clone)]
pub enum Attribute {
    Field(Rc<Field>),
    ForeignKey(Rc<ForeignKey>),
    Method(Rc<Method>),
}

impl Attribute {
    pub fn name(&self) -> &str {
        match self {
            Self::Field(field) => field.name(),
            Self::ForeignKey(foreign_key) => foreign_key.name(),
            Self::Method(method) => method.name(),
        }
    }

    pub fn kind(&self) -> AttributeKind {
        match self {
            Self::Field(_) => AttributeKind::Field,
            Self::ForeignKey(_) => AttributeKind::ForeignKey,
            Self::Method(_) => AttributeKind::Method,
        }
    }

    pub fn is_private(&self) -> bool {
        match self {
            Self::Field(field) => field.is_private(),
            Self::ForeignKey(foreign_key) => foreign_key.is_private(),
            Self::Method(method) => method.is_private(),
        }
    }

    /// Not stored on the entity.
    pub fn is_distant(&self) -> bool {
        !matches!(self, Self::Field(_))
    }

    pub fn is_on_lazy(&self) -> bool {
        match self {
            Self::Field(_) => true,
            Self::ForeignKey(foreign_key) => foreign_key.is_on_lazy(),
            Self::Method(method) => method.is_on_lazy(),
        }
    }

    /// Target model of a relation field or foreign key.
    pub fn target_model(&self) -> Option<&str> {
        match self {
            Self::Field(field) => field.target_model(),
            Self::ForeignKey(foreign_key) => Some(foreign_key.target()),
            Self::Method(_) => None,
        }
    }

    pub fn as_field(&self) -> Option<&Rc<Field>> {
        match self {
            Self::Field(field) => Some(field),
            _ => None,
        }
    }

    pub fn as_foreign_key(&self) -> Option<&Rc<ForeignKey>> {
        match self {
            Self::ForeignKey(foreign_key) => Some(foreign_key),
            _ => None,
        }
    }

    pub fn as_method(&self) -> Option<&Rc<Method>> {
        match self {
            Self::Method(method) => Some(method),
            _ => None,
        }
    }

    /// Current value for `instance`; methods are invoked.
    pub fn get(&self, registry: &Registry, instance: &Instance) -> RuntimeResult<Value> {
        match self {
            Self::Field(field) => Ok(field.get(instance)),
            Self::ForeignKey(foreign_key) => foreign_key.get(registry, instance),
            Self::Method(method) => method.get(registry, instance).call(),
        }
    }
}

impl Record for Attribute {
    fn attr(&self, name: &str) -> Option<Value> {
        match name {
            "name" => Some(Value::from(self.name())),
            "kind" => Some(Value::from(self.kind().as_str())),
            "private" => Some(Value::Bool(self.is_private())),
            "distant" => Some(Value::Bool(self.is_distant())),
            "on_lazy" => Some(Value::Bool(self.is_on_lazy())),
            _ => None,
        }
    }
}

impl From<Field> for Attribute {
    fn from(value: Field) -> Self {
        Self::Field(Rc::new(value))
    }
}

impl From<ForeignKey> for Attribute {
    fn from(value: ForeignKey) -> Self {
        Self::ForeignKey(Rc::new(value))
    }
}

impl From<Method> for Attribute {
    fn from(value: Method) -> Self {
        Self::Method(Rc::new(value))
    }
}
