//! Stored attribute descriptor.
//!
//! # Responsibility
//! - Describe one stored attribute: datatype, cardinality, constraints.
//! - Parse raw input (increment, default, coercion, relation resolution).
//! - Convert values between the database, server, and client tiers.
//!
//! # Invariants
//! - Validators are selected once, when the field is built.
//! - Relations are stored as uids on the database and client tiers.
//! - `encrypt` only affects the client tier.

use super::check::{self, Check, CheckContext};
use super::datatype::DataType;
use super::entity::Instance;
use super::handler::ModelHandler;
use crate::error::{DeclarationError, RuntimeError, RuntimeResult, ValidationError, ValidationKind};
use crate::event::entity_topic;
use crate::registry::{stored_uid, Registry};
use crate::value::{EntityRef, Value};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value as Json;
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::fmt::{Debug, Formatter};
use std::rc::Rc;

/// Name of the identity field every model inherits.
pub const UID_FIELD: &str = "uid";

static RPY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([!+?*])([A-Za-z_][A-Za-z0-9_]*)\[([A-Za-z_][A-Za-z0-9_]*)\]((?:\s+-[ups])*)\s*$")
        .expect("valid rpy regex")
});

type DefaultFactory = Rc<dyn Fn(&Registry, &ModelHandler) -> Value>;

/// Value used when a field is absent from the input.
#[derive(Clone)]
pub enum FieldDefault {
    Literal(Value),
    Factory(DefaultFactory),
}

impl FieldDefault {
    fn produce(&self, registry: &Registry, model: &ModelHandler) -> Value {
        match self {
            Self::Literal(value) => value.clone(),
            Self::Factory(factory) => factory(registry, model),
        }
    }
}

impl Debug for FieldDefault {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(value) => f.debug_tuple("Literal").field(value).finish(),
            Self::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    pub start: i64,
    pub step: i64,
}

/// Digest used for client-side obfuscation of text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub fn parse(name: &str) -> Result<Self, DeclarationError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "sha224" => Ok(Self::Sha224),
            "sha256" => Ok(Self::Sha256),
            "sha384" => Ok(Self::Sha384),
            "sha512" => Ok(Self::Sha512),
            other => Err(DeclarationError::InvalidDescriptor(format!(
                "unsupported hash algorithm `{other}`"
            ))),
        }
    }

    /// Lowercase hex digest.
    pub fn hex_digest(self, bytes: &[u8]) -> String {
        match self {
            Self::Sha224 => hex::encode(Sha224::digest(bytes)),
            Self::Sha256 => hex::encode(Sha256::digest(bytes)),
            Self::Sha384 => hex::encode(Sha384::digest(bytes)),
            Self::Sha512 => hex::encode(Sha512::digest(bytes)),
        }
    }
}

#[derive(Clone)]
pub struct Field {
    name: String,
    datatype: DataType,
    optional: bool,
    multiple: bool,
    unique: bool,
    private: bool,
    is_static: bool,
    values: Option<Vec<Value>>,
    range: Option<(Value, Value)>,
    length: Option<(usize, usize)>,
    default: Option<FieldDefault>,
    increment: Option<Increment>,
    encrypt: Option<HashAlgorithm>,
    checks: Vec<Check>,
}

impl Debug for Field {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("datatype", &self.datatype)
            .field("optional", &self.optional)
            .field("multiple", &self.multiple)
            .field("unique", &self.unique)
            .field("private", &self.private)
            .field("static", &self.is_static)
            .field("default", &self.default)
            .field("increment", &self.increment)
            .field("encrypt", &self.encrypt)
            .finish_non_exhaustive()
    }
}

impl Field {
    pub fn new(name: impl Into<String>, datatype: impl Into<DataType>) -> Self {
        Self {
            name: name.into(),
            datatype: datatype.into(),
            optional: false,
            multiple: false,
            unique: false,
            private: false,
            is_static: false,
            values: None,
            range: None,
            length: None,
            default: None,
            increment: None,
            encrypt: None,
            checks: Vec::new(),
        }
        .rebuild_checks()
    }

    fn rebuild_checks(mut self) -> Self {
        self.checks = check::select(&self);
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self.rebuild_checks()
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self.rebuild_checks()
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self.rebuild_checks()
    }

    /// Hidden from client reads and from non-safe snapshots.
    pub fn private(mut self) -> Self {
        self.private = true;
        self
    }

    /// Settable on create only.
    pub fn immutable(mut self) -> Self {
        self.is_static = true;
        self.rebuild_checks()
    }

    pub fn values(mut self, allowed: Vec<Value>) -> Self {
        self.values = Some(allowed);
        self.rebuild_checks()
    }

    /// Inclusive bounds.
    pub fn range(mut self, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.range = Some((low.into(), high.into()));
        self.rebuild_checks()
    }

    /// Inclusive length bounds for text and lists.
    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.length = Some((min, max));
        self.rebuild_checks()
    }

    pub fn exact_length(self, length: usize) -> Self {
        self.length(length, length)
    }

    pub fn default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Literal(value.into()));
        self
    }

    pub fn default_with(
        mut self,
        factory: impl Fn(&Registry, &ModelHandler) -> Value + 'static,
    ) -> Self {
        self.default = Some(FieldDefault::Factory(Rc::new(factory)));
        self
    }

    pub fn increment(mut self, start: i64, step: i64) -> Self {
        self.increment = Some(Increment { start, step });
        self
    }

    pub fn encrypt(mut self, algorithm: HashAlgorithm) -> Self {
        self.encrypt = Some(algorithm);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn datatype(&self) -> &DataType {
        &self.datatype
    }

    pub fn target_model(&self) -> Option<&str> {
        self.datatype.model()
    }

    pub fn is_relation(&self) -> bool {
        self.datatype.is_relation()
    }

    pub fn is_optional(&self) -> bool {
        self.optional
    }

    pub fn is_multiple(&self) -> bool {
        self.multiple
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn is_private(&self) -> bool {
        self.private
    }

    pub fn is_static(&self) -> bool {
        self.is_static
    }

    pub fn values_allowed(&self) -> Option<&[Value]> {
        self.values.as_deref()
    }

    pub fn range_bounds(&self) -> Option<(&Value, &Value)> {
        self.range.as_ref().map(|(low, high)| (low, high))
    }

    pub fn length_bounds(&self) -> Option<(usize, usize)> {
        self.length
    }

    pub fn default_value(&self) -> Option<&FieldDefault> {
        self.default.as_ref()
    }

    pub fn increment_rule(&self) -> Option<Increment> {
        self.increment
    }

    pub fn encryption(&self) -> Option<HashAlgorithm> {
        self.encrypt
    }

    pub fn get(&self, instance: &Instance) -> Value {
        instance.get(&self.name)
    }

    /// Stores `value` without validation and emits `<Model>/<uid>/set/<name>`.
    pub fn set(&self, registry: &Registry, instance: &Instance, value: Value) {
        instance.set(&self.name, value.clone());
        let topic = entity_topic(&instance.model(), instance.uid(), "set", Some(&self.name));
        registry.events().emit(&topic, value);
    }

    pub fn append(&self, registry: &Registry, instance: &Instance, item: Value) -> RuntimeResult<()> {
        let mut items = self.list_items(instance)?;
        items.push(item);
        self.set(registry, instance, Value::List(items));
        Ok(())
    }

    pub fn remove(&self, registry: &Registry, instance: &Instance, item: &Value) -> RuntimeResult<()> {
        let mut items = self.list_items(instance)?;
        items.retain(|candidate| candidate != item);
        self.set(registry, instance, Value::List(items));
        Ok(())
    }

    fn list_items(&self, instance: &Instance) -> RuntimeResult<Vec<Value>> {
        if !self.multiple {
            return Err(RuntimeError::InvalidOperation(format!(
                "{}.{} is not a multiple field",
                instance.model(),
                self.name
            )));
        }
        Ok(match self.get(instance) {
            Value::List(items) => items,
            Value::Null => Vec::new(),
            single => vec![single],
        })
    }

    /// Parses raw input for this field.
    ///
    /// Absent input takes the increment, then the default. Present input is
    /// coerced; text that does not parse passes through unchanged.
    pub fn deserialize(
        &self,
        registry: &Registry,
        model: &ModelHandler,
        raw: Value,
    ) -> RuntimeResult<Value> {
        if !raw.is_null() {
            return self.from_server(registry, raw);
        }
        if let Some(increment) = self.increment {
            return match self.next_increment(registry, model, increment) {
                Some(next) => Ok(Value::Int(next)),
                None => Err(ValidationError {
                    kind: ValidationKind::Create,
                    model: model.name().to_string(),
                    errors: [(
                        self.name.clone(),
                        vec!["The increment overflows the int range".to_string()],
                    )]
                    .into_iter()
                    .collect(),
                }
                .into()),
            };
        }
        if let Some(default) = &self.default {
            return self.from_server(registry, default.produce(registry, model));
        }
        Ok(if self.multiple {
            Value::List(Vec::new())
        } else {
            Value::Null
        })
    }

    /// `None` when the next value no longer fits an `i64`.
    fn next_increment(&self, registry: &Registry, model: &ModelHandler, increment: Increment) -> Option<i64> {
        let live = model
            .instances()
            .getattr(&self.name)
            .keep(|value| value.as_i64().is_some())
            .max(Value::Null)
            .as_i64();
        let stored = if self.name == UID_FIELD {
            registry.stored_max_uid(model.name())
        } else {
            None
        };
        match live.max(stored) {
            Some(highest) => highest.checked_add(increment.step),
            None => Some(increment.start),
        }
    }

    /// Runs the field's validators; empty when the value is acceptable.
    pub fn check(
        &self,
        registry: &Registry,
        model: &ModelHandler,
        instance: Option<&Instance>,
        value: &Value,
        create: bool,
    ) -> Vec<String> {
        if value.is_null() && self.optional {
            return Vec::new();
        }
        let ctx = CheckContext {
            registry,
            model,
            instance,
            field: self,
            value,
            create,
        };
        self.checks.iter().filter_map(|check| check(&ctx)).collect()
    }

    pub fn to_database(&self, value: &Value) -> Json {
        value.to_json()
    }

    /// Relation uids become references without reading the store.
    pub fn from_database(&self, json: &Json) -> RuntimeResult<Value> {
        self.parse_items(Value::from_json(json), |item| {
            Ok(match (self.datatype.model(), stored_uid(&item)) {
                (Some(target), Some(uid)) => Value::Ref(EntityRef::new(target, uid)),
                (Some(_), None) => item,
                (None, _) => self.datatype.coerce(item),
            })
        })
    }

    pub fn to_server(&self, value: &Value) -> Value {
        value.clone()
    }

    /// Coerces scalars and resolves relation items to entity references.
    pub fn from_server(&self, registry: &Registry, raw: Value) -> RuntimeResult<Value> {
        self.parse_items(raw, |item| self.coerce_item(registry, item))
    }

    fn parse_items(
        &self,
        raw: Value,
        mut parse: impl FnMut(Value) -> RuntimeResult<Value>,
    ) -> RuntimeResult<Value> {
        if !self.multiple {
            return parse(raw);
        }
        let items = match raw {
            Value::List(items) => items,
            Value::Null => Vec::new(),
            single => vec![single],
        };
        let mut parsed = Vec::with_capacity(items.len());
        for item in items {
            let value = parse(item)?;
            if !value.is_null() {
                parsed.push(value);
            }
        }
        Ok(Value::List(parsed))
    }

    fn coerce_item(&self, registry: &Registry, item: Value) -> RuntimeResult<Value> {
        match self.datatype.model() {
            Some(target) => registry.resolve_ref(target, item),
            None => Ok(self.datatype.coerce(item)),
        }
    }

    pub fn to_client(&self, value: &Value) -> Json {
        match (self.encrypt, value) {
            (Some(algorithm), Value::Str(text)) => {
                Json::String(algorithm.hex_digest(text.as_bytes()))
            }
            (Some(_), Value::List(items)) => {
                Json::Array(items.iter().map(|item| self.to_client(item)).collect())
            }
            _ => value.to_json(),
        }
    }

    pub fn from_client(&self, registry: &Registry, json: &Json) -> RuntimeResult<Value> {
        self.from_server(registry, Value::from_json(json))
    }

    /// Parses one-line notation: `<prefix><name>[<type>] [-u] [-p] [-s]`.
    ///
    /// Prefix `!` is required single, `+` required multiple, `?` optional
    /// single, `*` optional multiple. Flags: `-u` unique, `-p` static,
    /// `-s` private.
    pub fn from_rpy(line: &str) -> Result<Self, DeclarationError> {
        let captures = RPY_RE.captures(line.trim()).ok_or_else(|| {
            DeclarationError::InvalidDescriptor(format!("invalid rpy field `{line}`"))
        })?;
        let prefix = &captures[1];
        let mut field = Self::new(&captures[2], DataType::parse(&captures[3]));
        if matches!(prefix, "?" | "*") {
            field = field.optional();
        }
        if matches!(prefix, "+" | "*") {
            field = field.multiple();
        }
        for flag in captures[4].split_whitespace() {
            field = match flag {
                "-u" => field.unique(),
                "-p" => field.immutable(),
                "-s" => field.private(),
                _ => field,
            };
        }
        Ok(field)
    }

    pub fn to_rpy(&self) -> String {
        let prefix = match (self.optional, self.multiple) {
            (false, false) => "!",
            (false, true) => "+",
            (true, false) => "?",
            (true, true) => "*",
        };
        let mut line = format!("{prefix}{}[{}]", self.name, self.datatype);
        if self.unique {
            line.push_str(" -u");
        }
        if self.is_static {
            line.push_str(" -p");
        }
        if self.private {
            line.push_str(" -s");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::{Field, HashAlgorithm};
    use crate::model::DataType;
    use crate::value::Value;
    use serde_json::json;

    #[test]
    fn rpy_notation_round_trips_flags() {
        let field = Field::from_rpy("*tags[str] -u -s").unwrap();
        assert!(field.is_optional());
        assert!(field.is_multiple());
        assert!(field.is_unique());
        assert!(field.is_private());
        assert!(!field.is_static());
        assert_eq!(field.to_rpy(), "*tags[str] -u -s");

        let author = Field::from_rpy("!author[Author] -p").unwrap();
        assert_eq!(author.datatype(), &DataType::Model("Author".into()));
        assert!(author.is_static());
    }

    #[test]
    fn rpy_rejects_malformed_lines() {
        assert!(Field::from_rpy("name[str]").is_err());
        assert!(Field::from_rpy("!name[str] -x").is_err());
    }

    #[test]
    fn encrypt_only_changes_client_tier() {
        let field = Field::new("secret", "str").encrypt(HashAlgorithm::Sha256);
        let value = Value::from("abc");
        assert_eq!(field.to_database(&value), json!("abc"));
        assert_eq!(
            field.to_client(&value),
            json!("ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")
        );
    }

    #[test]
    fn hash_algorithm_names_are_case_insensitive() {
        assert_eq!(HashAlgorithm::parse("SHA512").unwrap(), HashAlgorithm::Sha512);
        assert!(HashAlgorithm::parse("md5").is_err());
    }
}
