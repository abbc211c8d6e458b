//! Dynamic attribute values.
//!
//! # Responsibility
//! - Carry the in-process (server tier) representation of attribute values.
//! - Convert between values and plain JSON for the database and client tiers.
//!
//! # Invariants
//! - Entities reference each other through [`EntityRef`] (model name + uid),
//!   never through live pointers.
//! - Ordering is only defined between comparable kinds; numbers compare across
//!   `Int` and `Float`.

use chrono::{NaiveDate, NaiveDateTime};
use serde_json::{Map as JsonMap, Number, Value as Json};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::iter::Sum;

/// Text layout used for `datetime` values on the database and client tiers.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";
/// Text layout used for `date` values on the database and client tiers.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Name + uid handle to an entity of a declared model.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityRef {
    pub model: String,
    pub uid: u64,
}

impl EntityRef {
    pub fn new(model: impl Into<String>, uid: u64) -> Self {
        Self {
            model: model.into(),
            uid,
        }
    }
}

impl Display for EntityRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.model, self.uid)
    }
}

/// Attribute value as held by live entities.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
    Ref(EntityRef),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_entity_ref(&self) -> Option<&EntityRef> {
        match self {
            Self::Ref(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items.as_slice()),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Short kind label used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "str",
            Self::Date(_) => "date",
            Self::DateTime(_) => "datetime",
            Self::Ref(_) => "ref",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Falsy values are null, `false`, zero, and empty text or containers.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Null => false,
            Self::Bool(value) => *value,
            Self::Int(value) => *value != 0,
            Self::Float(value) => *value != 0.0,
            Self::Str(value) => !value.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::Map(entries) => !entries.is_empty(),
            Self::Date(_) | Self::DateTime(_) | Self::Ref(_) => true,
        }
    }

    /// Length of text (in chars) or of a list; `None` for other kinds.
    pub fn len(&self) -> Option<usize> {
        match self {
            Self::Str(value) => Some(value.chars().count()),
            Self::List(items) => Some(items.len()),
            Self::Map(entries) => Some(entries.len()),
            _ => None,
        }
    }

    /// Plain JSON conversion without any datatype hints.
    ///
    /// Numbers become `Int` when they fit in `i64`, otherwise `Float`.
    pub fn from_json(json: &Json) -> Self {
        match json {
            Json::Null => Self::Null,
            Json::Bool(value) => Self::Bool(*value),
            Json::Number(number) => match number.as_i64() {
                Some(value) => Self::Int(value),
                None => number.as_f64().map_or(Self::Null, Self::Float),
            },
            Json::String(value) => Self::Str(value.clone()),
            Json::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            Json::Object(entries) => Self::Map(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), Self::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// Plain JSON conversion; references collapse to their uid.
    pub fn to_json(&self) -> Json {
        match self {
            Self::Null => Json::Null,
            Self::Bool(value) => Json::Bool(*value),
            Self::Int(value) => Json::from(*value),
            Self::Float(value) => Number::from_f64(*value).map_or(Json::Null, Json::Number),
            Self::Str(value) => Json::String(value.clone()),
            Self::Date(value) => Json::String(value.format(DATE_FORMAT).to_string()),
            Self::DateTime(value) => Json::String(value.format(DATETIME_FORMAT).to_string()),
            Self::Ref(reference) => Json::from(reference.uid),
            Self::List(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Map(entries) => Json::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect::<JsonMap<String, Json>>(),
            ),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "'{value}'"),
            Self::Date(value) => write!(f, "{}", value.format(DATE_FORMAT)),
            Self::DateTime(value) => write!(f, "{}", value.format(DATETIME_FORMAT)),
            Self::Ref(reference) => write!(f, "{reference}"),
            Self::List(items) => {
                write!(f, "[")?;
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (index, (key, value)) in entries.iter().enumerate() {
                    if index > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Bool(left), Self::Bool(right)) => left.partial_cmp(right),
            (Self::Int(left), Self::Int(right)) => left.partial_cmp(right),
            (Self::Int(left), Self::Float(right)) => (*left as f64).partial_cmp(right),
            (Self::Float(left), Self::Int(right)) => left.partial_cmp(&(*right as f64)),
            (Self::Float(left), Self::Float(right)) => left.partial_cmp(right),
            (Self::Str(left), Self::Str(right)) => left.partial_cmp(right),
            (Self::Date(left), Self::Date(right)) => left.partial_cmp(right),
            (Self::DateTime(left), Self::DateTime(right)) => left.partial_cmp(right),
            (Self::Ref(left), Self::Ref(right)) => left.partial_cmp(right),
            (Self::List(left), Self::List(right)) => left.partial_cmp(right),
            _ => None,
        }
    }
}

/// Numeric sum; non-numeric items are skipped and the empty sum is `Int(0)`.
impl Sum for Value {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::Int(0), |total, item| match (total, item) {
            (Self::Int(left), Self::Int(right)) => Self::Int(left.saturating_add(right)),
            (Self::Int(left), Self::Float(right)) => Self::Float(left as f64 + right),
            (Self::Float(left), Self::Int(right)) => Self::Float(left + right as f64),
            (Self::Float(left), Self::Float(right)) => Self::Float(left + right),
            (total, _) => total,
        })
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u64> for Value {
    fn from(value: u64) -> Self {
        Self::Int(i64::try_from(value).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<NaiveDate> for Value {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<NaiveDateTime> for Value {
    fn from(value: NaiveDateTime) -> Self {
        Self::DateTime(value)
    }
}

impl From<EntityRef> for Value {
    fn from(value: EntityRef) -> Self {
        Self::Ref(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Self::List(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::{EntityRef, Value};
    use serde_json::json;
    use std::cmp::Ordering;

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert_eq!(
            Value::Int(2).partial_cmp(&Value::Float(1.5)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::Str("a".into()).partial_cmp(&Value::Int(1)), None);
    }

    #[test]
    fn sum_promotes_to_float_and_skips_text() {
        let total: Value = vec![Value::Int(1), Value::Str("x".into()), Value::Float(0.5)]
            .into_iter()
            .sum();
        assert_eq!(total, Value::Float(1.5));

        let empty: Value = Vec::<Value>::new().into_iter().sum();
        assert_eq!(empty, Value::Int(0));
    }

    #[test]
    fn json_conversion_collapses_refs_to_uid() {
        let value = Value::List(vec![
            Value::Ref(EntityRef::new("Book", 3)),
            Value::Str("x".into()),
        ]);
        assert_eq!(value.to_json(), json!([3, "x"]));
        assert_eq!(
            Value::from_json(&json!({"a": 1, "b": [true, 2.5]})),
            Value::Map(
                [
                    ("a".to_string(), Value::Int(1)),
                    (
                        "b".to_string(),
                        Value::List(vec![Value::Bool(true), Value::Float(2.5)])
                    ),
                ]
                .into_iter()
                .collect()
            )
        );
    }

    #[test]
    fn truthiness_follows_emptiness() {
        assert!(!Value::Null.is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
        assert!(!Value::List(Vec::new()).is_truthy());
        assert!(Value::Int(-1).is_truthy());
    }
}
