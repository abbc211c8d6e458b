//! Field datatypes and scalar coercion.

use crate::value::{Value, DATETIME_FORMAT, DATE_FORMAT};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt::{Display, Formatter};

static INT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?[0-9]+$").expect("valid int regex"));
static FLOAT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?([0-9]+\.[0-9]*|\.[0-9]+|[0-9]+)([eE][-+]?[0-9]+)?$")
        .expect("valid float regex")
});

/// Declared type of a Field: a builtin scalar or the name of a Model.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    Bool,
    Int,
    Float,
    Str,
    Date,
    DateTime,
    Model(String),
}

impl DataType {
    /// Builtin names map to scalars; anything else names a Model.
    pub fn parse(name: &str) -> Self {
        match name {
            "bool" => Self::Bool,
            "int" => Self::Int,
            "float" => Self::Float,
            "str" => Self::Str,
            "date" => Self::Date,
            "datetime" => Self::DateTime,
            other => Self::Model(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Date => "date",
            Self::DateTime => "datetime",
            Self::Model(name) => name.as_str(),
        }
    }

    pub fn model(&self) -> Option<&str> {
        match self {
            Self::Model(name) => Some(name.as_str()),
            _ => None,
        }
    }

    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Model(_))
    }

    /// Scalar type check. Relations are checked against the registry.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Bool, Value::Bool(_)) => true,
            (Self::Int, Value::Int(_)) => true,
            (Self::Float, Value::Float(_) | Value::Int(_)) => true,
            (Self::Str, Value::Str(_)) => true,
            (Self::Date, Value::Date(_)) => true,
            (Self::DateTime, Value::DateTime(_)) => true,
            (Self::Model(target), Value::Ref(reference)) => &reference.model == target,
            _ => false,
        }
    }

    /// Best-effort scalar parse. Text that does not read as the type is
    /// returned unchanged so validation can report it.
    pub fn coerce(&self, value: Value) -> Value {
        match (self, value) {
            (Self::Int, Value::Str(text)) if INT_RE.is_match(text.trim()) => {
                text.trim().parse::<i64>().map_or(Value::Str(text), Value::Int)
            }
            (Self::Float, Value::Int(number)) => Value::Float(number as f64),
            (Self::Float, Value::Str(text)) if FLOAT_RE.is_match(text.trim()) => {
                text.trim().parse::<f64>().map_or(Value::Str(text), Value::Float)
            }
            (Self::Bool, Value::Str(text)) => match text.as_str() {
                "true" | "True" | "1" => Value::Bool(true),
                "false" | "False" | "0" => Value::Bool(false),
                _ => Value::Str(text),
            },
            (Self::Date, Value::Str(text)) => {
                NaiveDate::parse_from_str(&text, DATE_FORMAT).map_or(Value::Str(text), Value::Date)
            }
            (Self::Date, Value::DateTime(moment)) => Value::Date(moment.date()),
            (Self::DateTime, Value::Str(text)) => parse_datetime(&text)
                .map_or(Value::Str(text), Value::DateTime),
            (_, value) => value,
        }
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, DATETIME_FORMAT)
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

impl From<&str> for DataType {
    fn from(value: &str) -> Self {
        Self::parse(value)
    }
}

impl Display for DataType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::DataType;
    use crate::value::Value;
    use chrono::NaiveDate;

    #[test]
    fn builtin_names_parse_to_scalars() {
        assert_eq!(DataType::parse("int"), DataType::Int);
        assert_eq!(DataType::parse("Book"), DataType::Model("Book".into()));
        assert!(DataType::parse("Book").is_relation());
    }

    #[test]
    fn coercion_parses_text_and_passes_garbage_through() {
        assert_eq!(DataType::Int.coerce(Value::from("42")), Value::Int(42));
        assert_eq!(DataType::Int.coerce(Value::from("4x")), Value::from("4x"));
        assert_eq!(DataType::Float.coerce(Value::Int(2)), Value::Float(2.0));
        assert_eq!(DataType::Bool.coerce(Value::from("False")), Value::Bool(false));
        assert_eq!(
            DataType::Date.coerce(Value::from("2024-02-29")),
            Value::Date(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap())
        );
        assert!(matches!(
            DataType::DateTime.coerce(Value::from("2024-02-29T10:11:12.5")),
            Value::DateTime(_)
        ));
    }
}
