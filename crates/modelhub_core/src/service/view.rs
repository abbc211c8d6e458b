//! Client view formats.
//!
//! A format selects which attributes a read returns and how each one is
//! rendered. It is either one of the tags `"LAZY"` / `"EAGER"` or an object
//! mapping attribute names to sub-formats:
//!
//! - `true` includes the value, `false` / `null` omits it;
//! - `"str"`, `"int"`, `"float"`, `"bool"` cast a scalar;
//! - `".uid"` renders related entities by uid;
//! - a tag or an object renders related entities as nested views.

use crate::error::{RuntimeError, RuntimeResult};
use crate::model::Attribute;
use crate::value::Value;
use serde_json::Value as Json;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarCast {
    Str,
    Int,
    Float,
    Bool,
}

impl ScalarCast {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "str" => Some(Self::Str),
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "bool" => Some(Self::Bool),
            _ => None,
        }
    }

    /// Null when the value has no sensible cast.
    pub fn apply(self, value: &Value) -> Json {
        match self {
            Self::Str => match value {
                Value::Null => Json::Null,
                Value::Str(text) => Json::String(text.clone()),
                other => match other.to_json() {
                    Json::String(text) => Json::String(text),
                    json => Json::String(json.to_string()),
                },
            },
            Self::Int => match value {
                Value::Int(number) => Json::from(*number),
                // Truncation toward zero is the intended cast.
                Value::Float(number) if number.is_finite() => Json::from(number.trunc() as i64),
                Value::Bool(flag) => Json::from(i64::from(*flag)),
                Value::Str(text) => text
                    .trim()
                    .parse::<i64>()
                    .map_or(Json::Null, Json::from),
                Value::Ref(reference) => Json::from(reference.uid),
                _ => Json::Null,
            },
            Self::Float => match value {
                Value::Str(text) => text
                    .trim()
                    .parse::<f64>()
                    .map_or(Json::Null, Json::from),
                Value::Bool(flag) => Json::from(if *flag { 1.0 } else { 0.0 }),
                other => other.as_f64().map_or(Json::Null, Json::from),
            },
            Self::Bool => Json::Bool(value.is_truthy()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubFormat {
    Omit,
    Include,
    Uid,
    Cast(ScalarCast),
    Nested(ViewFormat),
}

impl SubFormat {
    pub fn parse(json: &Json) -> RuntimeResult<Self> {
        match json {
            Json::Null | Json::Bool(false) => Ok(Self::Omit),
            Json::Bool(true) => Ok(Self::Include),
            Json::String(text) if text == ".uid" => Ok(Self::Uid),
            Json::String(text) => match ScalarCast::parse(text) {
                Some(cast) => Ok(Self::Cast(cast)),
                None => ViewFormat::parse(json).map(Self::Nested),
            },
            Json::Object(_) => ViewFormat::parse(json).map(Self::Nested),
            other => Err(RuntimeError::InvalidFormat(format!(
                "unsupported sub-format {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum ViewFormat {
    #[default]
    Lazy,
    Eager,
    Custom(BTreeMap<String, SubFormat>),
}

impl ViewFormat {
    /// `null` reads as `LAZY`.
    pub fn parse(json: &Json) -> RuntimeResult<Self> {
        match json {
            Json::Null => Ok(Self::Lazy),
            Json::String(tag) => match tag.to_ascii_uppercase().as_str() {
                "LAZY" => Ok(Self::Lazy),
                "EAGER" => Ok(Self::Eager),
                _ => Err(RuntimeError::InvalidFormat(format!("unknown format `{tag}`"))),
            },
            Json::Object(entries) => {
                let mut formats = BTreeMap::new();
                for (name, sub) in entries {
                    formats.insert(name.clone(), SubFormat::parse(sub)?);
                }
                Ok(Self::Custom(formats))
            }
            other => Err(RuntimeError::InvalidFormat(format!(
                "unsupported format {other}"
            ))),
        }
    }

    /// How `attribute` renders under this format. Tags render relations by uid.
    pub fn subformat(&self, attribute: &Attribute) -> SubFormat {
        match self {
            Self::Lazy | Self::Eager => {
                if attribute.target_model().is_some() {
                    SubFormat::Uid
                } else {
                    SubFormat::Include
                }
            }
            Self::Custom(formats) => formats
                .get(attribute.name())
                .cloned()
                .unwrap_or(SubFormat::Omit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ScalarCast, SubFormat, ViewFormat};
    use crate::value::Value;
    use serde_json::json;

    #[test]
    fn parses_nested_object_formats() {
        let format = ViewFormat::parse(&json!({
            "title": true,
            "pages": "str",
            "author": {"name": true},
            "tags": ".uid",
            "notes": null
        }))
        .unwrap();
        let ViewFormat::Custom(formats) = format else {
            panic!("expected a custom format");
        };
        assert_eq!(formats["title"], SubFormat::Include);
        assert_eq!(formats["pages"], SubFormat::Cast(ScalarCast::Str));
        assert_eq!(formats["tags"], SubFormat::Uid);
        assert_eq!(formats["notes"], SubFormat::Omit);
        assert!(matches!(formats["author"], SubFormat::Nested(ViewFormat::Custom(_))));
    }

    #[test]
    fn rejects_unknown_tags() {
        assert!(ViewFormat::parse(&json!("FULL")).is_err());
        assert!(ViewFormat::parse(&json!(3)).is_err());
    }

    #[test]
    fn casts_scalars() {
        assert_eq!(ScalarCast::Str.apply(&Value::Int(42)), json!("42"));
        assert_eq!(ScalarCast::Int.apply(&Value::from("17")), json!(17));
        assert_eq!(ScalarCast::Int.apply(&Value::Float(2.9)), json!(2));
        assert_eq!(ScalarCast::Bool.apply(&Value::from("")), json!(false));
    }
}
