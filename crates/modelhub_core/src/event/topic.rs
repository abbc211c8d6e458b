//! Subscription topic patterns.
//!
//! A topic is a `/`-separated list of segments. Each subscription segment is
//! one of:
//! - a literal, matched exactly;
//! - `*`, any single segment, captured positionally as text;
//! - `#`, any single integer segment, captured positionally as `int`;
//! - `<name>` or `<name:type>`, captured by name and coerced to `type`
//!   (`int`, `str`, `float`, `bool`; default `str`);
//! - `<*:type>`, captured positionally and coerced to `type`.

use crate::value::Value;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

static CAPTURE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("valid capture name regex"));
static INT_TEXT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^-?[0-9]+$").expect("valid int text regex"));
static FLOAT_TEXT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][-+]?[0-9]+)?$")
        .expect("valid float text regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicError {
    EmptySegment(String),
    InvalidCapture(String),
    UnknownCaptureType(String),
}

impl Display for TopicError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptySegment(topic) => write!(f, "topic `{topic}` has an empty segment"),
            Self::InvalidCapture(segment) => write!(f, "invalid capture segment `{segment}`"),
            Self::UnknownCaptureType(kind) => write!(
                f,
                "unknown capture type `{kind}`; expected int|str|float|bool"
            ),
        }
    }
}

impl Error for TopicError {}

/// Coercion applied to a captured segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureType {
    Int,
    Str,
    Float,
    Bool,
}

impl CaptureType {
    pub fn parse(name: &str) -> Result<Self, TopicError> {
        match name {
            "int" => Ok(Self::Int),
            "str" => Ok(Self::Str),
            "float" => Ok(Self::Float),
            "bool" => Ok(Self::Bool),
            other => Err(TopicError::UnknownCaptureType(other.to_string())),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Str => "str",
            Self::Float => "float",
            Self::Bool => "bool",
        }
    }

    /// `None` when the segment does not read as this type.
    pub fn coerce(self, text: &str) -> Option<Value> {
        match self {
            Self::Str => Some(Value::Str(text.to_string())),
            Self::Int => INT_TEXT_RE
                .is_match(text)
                .then(|| text.parse::<i64>().ok())
                .flatten()
                .map(Value::Int),
            Self::Float => FLOAT_TEXT_RE
                .is_match(text)
                .then(|| text.parse::<f64>().ok())
                .flatten()
                .map(Value::Float),
            Self::Bool => match text {
                "true" | "True" | "1" => Some(Value::Bool(true)),
                "false" | "False" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
        }
    }
}

/// One parsed subscription segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKey {
    Literal(String),
    Positional(CaptureType),
    Named { name: String, kind: CaptureType },
}

impl EventKey {
    pub fn parse(segment: &str) -> Result<Self, TopicError> {
        match segment {
            "*" => return Ok(Self::Positional(CaptureType::Str)),
            "#" => return Ok(Self::Positional(CaptureType::Int)),
            _ => {}
        }

        let Some(inner) = segment
            .strip_prefix('<')
            .and_then(|rest| rest.strip_suffix('>'))
        else {
            return Ok(Self::Literal(segment.to_string()));
        };

        let (name, kind) = match inner.split_once(':') {
            Some((name, kind)) => (name, CaptureType::parse(kind)?),
            None => (inner, CaptureType::Str),
        };
        if name == "*" {
            return Ok(Self::Positional(kind));
        }
        if !CAPTURE_NAME_RE.is_match(name) {
            return Err(TopicError::InvalidCapture(segment.to_string()));
        }
        Ok(Self::Named {
            name: name.to_string(),
            kind,
        })
    }
}

impl Display for EventKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Literal(text) => write!(f, "{text}"),
            Self::Positional(CaptureType::Str) => write!(f, "*"),
            Self::Positional(CaptureType::Int) => write!(f, "#"),
            Self::Positional(kind) => write!(f, "<*:{}>", kind.as_str()),
            Self::Named { name, kind } => write!(f, "<{name}:{}>", kind.as_str()),
        }
    }
}

/// Values captured while matching an emitted topic.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Captures {
    pub args: Vec<Value>,
    pub kwargs: BTreeMap<String, Value>,
}

/// Parsed subscription pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    keys: Vec<EventKey>,
}

impl Topic {
    pub fn parse(topic: &str) -> Result<Self, TopicError> {
        let keys = topic
            .split('/')
            .map(|segment| {
                if segment.is_empty() {
                    Err(TopicError::EmptySegment(topic.to_string()))
                } else {
                    EventKey::parse(segment)
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { keys })
    }

    pub fn keys(&self) -> &[EventKey] {
        &self.keys
    }

    /// Single `*` subscriptions receive every emission.
    pub fn is_catch_all(&self) -> bool {
        matches!(self.keys.as_slice(), [EventKey::Positional(CaptureType::Str)])
    }

    /// Matches an emitted topic; `None` on mismatch or failed coercion.
    pub fn matches(&self, emitted: &str) -> Option<Captures> {
        let mut captures = Captures::default();
        if self.is_catch_all() {
            captures.args.push(Value::Str(emitted.to_string()));
            return Some(captures);
        }

        let segments: Vec<&str> = emitted.split('/').collect();
        if segments.len() != self.keys.len() {
            return None;
        }

        for (key, segment) in self.keys.iter().zip(segments) {
            match key {
                EventKey::Literal(text) => {
                    if text != segment {
                        return None;
                    }
                }
                EventKey::Positional(kind) => captures.args.push(kind.coerce(segment)?),
                EventKey::Named { name, kind } => {
                    captures.kwargs.insert(name.clone(), kind.coerce(segment)?);
                }
            }
        }
        Some(captures)
    }
}

impl Display for Topic {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for (index, key) in self.keys.iter().enumerate() {
            if index > 0 {
                write!(f, "/")?;
            }
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{CaptureType, EventKey, Topic, TopicError};
    use crate::value::Value;

    #[test]
    fn parses_every_segment_kind() {
        let topic = Topic::parse("Book/#/<field>/<n:float>/*").unwrap();
        assert_eq!(
            topic.keys(),
            &[
                EventKey::Literal("Book".into()),
                EventKey::Positional(CaptureType::Int),
                EventKey::Named {
                    name: "field".into(),
                    kind: CaptureType::Str
                },
                EventKey::Named {
                    name: "n".into(),
                    kind: CaptureType::Float
                },
                EventKey::Positional(CaptureType::Str),
            ]
        );
        assert_eq!(topic.to_string(), "Book/#/<field:str>/<n:float>/*");
    }

    #[test]
    fn rejects_unknown_capture_type() {
        assert_eq!(
            Topic::parse("a/<x:unknown>"),
            Err(TopicError::UnknownCaptureType("unknown".into()))
        );
        assert!(matches!(
            Topic::parse("a//b"),
            Err(TopicError::EmptySegment(_))
        ));
    }

    #[test]
    fn typed_capture_coerces_or_skips() {
        let topic = Topic::parse("a/<n:int>/c").unwrap();
        let captures = topic.matches("a/42/c").unwrap();
        assert_eq!(captures.kwargs.get("n"), Some(&Value::Int(42)));
        assert!(topic.matches("a/x/c").is_none());
        assert!(topic.matches("a/42").is_none());
    }

    #[test]
    fn bool_capture_accepts_only_known_spellings() {
        assert_eq!(CaptureType::Bool.coerce("True"), Some(Value::Bool(true)));
        assert_eq!(CaptureType::Bool.coerce("0"), Some(Value::Bool(false)));
        assert_eq!(CaptureType::Bool.coerce("yes"), None);
    }

    #[test]
    fn catch_all_receives_topic_as_argument() {
        let topic = Topic::parse("*").unwrap();
        let captures = topic.matches("Book/3/create").unwrap();
        assert_eq!(captures.args, vec![Value::Str("Book/3/create".into())]);
    }
}
