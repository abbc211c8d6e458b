//! Error taxonomy shared by the registry, CRUD pipeline, and api envelope.
//!
//! # Invariants
//! - Declaration problems surface at declaration time, never during requests.
//! - Validation failures carry every failing field, never just the first.

use crate::event::TopicError;
use crate::model::{DeleteKind, DeleteMode};
use crate::query::QueryError;
use crate::repo::StoreError;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Invalid model or descriptor declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeclarationError {
    DuplicateModel(String),
    InvalidModelName(String),
    UnknownParent { model: String, parent: String },
    UnknownDataType { model: String, field: String, datatype: String },
    InvalidDeleteMode(String),
    InvalidDescriptor(String),
}

impl Display for DeclarationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateModel(name) => write!(f, "model `{name}` is already declared"),
            Self::InvalidModelName(name) => write!(f, "invalid model name `{name}`"),
            Self::UnknownParent { model, parent } => {
                write!(f, "model `{model}` extends unknown model `{parent}`")
            }
            Self::UnknownDataType {
                model,
                field,
                datatype,
            } => write!(f, "field `{model}.{field}` has unknown datatype `{datatype}`"),
            Self::InvalidDeleteMode(message) => write!(f, "invalid delete mode: {message}"),
            Self::InvalidDescriptor(message) => write!(f, "invalid descriptor: {message}"),
        }
    }
}

impl Error for DeclarationError {}

/// Which write produced a validation report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationKind {
    Create,
    Update,
}

impl ValidationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
        }
    }
}

/// Aggregated field check failures for one create or update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub kind: ValidationKind,
    pub model: String,
    pub errors: BTreeMap<String, Vec<String>>,
}

impl ValidationError {
    pub fn messages(&self, field: &str) -> &[String] {
        self.errors.get(field).map_or(&[], Vec::as_slice)
    }
}

impl Display for ValidationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} failed:", self.model, self.kind.as_str())?;
        for (field, messages) in &self.errors {
            write!(f, "\n  {field}:")?;
            for message in messages {
                write!(f, "\n    > {message}")?;
            }
        }
        Ok(())
    }
}

impl Error for ValidationError {}

#[derive(Debug)]
pub enum RuntimeError {
    Declaration(DeclarationError),
    Validation(ValidationError),
    Rights(String),
    NotFound { model: String, uid: u64 },
    UnknownModel(String),
    UnknownAttribute { model: String, name: String },
    AlreadyExists { model: String, uid: u64 },
    DeleteModeForbidden {
        model: String,
        requested: DeleteKind,
        policy: DeleteMode,
    },
    InvalidUid(String),
    InvalidPayload(String),
    InvalidFormat(String),
    InvalidOperation(String),
    Persistence(StoreError),
    Query(QueryError),
    Topic(TopicError),
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Declaration(err) => write!(f, "{err}"),
            Self::Validation(err) => write!(f, "{err}"),
            Self::Rights(message) => write!(f, "{message}"),
            Self::NotFound { model, uid } => write!(f, "{model}:{uid} not found"),
            Self::UnknownModel(name) => write!(f, "unknown model `{name}`"),
            Self::UnknownAttribute { model, name } => {
                write!(f, "model `{model}` has no attribute `{name}`")
            }
            Self::AlreadyExists { model, uid } => write!(f, "{model}:{uid} already exists"),
            Self::DeleteModeForbidden {
                model,
                requested,
                policy,
            } => write!(
                f,
                "{model} does not allow {} delete (policy {})",
                requested.as_str(),
                policy.as_str()
            ),
            Self::InvalidUid(raw) => write!(f, "invalid uid `{raw}`"),
            Self::InvalidPayload(message) => write!(f, "invalid payload: {message}"),
            Self::InvalidFormat(message) => write!(f, "invalid view format: {message}"),
            Self::InvalidOperation(message) => write!(f, "{message}"),
            Self::Persistence(err) => write!(f, "{err}"),
            Self::Query(err) => write!(f, "{err}"),
            Self::Topic(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Declaration(err) => Some(err),
            Self::Validation(err) => Some(err),
            Self::Persistence(err) => Some(err),
            Self::Query(err) => Some(err),
            Self::Topic(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DeclarationError> for RuntimeError {
    fn from(value: DeclarationError) -> Self {
        Self::Declaration(value)
    }
}

impl From<ValidationError> for RuntimeError {
    fn from(value: ValidationError) -> Self {
        Self::Validation(value)
    }
}

impl From<StoreError> for RuntimeError {
    fn from(value: StoreError) -> Self {
        Self::Persistence(value)
    }
}

impl From<QueryError> for RuntimeError {
    fn from(value: QueryError) -> Self {
        Self::Query(value)
    }
}

impl From<TopicError> for RuntimeError {
    fn from(value: TopicError) -> Self {
        Self::Topic(value)
    }
}
