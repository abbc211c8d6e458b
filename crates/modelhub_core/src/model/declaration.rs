//! Model declarations and per-model policies.

use super::attribute::Attribute;
use super::field::Field;
use super::foreign_key::ForeignKey;
use super::method::Method;
use crate::error::DeclarationError;
use crate::service::Rights;
use std::fmt::{Debug, Formatter};
use std::rc::Rc;
use std::str::FromStr;

/// Abstract model every declaration extends unless it names another parent.
pub const ROOT_MODEL: &str = "Model";

/// Concrete delete requested by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteKind {
    Soft,
    Hard,
}

impl DeleteKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Soft => "soft",
            Self::Hard => "hard",
        }
    }
}

/// Which delete kinds a model allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Resolved from the nearest ancestor that is not `Inherit`.
    Inherit,
    Soft,
    Hard,
    /// Soft by default, hard on request.
    AllowHard,
    /// Hard by default, soft on request.
    AllowSoft,
}

impl DeleteMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Inherit => "INHERIT",
            Self::Soft => "SOFT",
            Self::Hard => "HARD",
            Self::AllowHard => "ALLOW_HARD",
            Self::AllowSoft => "ALLOW_SOFT",
        }
    }

    /// `None` when the policy forbids the requested kind. `Inherit` must be
    /// resolved before asking.
    pub fn resolve(self, requested: Option<DeleteKind>) -> Option<DeleteKind> {
        match (self, requested) {
            (Self::Inherit, _) => None,
            (Self::Soft, None | Some(DeleteKind::Soft)) => Some(DeleteKind::Soft),
            (Self::Hard, None | Some(DeleteKind::Hard)) => Some(DeleteKind::Hard),
            (Self::Soft | Self::Hard, Some(_)) => None,
            (Self::AllowHard, None) => Some(DeleteKind::Soft),
            (Self::AllowSoft, None) => Some(DeleteKind::Hard),
            (Self::AllowHard | Self::AllowSoft, Some(kind)) => Some(kind),
        }
    }
}

impl FromStr for DeleteMode {
    type Err = DeclarationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INHERIT" => Ok(Self::Inherit),
            "SOFT" => Ok(Self::Soft),
            "HARD" => Ok(Self::Hard),
            "ALLOW_HARD" => Ok(Self::AllowHard),
            "ALLOW_SOFT" => Ok(Self::AllowSoft),
            other => Err(DeclarationError::InvalidDeleteMode(format!(
                "unknown delete mode `{other}`"
            ))),
        }
    }
}

/// Which distant attributes a read or snapshot includes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Fields plus distant attributes flagged `on_lazy`.
    #[default]
    Lazy,
    /// Every attribute.
    Eager,
}

impl FromStr for ViewMode {
    type Err = DeclarationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "LAZY" => Ok(Self::Lazy),
            "EAGER" => Ok(Self::Eager),
            other => Err(DeclarationError::InvalidDescriptor(format!(
                "unknown view mode `{other}`"
            ))),
        }
    }
}

/// Declaration passed to [`crate::registry::Registry::declare`].
#[derive(Clone)]
pub struct ModelDef {
    pub(crate) name: String,
    pub(crate) parent: Option<String>,
    pub(crate) is_abstract: bool,
    pub(crate) delete_mode: DeleteMode,
    pub(crate) attributes: Vec<Attribute>,
    pub(crate) rights: Option<Rc<dyn Rights>>,
}

impl Debug for ModelDef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelDef")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("is_abstract", &self.is_abstract)
            .field("delete_mode", &self.delete_mode)
            .field("attributes", &self.attributes)
            .field("rights", &self.rights.is_some())
            .finish()
    }
}

impl ModelDef {
    /// Concrete model extending [`ROOT_MODEL`], inheriting its delete mode.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: Some(ROOT_MODEL.to_string()),
            is_abstract: false,
            delete_mode: DeleteMode::Inherit,
            attributes: Vec::new(),
            rights: None,
        }
    }

    pub(crate) fn root() -> Self {
        Self {
            parent: None,
            is_abstract: true,
            delete_mode: DeleteMode::AllowHard,
            ..Self::new(ROOT_MODEL)
        }
        .field(
            Field::new(super::field::UID_FIELD, "int")
                .increment(1, 1)
                .range(1_i64, i64::MAX)
                .unique()
                .immutable(),
        )
    }

    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    /// Declared for inheritance only; never instantiated or stored.
    pub fn abstract_model(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    pub fn delete_mode(mut self, mode: DeleteMode) -> Self {
        self.delete_mode = mode;
        self
    }

    pub fn attribute(mut self, attribute: impl Into<Attribute>) -> Self {
        self.attributes.push(attribute.into());
        self
    }

    pub fn field(self, field: Field) -> Self {
        self.attribute(field)
    }

    /// Field declared in one-line notation, see [`Field::from_rpy`].
    pub fn rpy_field(self, line: &str) -> Result<Self, DeclarationError> {
        Ok(self.attribute(Field::from_rpy(line)?))
    }

    pub fn foreign_key(self, foreign_key: ForeignKey) -> Self {
        self.attribute(foreign_key)
    }

    pub fn method(self, method: Method) -> Self {
        self.attribute(method)
    }

    pub fn rights(mut self, rights: impl Rights + 'static) -> Self {
        self.rights = Some(Rc::new(rights));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::{DeleteKind, DeleteMode};

    #[test]
    fn delete_policies_resolve_requests() {
        assert_eq!(DeleteMode::AllowHard.resolve(None), Some(DeleteKind::Soft));
        assert_eq!(
            DeleteMode::AllowHard.resolve(Some(DeleteKind::Hard)),
            Some(DeleteKind::Hard)
        );
        assert_eq!(DeleteMode::AllowSoft.resolve(None), Some(DeleteKind::Hard));
        assert_eq!(DeleteMode::Hard.resolve(Some(DeleteKind::Soft)), None);
        assert_eq!(DeleteMode::Soft.resolve(Some(DeleteKind::Soft)), Some(DeleteKind::Soft));
        assert_eq!(DeleteMode::Inherit.resolve(None), None);
    }

    #[test]
    fn delete_mode_parses_case_insensitively() {
        assert_eq!("allow_soft".parse::<DeleteMode>().unwrap(), DeleteMode::AllowSoft);
        assert!("sometimes".parse::<DeleteMode>().is_err());
    }
}
