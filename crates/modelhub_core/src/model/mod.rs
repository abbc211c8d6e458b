//! Model declarations, attribute descriptors, and live entities.

mod attribute;
pub mod check;
mod datatype;
mod declaration;
mod entity;
mod field;
mod foreign_key;
mod handler;
mod method;

pub use attribute::{Attribute, AttributeKind};
pub use check::{Check, CheckContext};
pub use datatype::DataType;
pub use declaration::{DeleteKind, DeleteMode, ModelDef, ViewMode, ROOT_MODEL};
pub use entity::{Entity, Instance};
pub use field::{Field, FieldDefault, HashAlgorithm, Increment, UID_FIELD};
pub use foreign_key::ForeignKey;
pub use handler::ModelHandler;
pub use method::{BoundMethod, Method, MethodFn};
