//! Core runtime for declaring entity models and serving them through CRUD.
//! The registry is the single source of truth for models and live entities.

pub mod config;
pub mod db;
pub mod error;
pub mod event;
pub mod logging;
pub mod model;
pub mod query;
pub mod registry;
pub mod repo;
pub mod service;
pub mod value;

pub use config::{ConfigError, RuntimeConfig};
pub use error::{DeclarationError, RuntimeError, RuntimeResult, ValidationError, ValidationKind};
pub use event::{Delivery, EventBus, Subscription, Topic};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::{
    DataType, DeleteKind, DeleteMode, Field, ForeignKey, Instance, Method, ModelDef, ViewMode,
};
pub use query::Query;
pub use registry::{Model, Registry};
pub use repo::{JsonFileStore, MemoryStore, RecordStore, SqliteStore, StoreError};
pub use service::{Action, Actor, Api, CrudService, FieldRight, Grant, Response, Rights};
pub use value::{EntityRef, Value};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::core_version;

    #[test]
    fn version_is_not_empty() {
        assert!(!core_version().is_empty());
    }
}
