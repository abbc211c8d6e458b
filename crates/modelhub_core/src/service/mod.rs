//! Core use-case services.
//!
//! # Responsibility
//! - Gate entity operations through per-model rights.
//! - Translate client payloads and view formats to registry calls.
//! - Keep transport layers decoupled from the registry and the stores.

pub mod api;
pub mod crud_service;
pub mod rights;
pub mod view;

pub use api::{Api, Response, Status};
pub use crud_service::{parse_uid, CrudService, Payload, SkipReason};
pub use rights::{Action, Actor, AllowAll, FieldRight, Grant, Rights, ROLE_ADMIN, ROLE_MEMBER};
pub use view::{ScalarCast, SubFormat, ViewFormat};
