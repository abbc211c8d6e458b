//! Transport-facing envelope over [`CrudService`].
//!
//! # Responsibility
//! - Parse request bodies (`{"data": .., "format": .., "mode": ..}`).
//! - Map POST/GET/PUT/DELETE onto signed uids.
//! - Wrap every outcome in `{status, data, message}`.
//!
//! # Invariants
//! - Errors never escape: they become `status = "error"` with a message.

use super::crud_service::{parse_uid, CrudService, Payload};
use super::rights::Actor;
use super::view::ViewFormat;
use crate::error::{RuntimeError, RuntimeResult};
use crate::model::ViewMode;
use crate::registry::Registry;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub data: Json,
    pub message: Option<String>,
}

impl Response {
    pub fn success(data: Json) -> Self {
        Self {
            status: Status::Success,
            data,
            message: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            data: Json::Null,
            message: Some(message.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    pub fn to_json(&self) -> Json {
        serde_json::to_value(self).unwrap_or_else(|err| {
            serde_json::json!({"status": "error", "data": null, "message": err.to_string()})
        })
    }
}

impl From<RuntimeResult<Json>> for Response {
    fn from(result: RuntimeResult<Json>) -> Self {
        match result {
            Ok(data) => Self::success(data),
            Err(err) => Self::error(err.to_string()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RequestBody {
    data: Payload,
    format: Json,
    mode: Option<String>,
}

impl RequestBody {
    fn parse(body: &str) -> RuntimeResult<Self> {
        if body.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(body).map_err(|err| RuntimeError::InvalidPayload(err.to_string()))
    }

    fn mode(&self) -> RuntimeResult<ViewMode> {
        match &self.mode {
            Some(mode) => Ok(mode.parse()?),
            None => Ok(ViewMode::Lazy),
        }
    }
}

/// Request handler for one model.
#[derive(Debug, Clone)]
pub struct Api {
    crud: CrudService,
}

impl Api {
    pub fn new(registry: Registry, model: impl Into<String>) -> Self {
        Self {
            crud: CrudService::new(registry, model),
        }
    }

    pub fn crud(&self) -> &CrudService {
        &self.crud
    }

    /// Runs one request: `uid` is signed (`0` create, `< 0` delete),
    /// `payload` must be an object or null.
    pub fn request(&self, actor: &Actor, uid: &Json, payload: &Json, format: &Json, mode: ViewMode) -> Response {
        let result = self.dispatch(actor, uid, payload, format, mode);
        match &result {
            Ok(_) => info!(
                "event=api_request module=service status=ok model={} uid={uid}",
                self.crud.model_name()
            ),
            Err(err) => warn!(
                "event=api_request module=service status=error model={} uid={uid} error={err}",
                self.crud.model_name()
            ),
        }
        Response::from(result)
    }

    fn dispatch(&self, actor: &Actor, uid: &Json, payload: &Json, format: &Json, mode: ViewMode) -> RuntimeResult<Json> {
        let uid = parse_uid(uid)?;
        let payload = match payload {
            Json::Null => Payload::new(),
            Json::Object(object) => object.clone(),
            other => {
                return Err(RuntimeError::InvalidPayload(format!(
                    "expected an object, got {other}"
                )))
            }
        };
        let format = ViewFormat::parse(format)?;
        self.crud.apply_client(actor, uid, &payload, &format, mode)
    }

    fn with_body(&self, actor: &Actor, uid: Json, body: &str, keep_data: bool) -> Response {
        let parsed = RequestBody::parse(body).and_then(|request| Ok((request.mode()?, request)));
        match parsed {
            Ok((mode, request)) => {
                let data = if keep_data {
                    Json::Object(request.data)
                } else {
                    Json::Null
                };
                self.request(actor, &uid, &data, &request.format, mode)
            }
            Err(err) => Response::error(err.to_string()),
        }
    }

    /// Creates from the body's `data`.
    pub fn post(&self, actor: &Actor, body: &str) -> Response {
        self.with_body(actor, Json::from(0), body, true)
    }

    /// Reads `uid`; the body may carry `format` and `mode`.
    pub fn get(&self, actor: &Actor, uid: &str, body: &str) -> Response {
        match positive_uid(uid) {
            Ok(uid) => self.with_body(actor, Json::from(uid), body, false),
            Err(err) => Response::error(err.to_string()),
        }
    }

    /// Updates `uid` from the body's `data`.
    pub fn put(&self, actor: &Actor, uid: &str, body: &str) -> Response {
        match positive_uid(uid) {
            Ok(uid) => self.with_body(actor, Json::from(uid), body, true),
            Err(err) => Response::error(err.to_string()),
        }
    }

    pub fn delete(&self, actor: &Actor, uid: &str) -> Response {
        match positive_uid(uid) {
            Ok(uid) => self.request(actor, &Json::from(-uid), &Json::Null, &Json::Null, ViewMode::Lazy),
            Err(err) => Response::error(err.to_string()),
        }
    }
}

fn positive_uid(raw: &str) -> RuntimeResult<i64> {
    match parse_uid(&Json::String(raw.trim().to_string()))? {
        uid if uid > 0 => Ok(uid),
        _ => Err(RuntimeError::InvalidUid(raw.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{Response, Status};
    use serde_json::json;

    #[test]
    fn response_serializes_lowercase_status() {
        let response = Response::error("boom");
        assert_eq!(
            response.to_json(),
            json!({"status": "error", "data": null, "message": "boom"})
        );
        assert_eq!(Response::success(json!({})).status, Status::Success);
    }
}
