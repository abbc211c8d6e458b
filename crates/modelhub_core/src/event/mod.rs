//! Hierarchical topic pub/sub used for entity change notification.
//!
//! # Responsibility
//! - Parse wildcard / typed-capture subscription topics.
//! - Deliver emissions synchronously to matching subscribers.
//!
//! # Invariants
//! - Emitted topics are literal; only subscriptions carry patterns.
//! - Lifecycle topics are `<Model>/<uid>/<create|update|delete>`; attribute
//!   topics are `<Model>/<uid>/<method>/<name>`.

mod bus;
mod topic;

pub use bus::{Delivery, EventBus, Subscription};
pub use topic::{CaptureType, Captures, EventKey, Topic, TopicError};

/// Builds `<model>/<uid>/<method>` or `<model>/<uid>/<method>/<name>`.
pub fn entity_topic(model: &str, uid: u64, method: &str, name: Option<&str>) -> String {
    match name {
        Some(name) => format!("{model}/{uid}/{method}/{name}"),
        None => format!("{model}/{uid}/{method}"),
    }
}
