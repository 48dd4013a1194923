//! Notification port

use crate::domain::shared::EventType;
use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

/// Outbound notifications
///
/// Both methods are fire-and-forget: delivery is at most once and failures
/// never reach the caller.
#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    /// Internal pub/sub for sibling services
    fn publish_event(&self, event_type: EventType, payload: serde_json::Value);

    /// Customer-facing webhook delivery
    fn notify_event(&self, customer_id: Uuid, event_type: EventType, payload: serde_json::Value);
}

/// Serialize an entity into a notification payload
pub fn snapshot<T: Serialize>(value: &T) -> serde_json::Value {
    match serde_json::to_value(value) {
        Ok(value) => value,
        Err(e) => {
            warn!("Could not serialize notification payload: {}", e);
            serde_json::Value::Null
        }
    }
}
