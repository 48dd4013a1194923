//! Notification fan-out
//!
//! [`EventBroadcaster`] is the production [`Notifier`]: every notification
//! goes onto a tokio broadcast channel, and subscribers (the `/events`
//! websocket, webhook forwarders) pick it up. Sending never blocks; with no
//! subscriber the notification is dropped.

use crate::domain::ports::Notifier;
use crate::domain::shared::EventType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

/// Who a notification is addressed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "customer_id", rename_all = "snake_case")]
pub enum Audience {
    /// Internal pub/sub for sibling services
    Internal,
    /// Webhook delivery to one customer
    Customer(Uuid),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub audience: Audience,
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

pub struct EventBroadcaster {
    tx: broadcast::Sender<Notification>,
}

impl EventBroadcaster {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    fn send(&self, audience: Audience, event_type: EventType, data: serde_json::Value) {
        let notification = Notification {
            audience,
            event_type,
            data,
            timestamp: Utc::now(),
        };
        if self.tx.send(notification).is_err() {
            debug!("No subscriber for {} notification", event_type);
        }
    }
}

impl Default for EventBroadcaster {
    fn default() -> Self {
        Self::new(1000)
    }
}

impl Notifier for EventBroadcaster {
    fn publish_event(&self, event_type: EventType, payload: serde_json::Value) {
        self.send(Audience::Internal, event_type, payload);
    }

    fn notify_event(&self, customer_id: Uuid, event_type: EventType, payload: serde_json::Value) {
        self.send(Audience::Customer(customer_id), event_type, payload);
    }
}
