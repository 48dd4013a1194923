//! WebSocket notification stream
//!
//! Every notification handed to the [`EventBroadcaster`] is forwarded as a
//! JSON text frame. `?customer_id=<uuid>` restricts the stream to that
//! customer's webhook notifications.

use crate::infrastructure::messaging::{Audience, EventBroadcaster, Notification};
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct EventFilter {
    pub customer_id: Option<Uuid>,
}

impl EventFilter {
    pub fn accepts(&self, notification: &Notification) -> bool {
        match self.customer_id {
            None => true,
            Some(customer_id) => notification.audience == Audience::Customer(customer_id),
        }
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(filter): Query<EventFilter>,
    State(broadcaster): State<Arc<EventBroadcaster>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, broadcaster, filter))
}

async fn handle_socket(socket: WebSocket, broadcaster: Arc<EventBroadcaster>, filter: EventFilter) {
    let (mut sender, mut receiver) = socket.split();
    let mut rx = broadcaster.subscribe();

    info!("WebSocket client connected");

    let mut send_task = tokio::spawn(async move {
        loop {
            let notification = match rx.recv().await {
                Ok(notification) => notification,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("WebSocket client lagged, {} notifications dropped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if !filter.accepts(&notification) {
                continue;
            }

            match serde_json::to_string(&notification) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        debug!("Failed to send notification to WebSocket client");
                        break;
                    }
                }
                Err(e) => error!("Failed to serialize notification: {}", e),
            }
        }
    });

    // only close frames matter from the client side
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if let Message::Close(_) = msg {
                break;
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    info!("WebSocket client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::EventType;
    use chrono::Utc;
    use serde_json::json;

    fn notification(audience: Audience) -> Notification {
        Notification {
            audience,
            event_type: EventType::CallCreated,
            data: json!({}),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_filter_by_customer() {
        let customer_id = Uuid::new_v4();
        let filter = EventFilter {
            customer_id: Some(customer_id),
        };

        assert!(filter.accepts(&notification(Audience::Customer(customer_id))));
        assert!(!filter.accepts(&notification(Audience::Customer(Uuid::new_v4()))));
        assert!(!filter.accepts(&notification(Audience::Internal)));
        assert!(EventFilter::default().accepts(&notification(Audience::Internal)));
    }
}
