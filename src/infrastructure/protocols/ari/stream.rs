//! ARI websocket event stream
//!
//! Connects to the event endpoint, decodes each text frame into an
//! [`AriEvent`] and forwards it. Reconnects after a fixed delay whenever the
//! socket drops.

use super::event::AriEvent;
use crate::config::AriConfig;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

pub struct AriEventStream {
    url: String,
    reconnect_delay: Duration,
}

impl AriEventStream {
    pub fn new(config: &AriConfig) -> Self {
        let separator = if config.url.contains('?') { '&' } else { '?' };
        Self {
            url: format!("{}{}app={}", config.url, separator, config.application),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
        }
    }

    /// Run until the receiving side goes away
    pub async fn run(self, events: mpsc::Sender<AriEvent>) {
        loop {
            match self.read_until_closed(&events).await {
                Ok(()) if events.is_closed() => {
                    info!("Event receiver closed, stopping ARI stream");
                    return;
                }
                Ok(()) => warn!("ARI event stream closed by peer"),
                Err(e) => error!("ARI event stream failed: {}", e),
            }
            tokio::time::sleep(self.reconnect_delay).await;
        }
    }

    async fn read_until_closed(
        &self,
        events: &mpsc::Sender<AriEvent>,
    ) -> Result<(), tokio_tungstenite::tungstenite::Error> {
        let (socket, _) = connect_async(self.url.as_str()).await?;
        info!("Connected to ARI event stream {}", self.url);

        let (_, mut frames) = socket.split();
        while let Some(frame) = frames.next().await {
            let raw = match frame? {
                Message::Text(text) => text.into_bytes(),
                Message::Binary(data) => data,
                Message::Close(_) => break,
                _ => continue,
            };

            match AriEvent::parse(&raw) {
                Ok(AriEvent::Unknown) => debug!("Ignoring unhandled ARI event"),
                Ok(event) => {
                    if events.send(event).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Could not decode ARI event: {}", e),
            }
        }
        Ok(())
    }
}
