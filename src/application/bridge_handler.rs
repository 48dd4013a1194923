//! Bridge lifecycle and membership

use crate::domain::bridge::{bridge_name, Bridge, BridgeRepository, BridgeType, ReferenceType};
use crate::domain::ports::AriCommander;
use crate::domain::shared::Result;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DEFAULT_EXIST_TIMEOUT: Duration = Duration::from_secs(3);

pub struct BridgeHandler {
    bridges: Arc<dyn BridgeRepository>,
    ari: Arc<dyn AriCommander>,
    exist_timeout: Duration,
}

impl BridgeHandler {
    pub fn new(bridges: Arc<dyn BridgeRepository>, ari: Arc<dyn AriCommander>) -> Self {
        Self {
            bridges,
            ari,
            exist_timeout: DEFAULT_EXIST_TIMEOUT,
        }
    }

    /// How long to wait for a requested bridge's `BridgeCreated`
    pub fn with_exist_timeout(mut self, timeout: Duration) -> Self {
        self.exist_timeout = timeout;
        self
    }

    pub async fn create(&self, bridge: &Bridge) -> Result<()> {
        self.bridges.bridge_create(bridge).await?;
        info!(
            "Created bridge {} on {} for {} {:?}",
            bridge.id,
            bridge.asterisk_id,
            bridge.reference_type.as_str(),
            bridge.reference_id
        );
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Bridge> {
        self.bridges.bridge_get(id).await
    }

    /// Wait for the bridge record to show up
    pub async fn is_exist(&self, id: &str) -> bool {
        self.bridges.bridge_is_exist(id, self.exist_timeout).await
    }

    /// Whether the bridge is known and not yet destroyed
    pub async fn is_alive(&self, id: &str) -> bool {
        matches!(self.bridges.bridge_get(id).await, Ok(bridge) if !bridge.is_deleted())
    }

    /// Record the bridge's destruction; an unknown bridge is not an error
    pub async fn delete(&self, id: &str, timestamp: DateTime<Utc>) -> Result<()> {
        match self.bridges.bridge_delete(id, timestamp).await {
            Err(e) if e.is_not_found() => {
                debug!("Destroyed bridge {} was never recorded", id);
                Ok(())
            }
            other => other,
        }
    }

    pub async fn add_channel_id(&self, id: &str, channel_id: &str) -> Result<()> {
        self.bridges.bridge_add_channel_id(id, channel_id).await
    }

    pub async fn remove_channel_id(&self, id: &str, channel_id: &str) -> Result<()> {
        self.bridges.bridge_remove_channel_id(id, channel_id).await
    }

    /// Create a bridge on a node; returns its id
    ///
    /// The record itself is written when the node reports `BridgeCreated`.
    pub async fn start(
        &self,
        asterisk_id: &str,
        reference_type: ReferenceType,
        reference_id: Uuid,
        types: &[BridgeType],
    ) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let name = bridge_name(reference_type, reference_id);
        self.ari.bridge_create(asterisk_id, &id, &name, types).await?;
        debug!("Requested bridge {} ({}) on {}", id, name, asterisk_id);
        Ok(id)
    }

    /// Put a channel into a bridge on the bridge's node
    pub async fn add_channel(&self, asterisk_id: &str, bridge_id: &str, channel_id: &str) -> Result<()> {
        debug!("Adding channel {} to bridge {}", channel_id, bridge_id);
        self.ari
            .bridge_add_channel(asterisk_id, bridge_id, channel_id)
            .await
    }

    /// Tear a bridge down; missing or already destroyed bridges are fine
    pub async fn destroy(&self, id: &str) -> Result<()> {
        let bridge = match self.bridges.bridge_get(id).await {
            Ok(bridge) => bridge,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };
        if bridge.is_deleted() {
            return Ok(());
        }
        self.ari.bridge_delete(&bridge.asterisk_id, &bridge.id).await
    }

    pub async fn destroy_quietly(&self, id: &str) {
        if let Err(e) = self.destroy(id).await {
            warn!("Could not destroy bridge {}: {}", id, e);
        }
    }

    /// Pull every remaining member out of the bridge
    pub async fn remove_all_channels(&self, bridge: &Bridge) {
        for channel_id in &bridge.channel_ids {
            if let Err(e) = self
                .ari
                .bridge_remove_channel(&bridge.asterisk_id, &bridge.id, channel_id)
                .await
            {
                warn!(
                    "Could not remove channel {} from bridge {}: {}",
                    channel_id, bridge.id, e
                );
            }
        }
    }
}
