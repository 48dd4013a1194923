use super::AriEventHandler;
use crate::domain::bridge::ReferenceType;
use crate::domain::channel::{ChannelType, HangupCause};
use crate::domain::shared::Result;
use crate::infrastructure::protocols::ari::event::ChannelBridgeEvent;
use tracing::debug;

impl AriEventHandler {
    pub(super) async fn channel_entered_bridge(&self, e: ChannelBridgeEvent) -> Result<()> {
        let channel_id = e.channel.id.as_str();
        let bridge_id = e.bridge.id.as_str();

        let recorded = match self
            .channel
            .set_bridge_id(channel_id, Some(bridge_id.to_string()))
            .await
        {
            Ok(()) => self.bridge.add_channel_id(bridge_id, channel_id).await,
            Err(e) => Err(e),
        };
        if let Err(err) = recorded {
            self.channel
                .hangup_quietly(&e.header.asterisk_id, channel_id, HangupCause::Interworking)
                .await;
            return Err(err);
        }

        let channel = self.channel.get(channel_id).await?;
        if channel.channel_type != ChannelType::Confbridge {
            return Ok(());
        }
        let bridge = self.bridge.get(bridge_id).await?;
        self.confbridge.joined(&channel, &bridge).await
    }

    pub(super) async fn channel_left_bridge(&self, e: ChannelBridgeEvent) -> Result<()> {
        let channel_id = e.channel.id.as_str();
        let bridge_id = e.bridge.id.as_str();

        self.channel.set_bridge_id(channel_id, None).await?;
        self.bridge.remove_channel_id(bridge_id, channel_id).await?;

        let channel = self.channel.get(channel_id).await?;
        let bridge = self.bridge.get(bridge_id).await?;
        match bridge.reference_type {
            ReferenceType::Call | ReferenceType::CallSnoop => {
                self.call.leave_bridge(&channel, &bridge).await
            }
            ReferenceType::Confbridge | ReferenceType::ConfbridgeSnoop => {
                self.confbridge.leaved(&channel, &bridge).await
            }
            ReferenceType::Unknown => {
                debug!("Channel {} left unreferenced bridge {}", channel_id, bridge_id);
                Ok(())
            }
        }
    }
}
