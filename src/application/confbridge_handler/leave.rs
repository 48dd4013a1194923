use super::ConfbridgeHandler;
use crate::domain::bridge::Bridge;
use crate::domain::channel::{Channel, HangupCause};
use crate::domain::confbridge::ConfbridgeType;
use crate::domain::ports::snapshot;
use crate::domain::shared::{EventType, Result};
use serde_json::json;
use tracing::{debug, error, info, warn};

impl ConfbridgeHandler {
    /// A member channel left the confbridge's bridge
    ///
    /// The call's conference reference is cleared by the call service on a
    /// detached task. A connect session left with a single party kicks it,
    /// and an empty one is terminated.
    pub async fn leaved(&self, channel: &Channel, bridge: &Bridge) -> Result<()> {
        let Some(id) = bridge.reference_id else {
            debug!("Bridge {} has no confbridge reference", bridge.id);
            return Ok(());
        };
        let confbridge = match self.confbridges.confbridge_get(id).await {
            Ok(confbridge) => confbridge,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        let call_id = confbridge.channel_call_ids.get(&channel.id).copied();
        self.confbridges
            .confbridge_remove_channel_call_id(id, &channel.id)
            .await?;

        if let Some(call_id) = call_id {
            let requester = self.requester.clone();
            tokio::spawn(async move {
                if let Err(e) = requester.call_remove_confbridge(call_id).await {
                    error!("Could not remove confbridge from call {}: {}", call_id, e);
                }
            });
        }

        self.channel
            .hangup_quietly(&channel.asterisk_id, &channel.id, HangupCause::NormalClearing)
            .await;

        let confbridge = self.confbridges.confbridge_get(id).await?;
        info!(
            "Channel {} left confbridge {}, {} remaining",
            channel.id,
            id,
            confbridge.member_count()
        );
        self.publish(
            EventType::ConfbridgeLeaved,
            json!({ "confbridge": snapshot(&confbridge), "leaved_call_id": call_id }),
        );

        if confbridge.confbridge_type != ConfbridgeType::Connect || confbridge.tm_delete.is_some() {
            return Ok(());
        }
        match confbridge.member_count() {
            0 => self.terminate(id).await,
            1 => {
                if let Some(remaining) = confbridge.channel_call_ids.values().next() {
                    if let Err(e) = self.kick(id, *remaining).await {
                        warn!("Could not kick call {} from confbridge {}: {}", remaining, id, e);
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
