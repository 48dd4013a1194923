use super::ConfbridgeHandler;
use crate::domain::bridge::{Bridge, BridgeType, ReferenceType};
use crate::domain::call::Call;
use crate::domain::channel::{Channel, StasisContext};
use crate::domain::confbridge::Confbridge;
use crate::domain::ports::{snapshot, OriginateRequest};
use crate::domain::shared::{DomainError, EventType, Result};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};
use uuid::Uuid;

/// Dial string prefix of the leg dialing back into a confbridge's node
const CONF_JOIN_ENDPOINT: &str = "PJSIP/conf-join";

const JOIN_DIAL_TIMEOUT_SECS: u32 = 30;

impl ConfbridgeHandler {
    /// Bring a call into a confbridge
    ///
    /// Completes asynchronously: the dial-back leg shows up later as a
    /// `conf-in` channel on the confbridge's node.
    pub async fn join(&self, id: Uuid, call_id: Uuid) -> Result<()> {
        let confbridge = self.confbridges.confbridge_get(id).await?;
        if confbridge.tm_delete.is_some() {
            return Err(DomainError::InvalidOperation(format!(
                "confbridge {} is terminated",
                id
            )));
        }
        let call = self.calls.call_get(call_id).await?;
        let call_channel = self.channel.get(&call.channel_id).await?;

        let (bridge_id, bridge_node) = self.ensure_bridge(&confbridge, &call_channel).await?;
        let join_bridge_id = self.ensure_join_bridge(&call, &call_channel).await?;
        let address = self.requester.asterisk_address_internal(&bridge_node).await?;

        let request = OriginateRequest {
            asterisk_id: call_channel.asterisk_id.clone(),
            channel_id: Uuid::new_v4().to_string(),
            endpoint: format!("{}/sip:{}@{}", CONF_JOIN_ENDPOINT, id, address),
            app_args: format!(
                "context={},call_id={},bridge_id={},confbridge_id={}",
                StasisContext::CallJoin.as_str(),
                call_id,
                join_bridge_id,
                id
            ),
            variables: BTreeMap::from([
                ("CC-TYPE".to_string(), "join".to_string()),
                ("PJSIP_HEADER(add,CC-Confbridge-ID)".to_string(), id.to_string()),
                ("PJSIP_HEADER(add,CC-Bridge-ID)".to_string(), bridge_id),
                ("PJSIP_HEADER(add,CC-Call-ID)".to_string(), call_id.to_string()),
            ]),
            timeout: JOIN_DIAL_TIMEOUT_SECS,
        };
        info!(
            "Joining call {} to confbridge {} via {}",
            call_id, id, request.endpoint
        );
        self.ari.channel_create(&request).await
    }

    /// Bridge of the confbridge, created on the call's node when missing
    ///
    /// A bridge requested by an earlier join may not be recorded yet, so
    /// its record is waited for before it counts as gone. Returns the
    /// bridge id and the node owning it.
    async fn ensure_bridge(&self, confbridge: &Confbridge, call_channel: &Channel) -> Result<(String, String)> {
        if let Some(bridge_id) = &confbridge.bridge_id {
            if self.bridge.is_exist(bridge_id).await {
                let bridge = self.bridge.get(bridge_id).await?;
                if !bridge.is_deleted() {
                    return Ok((bridge.id, bridge.asterisk_id));
                }
                debug!("Bridge {} of confbridge {} is destroyed", bridge_id, confbridge.id);
            } else {
                debug!("Bridge {} of confbridge {} never showed up", bridge_id, confbridge.id);
            }
        }

        let bridge_id = self
            .bridge
            .start(
                &call_channel.asterisk_id,
                ReferenceType::Confbridge,
                confbridge.id,
                &confbridge.confbridge_type.bridge_types(),
            )
            .await?;
        self.confbridges
            .confbridge_set_bridge_id(confbridge.id, Some(bridge_id.clone()))
            .await?;
        Ok((bridge_id, call_channel.asterisk_id.clone()))
    }

    /// The call's own join bridge holding its channel
    async fn ensure_join_bridge(&self, call: &Call, call_channel: &Channel) -> Result<String> {
        if let Some(bridge_id) = &call.bridge_id {
            if self.bridge.is_alive(bridge_id).await {
                return Ok(bridge_id.clone());
            }
        }

        let bridge_id = self
            .bridge
            .start(
                &call_channel.asterisk_id,
                ReferenceType::Call,
                call.id,
                &[BridgeType::Mixing, BridgeType::ProxyMedia],
            )
            .await?;
        self.calls
            .call_set_bridge_id(call.id, Some(bridge_id.clone()))
            .await?;
        self.bridge
            .add_channel(&call_channel.asterisk_id, &bridge_id, &call_channel.id)
            .await?;
        Ok(bridge_id)
    }

    /// A confbridge channel entered the confbridge's bridge
    pub async fn joined(&self, channel: &Channel, bridge: &Bridge) -> Result<()> {
        let Some(id) = bridge.reference_id else {
            debug!("Bridge {} has no confbridge reference", bridge.id);
            return Ok(());
        };
        let call_id = channel.stasis_uuid("call_id")?;

        self.confbridges
            .confbridge_add_channel_call_id(id, &channel.id, call_id)
            .await?;
        self.calls.call_set_confbridge_id(call_id, Some(id)).await?;
        info!("Call {} joined confbridge {} with channel {}", call_id, id, channel.id);

        let confbridge = self.confbridges.confbridge_get(id).await?;
        self.publish(
            EventType::ConfbridgeJoined,
            json!({ "confbridge": snapshot(&confbridge), "joined_call_id": call_id }),
        );

        let call = self.calls.call_get(call_id).await?;
        let payload = snapshot(&call);
        self.notifier.publish_event(EventType::CallUpdated, payload.clone());
        self.notifier
            .notify_event(call.customer_id, EventType::CallUpdated, payload);
        Ok(())
    }
}
