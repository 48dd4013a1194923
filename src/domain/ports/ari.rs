//! Outbound command port towards the telephony nodes

use crate::domain::bridge::BridgeType;
use crate::domain::channel::{ChannelState, HangupCause};
use crate::domain::shared::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Parameters for originating a new channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OriginateRequest {
    /// Node the channel is created on
    pub asterisk_id: String,
    pub channel_id: String,
    /// Dial string, e.g. `PJSIP/call-out/sip:+15550001@trunk.example.com`
    pub endpoint: String,
    /// Stasis application arguments (`key=value,...`)
    pub app_args: String,
    pub variables: BTreeMap<String, String>,
    /// Dial timeout in seconds
    pub timeout: u32,
}

/// Commands issued to a telephony node
///
/// All commands are addressed by the owning node id. Callers treat them as
/// fire-and-forget unless the flow needs the result to continue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AriCommander: Send + Sync {
    async fn channel_answer(&self, asterisk_id: &str, channel_id: &str) -> Result<()>;

    /// Indicate ringing to the channel
    async fn channel_ring(&self, asterisk_id: &str, channel_id: &str) -> Result<()>;

    async fn channel_hangup(&self, asterisk_id: &str, channel_id: &str, cause: HangupCause) -> Result<()>;

    /// Ask the node for the channel; an error means it is unknown or unreachable
    async fn channel_get(&self, asterisk_id: &str, channel_id: &str) -> Result<ChannelState>;

    async fn channel_create(&self, request: &OriginateRequest) -> Result<()>;

    async fn channel_variable_set(
        &self,
        asterisk_id: &str,
        channel_id: &str,
        variable: &str,
        value: &str,
    ) -> Result<()>;

    async fn channel_play(
        &self,
        asterisk_id: &str,
        channel_id: &str,
        playback_id: &str,
        medias: &[String],
    ) -> Result<()>;

    async fn bridge_create(
        &self,
        asterisk_id: &str,
        bridge_id: &str,
        name: &str,
        types: &[BridgeType],
    ) -> Result<()>;

    async fn bridge_delete(&self, asterisk_id: &str, bridge_id: &str) -> Result<()>;

    async fn bridge_add_channel(&self, asterisk_id: &str, bridge_id: &str, channel_id: &str) -> Result<()>;

    async fn bridge_remove_channel(&self, asterisk_id: &str, bridge_id: &str, channel_id: &str) -> Result<()>;
}
