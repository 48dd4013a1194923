//! Channel repository interface

use super::data::DataKey;
use super::entity::Channel;
use super::value_object::{ChannelDirection, ChannelState, ChannelType, HangupCause};
use crate::domain::call_quality::RtpStat;
use crate::domain::shared::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

/// Store contract for Channel records
///
/// Setters are safe to repeat; a missing record yields `DomainError::NotFound`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    async fn channel_create(&self, channel: &Channel) -> Result<()>;

    async fn channel_get(&self, id: &str) -> Result<Channel>;

    /// Poll for a channel record until it exists or the timeout elapses
    async fn channel_is_exist(&self, id: &str, timeout: Duration) -> bool;

    async fn channel_set_state(&self, id: &str, state: ChannelState, timestamp: DateTime<Utc>) -> Result<()>;

    async fn channel_set_data_item(&self, id: &str, key: DataKey, value: &str) -> Result<()>;

    async fn channel_set_type(&self, id: &str, channel_type: ChannelType) -> Result<()>;

    async fn channel_set_direction(&self, id: &str, direction: ChannelDirection) -> Result<()>;

    async fn channel_set_sip_call_id(&self, id: &str, sip_call_id: &str) -> Result<()>;

    async fn channel_set_sip_transport(&self, id: &str, transport: &str) -> Result<()>;

    async fn channel_set_stasis(&self, id: &str, name: &str, data: BTreeMap<String, String>) -> Result<()>;

    async fn channel_set_bridge_id(&self, id: &str, bridge_id: Option<String>) -> Result<()>;

    async fn channel_set_playback_id(&self, id: &str, playback_id: Option<String>) -> Result<()>;

    async fn channel_set_rtp_stat(&self, id: &str, stat: RtpStat) -> Result<()>;

    /// Record the channel's end; sets `tm_end` and the hangup cause
    async fn channel_set_hangup(&self, id: &str, cause: HangupCause, timestamp: DateTime<Utc>) -> Result<()>;

    async fn channel_delete(&self, id: &str, timestamp: DateTime<Utc>) -> Result<()>;
}
