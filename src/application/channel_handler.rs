//! Channel lifecycle
//!
//! Mirrors channel events into the store and issues channel-level commands.

use crate::domain::call_quality::RtpStat;
use crate::domain::channel::{
    Channel, ChannelDirection, ChannelRepository, ChannelState, ChannelType, DataKey, HangupCause,
    VARIABLE_PREFIX,
};
use crate::domain::ports::AriCommander;
use crate::domain::shared::Result;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Variable carrying the call quality report
pub const RTP_STAT_VARIABLE: &str = "CC-RTP_STAT";

pub struct ChannelHandler {
    channels: Arc<dyn ChannelRepository>,
    ari: Arc<dyn AriCommander>,
    exist_timeout: Duration,
}

impl ChannelHandler {
    pub fn new(
        channels: Arc<dyn ChannelRepository>,
        ari: Arc<dyn AriCommander>,
        exist_timeout: Duration,
    ) -> Self {
        Self {
            channels,
            ari,
            exist_timeout,
        }
    }

    pub async fn create(&self, channel: &Channel) -> Result<()> {
        self.channels.channel_create(channel).await?;
        info!(
            "Created channel {} ({}) on {}",
            channel.id, channel.name, channel.asterisk_id
        );
        Ok(())
    }

    pub async fn get(&self, id: &str) -> Result<Channel> {
        self.channels.channel_get(id).await
    }

    /// Wait for the channel record to be committed
    pub async fn is_exist(&self, id: &str) -> bool {
        self.channels.channel_is_exist(id, self.exist_timeout).await
    }

    pub async fn update_state(
        &self,
        id: &str,
        state: ChannelState,
        timestamp: DateTime<Utc>,
    ) -> Result<Channel> {
        self.channels.channel_set_state(id, state, timestamp).await?;
        self.channels.channel_get(id).await
    }

    /// Apply a session variable through the varset table
    ///
    /// Variables outside the reserved namespace are ignored.
    pub async fn set_variable(&self, id: &str, variable: &str, value: &str) -> Result<()> {
        if variable == RTP_STAT_VARIABLE {
            return match RtpStat::parse(value) {
                Some(stat) => self.channels.channel_set_rtp_stat(id, stat).await,
                None => {
                    debug!("Unparseable quality report on channel {}: {}", id, value);
                    Ok(())
                }
            };
        }

        let Some(key) = DataKey::from_variable(variable) else {
            if variable.starts_with(VARIABLE_PREFIX) {
                debug!("Ignoring unknown variable {} on channel {}", variable, id);
            }
            return Ok(());
        };

        self.channels.channel_set_data_item(id, key, value).await?;
        match key {
            DataKey::Type => {
                self.channels
                    .channel_set_type(id, ChannelType::parse(value))
                    .await
            }
            DataKey::Direction => {
                self.channels
                    .channel_set_direction(id, ChannelDirection::parse(value))
                    .await
            }
            DataKey::SipCallId => self.channels.channel_set_sip_call_id(id, value).await,
            DataKey::SipTransport => self.channels.channel_set_sip_transport(id, value).await,
            DataKey::Context | DataKey::SipPai | DataKey::SipPrivacy => Ok(()),
        }
    }

    pub async fn set_type(&self, id: &str, channel_type: ChannelType) -> Result<()> {
        self.channels.channel_set_type(id, channel_type).await
    }

    pub async fn set_stasis(
        &self,
        id: &str,
        name: &str,
        args: BTreeMap<String, String>,
    ) -> Result<Channel> {
        self.channels.channel_set_stasis(id, name, args).await?;
        self.channels.channel_get(id).await
    }

    pub async fn clear_stasis(&self, id: &str) -> Result<()> {
        self.channels.channel_set_stasis(id, "", BTreeMap::new()).await
    }

    pub async fn set_bridge_id(&self, id: &str, bridge_id: Option<String>) -> Result<()> {
        self.channels.channel_set_bridge_id(id, bridge_id).await
    }

    pub async fn set_playback_id(&self, id: &str, playback_id: Option<String>) -> Result<()> {
        self.channels.channel_set_playback_id(id, playback_id).await
    }

    /// Record the channel's end and soft-delete it
    pub async fn end(&self, id: &str, cause: HangupCause, timestamp: DateTime<Utc>) -> Result<Channel> {
        self.channels.channel_set_hangup(id, cause, timestamp).await?;
        self.channels.channel_delete(id, timestamp).await?;
        self.channels.channel_get(id).await
    }

    /// Ask the node to hang the channel up
    pub async fn hangup(&self, asterisk_id: &str, id: &str, cause: HangupCause) -> Result<()> {
        info!("Hanging up channel {} with cause {:?}", id, cause);
        self.ari.channel_hangup(asterisk_id, id, cause).await
    }

    /// Hangup that only logs failures
    pub async fn hangup_quietly(&self, asterisk_id: &str, id: &str, cause: HangupCause) {
        if let Err(e) = self.hangup(asterisk_id, id, cause).await {
            warn!("Could not hang up channel {}: {}", id, e);
        }
    }

    /// Hang up a channel known to the store, unless it already ended
    pub async fn hangup_by_id(&self, id: &str, cause: HangupCause) -> Result<()> {
        let channel = self.channels.channel_get(id).await?;
        if channel.is_ended() {
            debug!("Channel {} already ended", id);
            return Ok(());
        }
        self.hangup(&channel.asterisk_id, id, cause).await
    }

    pub async fn answer(&self, channel: &Channel) -> Result<()> {
        self.ari.channel_answer(&channel.asterisk_id, &channel.id).await
    }

    pub async fn ring(&self, channel: &Channel) -> Result<()> {
        self.ari.channel_ring(&channel.asterisk_id, &channel.id).await
    }

    /// Whether the node still knows the channel
    pub async fn probe(&self, channel: &Channel) -> bool {
        self.ari
            .channel_get(&channel.asterisk_id, &channel.id)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::MockAriCommander;
    use crate::domain::shared::DomainError;
    use crate::infrastructure::persistence::MemoryStore;

    async fn setup(ari: MockAriCommander) -> (ChannelHandler, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store
            .channel_create(&Channel::new("c1", "node-1", "PJSIP/call-in-00000001"))
            .await
            .unwrap();
        let handler = ChannelHandler::new(store.clone(), Arc::new(ari), Duration::from_millis(50));
        (handler, store)
    }

    #[tokio::test]
    async fn test_varset_table() {
        let (handler, store) = setup(MockAriCommander::new()).await;

        handler.set_variable("c1", "CC-TYPE", "confbridge").await.unwrap();
        handler.set_variable("c1", "CC-DIRECTION", "incoming").await.unwrap();
        handler.set_variable("c1", "CC-SIP_CALLID", "abc@host").await.unwrap();
        handler.set_variable("c1", "CC-SIP_TRANSPORT", "udp").await.unwrap();
        handler.set_variable("c1", "CC-SIP_PAI", "<sip:+1555@host>").await.unwrap();
        handler.set_variable("c1", "CC-CONTEXT", "call-in").await.unwrap();

        let channel = store.channel_get("c1").await.unwrap();
        assert_eq!(channel.channel_type, ChannelType::Confbridge);
        assert_eq!(channel.direction, ChannelDirection::Incoming);
        assert_eq!(channel.sip_call_id, "abc@host");
        assert_eq!(channel.sip_transport, "udp");
        assert_eq!(channel.data.get(DataKey::SipPai), Some("<sip:+1555@host>"));
        assert_eq!(channel.data.get(DataKey::Context), Some("call-in"));
    }

    #[tokio::test]
    async fn test_varset_ignores_unknown_keys() {
        let (handler, store) = setup(MockAriCommander::new()).await;

        handler.set_variable("c1", "CC-UNKNOWN", "x").await.unwrap();
        handler.set_variable("c1", "CDR(billsec)", "10").await.unwrap();
        // unknown keys never touch the store, even for missing channels
        handler.set_variable("nope", "CC-UNKNOWN", "x").await.unwrap();

        assert!(store.channel_get("c1").await.unwrap().data.is_empty());
    }

    #[tokio::test]
    async fn test_varset_rtp_stat() {
        let (handler, store) = setup(MockAriCommander::new()).await;

        handler
            .set_variable("c1", RTP_STAT_VARIABLE, "MOS=4.1;Jitter=3;PacketLossPct=0;RTT=20")
            .await
            .unwrap();
        let stat = store.channel_get("c1").await.unwrap().rtp_stat.unwrap();
        assert_eq!(stat.jitter, 3);

        handler.set_variable("c1", RTP_STAT_VARIABLE, "   ").await.unwrap();
        assert!(store.channel_get("c1").await.unwrap().rtp_stat.is_some());
    }

    #[tokio::test]
    async fn test_varset_missing_channel() {
        let (handler, _) = setup(MockAriCommander::new()).await;
        let err = handler.set_variable("nope", "CC-TYPE", "call").await.unwrap_err();
        assert!(matches!(err, DomainError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_state_sets_timestamps() {
        let (handler, _) = setup(MockAriCommander::new()).await;
        let now = Utc::now();

        let channel = handler.update_state("c1", ChannelState::Ringing, now).await.unwrap();
        assert_eq!(channel.tm_ringing, Some(now));
        assert!(channel.tm_answer.is_none());

        let channel = handler.update_state("c1", ChannelState::Up, now).await.unwrap();
        assert_eq!(channel.state, ChannelState::Up);
        assert_eq!(channel.tm_answer, Some(now));
    }

    #[tokio::test]
    async fn test_end_records_cause_once() {
        let (handler, _) = setup(MockAriCommander::new()).await;
        let now = Utc::now();

        let channel = handler.end("c1", HangupCause::NormalClearing, now).await.unwrap();
        assert_eq!(channel.hangup_cause, HangupCause::NormalClearing);
        assert!(channel.is_ended());
        assert!(channel.tm_delete.is_some());

        let channel = handler.end("c1", HangupCause::Interworking, Utc::now()).await.unwrap();
        assert_eq!(channel.hangup_cause, HangupCause::NormalClearing);
        assert_eq!(channel.tm_end, Some(now));
    }

    #[tokio::test]
    async fn test_hangup_by_id_skips_ended_channels() {
        let mut ari = MockAriCommander::new();
        ari.expect_channel_hangup()
            .times(1)
            .withf(|asterisk_id, id, cause| {
                asterisk_id.to_string() == "node-1"
                    && id.to_string() == "c1"
                    && *cause == HangupCause::Interworking
            })
            .returning(|_, _, _| Ok(()));
        let (handler, _) = setup(ari).await;

        handler.hangup_by_id("c1", HangupCause::Interworking).await.unwrap();
        handler.end("c1", HangupCause::NormalClearing, Utc::now()).await.unwrap();
        handler.hangup_by_id("c1", HangupCause::Interworking).await.unwrap();
    }
}
