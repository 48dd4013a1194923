//! Confbridge coordinator
//!
//! A confbridge is backed by one bridge on one node. Calls living on other
//! nodes join by dialing back into that node: the call's own join bridge
//! holds the call channel and the dial-back leg, and the far end of that leg
//! lands in the confbridge's bridge.

mod join;
mod leave;

use crate::application::bridge_handler::BridgeHandler;
use crate::application::channel_handler::ChannelHandler;
use crate::domain::call::CallRepository;
use crate::domain::channel::{Channel, ChannelType, HangupCause};
use crate::domain::confbridge::{Confbridge, ConfbridgeRepository, ConfbridgeType};
use crate::domain::ports::{snapshot, AriCommander, Notifier, ServiceRequester};
use crate::domain::shared::{DomainError, EventType, Result};
use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct ConfbridgeHandler {
    confbridges: Arc<dyn ConfbridgeRepository>,
    calls: Arc<dyn CallRepository>,
    channel: Arc<ChannelHandler>,
    bridge: Arc<BridgeHandler>,
    ari: Arc<dyn AriCommander>,
    requester: Arc<dyn ServiceRequester>,
    notifier: Arc<dyn Notifier>,
}

impl ConfbridgeHandler {
    pub fn new(
        confbridges: Arc<dyn ConfbridgeRepository>,
        calls: Arc<dyn CallRepository>,
        channel: Arc<ChannelHandler>,
        bridge: Arc<BridgeHandler>,
        ari: Arc<dyn AriCommander>,
        requester: Arc<dyn ServiceRequester>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            confbridges,
            calls,
            channel,
            bridge,
            ari,
            requester,
            notifier,
        }
    }

    pub async fn create(&self, customer_id: Uuid, confbridge_type: ConfbridgeType) -> Result<Confbridge> {
        let confbridge = Confbridge::new(customer_id, confbridge_type);
        self.confbridges.confbridge_create(&confbridge).await?;
        info!("Created {:?} confbridge {}", confbridge_type, confbridge.id);

        self.publish(EventType::ConfbridgeCreated, json!({ "confbridge": snapshot(&confbridge) }));
        Ok(confbridge)
    }

    pub async fn get(&self, id: Uuid) -> Result<Confbridge> {
        self.confbridges.confbridge_get(id).await
    }

    /// Hang up the member channel representing the call
    pub async fn kick(&self, id: Uuid, call_id: Uuid) -> Result<()> {
        let confbridge = self.confbridges.confbridge_get(id).await?;
        let channel_id = confbridge.channel_id_of(call_id).ok_or_else(|| {
            DomainError::NotFound(format!("call {} in confbridge {}", call_id, id))
        })?;

        info!("Kicking call {} out of confbridge {}", call_id, id);
        self.channel
            .hangup_by_id(channel_id, HangupCause::NormalClearing)
            .await
    }

    /// Hang up every member, destroy the bridge and delete the confbridge
    pub async fn terminate(&self, id: Uuid) -> Result<()> {
        let confbridge = self.confbridges.confbridge_get(id).await?;
        if confbridge.tm_delete.is_some() {
            debug!("Confbridge {} is already terminated", id);
            return Ok(());
        }

        for channel_id in confbridge.channel_call_ids.keys() {
            if let Err(e) = self
                .channel
                .hangup_by_id(channel_id, HangupCause::NormalClearing)
                .await
            {
                warn!("Could not hang up member {} of confbridge {}: {}", channel_id, id, e);
            }
        }

        if let Some(bridge_id) = &confbridge.bridge_id {
            self.bridge.destroy_quietly(bridge_id).await;
        }

        self.confbridges.confbridge_delete(id, Utc::now()).await?;
        info!("Terminated confbridge {}", id);

        let confbridge = self.confbridges.confbridge_get(id).await?;
        self.publish(EventType::ConfbridgeDeleted, json!({ "confbridge": snapshot(&confbridge) }));
        Ok(())
    }

    /// A channel dialed in to join a confbridge on this node
    ///
    /// A conference answers right away. A connect session rings the first
    /// party and answers everyone once the second one arrives.
    pub async fn start_context_incoming(&self, channel: &Channel) -> Result<()> {
        let id = channel.stasis_uuid("confbridge_id")?;
        let confbridge = self.confbridges.confbridge_get(id).await?;
        let bridge_id = confbridge.bridge_id.as_deref().ok_or_else(|| {
            DomainError::InvalidOperation(format!("confbridge {} has no bridge", id))
        })?;

        self.channel
            .set_type(&channel.id, ChannelType::Confbridge)
            .await?;
        self.bridge
            .add_channel(&channel.asterisk_id, bridge_id, &channel.id)
            .await?;

        match confbridge.confbridge_type {
            ConfbridgeType::Conference => self.channel.answer(channel).await,
            ConfbridgeType::Connect if confbridge.member_count() == 0 => {
                debug!("First party of confbridge {}, ringing", id);
                self.channel.ring(channel).await
            }
            ConfbridgeType::Connect => {
                for member_id in confbridge.channel_call_ids.keys() {
                    match self.channel.get(member_id).await {
                        Ok(member) => {
                            if let Err(e) = self.channel.answer(&member).await {
                                warn!("Could not answer member {} of confbridge {}: {}", member_id, id, e);
                            }
                        }
                        Err(e) => warn!("Member {} of confbridge {} is gone: {}", member_id, id, e),
                    }
                }
                self.channel.answer(channel).await
            }
        }
    }

    pub async fn recording_started(&self, id: Uuid, recording_id: Uuid) -> Result<()> {
        self.confbridges
            .confbridge_set_recording_id(id, Some(recording_id))
            .await?;
        let confbridge = self.confbridges.confbridge_get(id).await?;
        self.publish(EventType::RecordingStarted, json!({ "confbridge": snapshot(&confbridge) }));
        Ok(())
    }

    pub async fn recording_finished(&self, id: Uuid) -> Result<()> {
        self.confbridges.confbridge_set_recording_id(id, None).await?;
        let confbridge = self.confbridges.confbridge_get(id).await?;
        self.publish(EventType::RecordingFinished, json!({ "confbridge": snapshot(&confbridge) }));
        Ok(())
    }

    fn publish(&self, event_type: EventType, payload: serde_json::Value) {
        self.notifier.publish_event(event_type, payload);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::bridge::{Bridge, BridgeRepository};
    use crate::domain::channel::{parse_stasis_args, ChannelRepository};
    use crate::domain::ports::{MockAriCommander, MockNotifier, MockServiceRequester};
    use crate::infrastructure::persistence::MemoryStore;
    use std::time::Duration;

    pub(crate) struct Fixture {
        pub store: Arc<MemoryStore>,
        pub handler: ConfbridgeHandler,
    }

    pub(crate) fn quiet_notifier() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_publish_event().returning(|_, _| ());
        notifier.expect_notify_event().returning(|_, _, _| ());
        notifier
    }

    pub(crate) fn fixture(ari: MockAriCommander, requester: MockServiceRequester) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let ari: Arc<dyn AriCommander> = Arc::new(ari);
        let channel = Arc::new(ChannelHandler::new(
            store.clone(),
            ari.clone(),
            Duration::from_millis(50),
        ));
        let bridge = Arc::new(
            BridgeHandler::new(store.clone(), ari.clone())
                .with_exist_timeout(Duration::from_millis(200)),
        );
        let handler = ConfbridgeHandler::new(
            store.clone(),
            store.clone(),
            channel,
            bridge,
            ari,
            Arc::new(requester),
            Arc::new(quiet_notifier()),
        );
        Fixture { store, handler }
    }

    /// Confbridge with a bridge and the given member channels
    pub(crate) async fn seed_confbridge(
        f: &Fixture,
        confbridge_type: ConfbridgeType,
        members: &[&str],
    ) -> (Confbridge, Vec<Uuid>) {
        let confbridge = f
            .handler
            .create(Uuid::new_v4(), confbridge_type)
            .await
            .unwrap();
        f.store
            .confbridge_set_bridge_id(confbridge.id, Some("b1".to_string()))
            .await
            .unwrap();

        let mut call_ids = Vec::new();
        for member in members {
            f.store
                .channel_create(&Channel::new(*member, "node-1", "PJSIP/conf-join-00000001"))
                .await
                .unwrap();
            let call_id = Uuid::new_v4();
            f.store
                .confbridge_add_channel_call_id(confbridge.id, member, call_id)
                .await
                .unwrap();
            call_ids.push(call_id);
        }
        (f.store.confbridge_get(confbridge.id).await.unwrap(), call_ids)
    }

    fn dialed_in(id: &str, confbridge_id: Uuid) -> Channel {
        let mut channel = Channel::new(id, "node-1", "PJSIP/conf-in-00000001");
        channel.stasis_data =
            parse_stasis_args(&[format!("context=conf-in,confbridge_id={}", confbridge_id)]);
        channel
    }

    #[tokio::test]
    async fn test_kick_unknown_member_is_not_found() {
        let f = fixture(MockAriCommander::new(), MockServiceRequester::new());
        let (confbridge, _) = seed_confbridge(&f, ConfbridgeType::Conference, &[]).await;

        let err = f.handler.kick(confbridge.id, Uuid::new_v4()).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_kick_hangs_up_the_member_channel() {
        let mut ari = MockAriCommander::new();
        ari.expect_channel_hangup()
            .times(1)
            .withf(|_, id, _| id.to_string() == "m1")
            .returning(|_, _, _| Ok(()));
        let f = fixture(ari, MockServiceRequester::new());
        let (confbridge, calls) = seed_confbridge(&f, ConfbridgeType::Conference, &["m1", "m2"]).await;

        f.handler.kick(confbridge.id, calls[0]).await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_hangs_up_members_and_tolerates_bridge_failure() {
        let mut ari = MockAriCommander::new();
        ari.expect_channel_hangup().times(2).returning(|_, _, _| Ok(()));
        ari.expect_bridge_delete()
            .returning(|_, _| Err(DomainError::Upstream("gone".to_string())));
        let f = fixture(ari, MockServiceRequester::new());
        let (confbridge, _) = seed_confbridge(&f, ConfbridgeType::Conference, &["m1", "m2"]).await;
        f.store
            .bridge_create(&Bridge::new("b1", "node-1", ""))
            .await
            .unwrap();

        f.handler.terminate(confbridge.id).await.unwrap();
        assert!(f.store.confbridge_get(confbridge.id).await.unwrap().tm_delete.is_some());

        // second terminate is a no-op
        f.handler.terminate(confbridge.id).await.unwrap();
    }

    #[tokio::test]
    async fn test_first_connect_party_rings() {
        let mut ari = MockAriCommander::new();
        ari.expect_bridge_add_channel()
            .times(1)
            .withf(|_, bridge_id, channel_id| bridge_id.to_string() == "b1" && channel_id.to_string() == "x1")
            .returning(|_, _, _| Ok(()));
        ari.expect_channel_ring().times(1).returning(|_, _| Ok(()));
        let f = fixture(ari, MockServiceRequester::new());
        let (confbridge, _) = seed_confbridge(&f, ConfbridgeType::Connect, &[]).await;

        let channel = dialed_in("x1", confbridge.id);
        f.store.channel_create(&channel).await.unwrap();
        f.handler.start_context_incoming(&channel).await.unwrap();

        let channel = f.store.channel_get("x1").await.unwrap();
        assert_eq!(channel.channel_type, ChannelType::Confbridge);
    }

    #[tokio::test]
    async fn test_second_connect_party_answers_everyone() {
        let mut ari = MockAriCommander::new();
        ari.expect_bridge_add_channel().returning(|_, _, _| Ok(()));
        ari.expect_channel_answer()
            .times(2)
            .withf(|_, id| id.to_string() == "m1" || id.to_string() == "x2")
            .returning(|_, _| Ok(()));
        let f = fixture(ari, MockServiceRequester::new());
        let (confbridge, _) = seed_confbridge(&f, ConfbridgeType::Connect, &["m1"]).await;

        let channel = dialed_in("x2", confbridge.id);
        f.store.channel_create(&channel).await.unwrap();
        f.handler.start_context_incoming(&channel).await.unwrap();
    }

    #[tokio::test]
    async fn test_conference_answers_right_away() {
        let mut ari = MockAriCommander::new();
        ari.expect_bridge_add_channel().returning(|_, _, _| Ok(()));
        ari.expect_channel_answer()
            .times(1)
            .withf(|_, id| id.to_string() == "x1")
            .returning(|_, _| Ok(()));
        let f = fixture(ari, MockServiceRequester::new());
        let (confbridge, _) = seed_confbridge(&f, ConfbridgeType::Conference, &[]).await;

        let channel = dialed_in("x1", confbridge.id);
        f.store.channel_create(&channel).await.unwrap();
        f.handler.start_context_incoming(&channel).await.unwrap();
    }

    #[tokio::test]
    async fn test_recording_keeps_history() {
        let f = fixture(MockAriCommander::new(), MockServiceRequester::new());
        let (confbridge, _) = seed_confbridge(&f, ConfbridgeType::Conference, &[]).await;
        let recording_id = Uuid::new_v4();

        f.handler.recording_started(confbridge.id, recording_id).await.unwrap();
        f.handler.recording_finished(confbridge.id).await.unwrap();

        let confbridge = f.store.confbridge_get(confbridge.id).await.unwrap();
        assert!(confbridge.recording_id.is_none());
        assert_eq!(confbridge.recording_ids, vec![recording_id]);
    }
}
