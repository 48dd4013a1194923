//! Departures from a call's join bridge

use super::CallHandler;
use crate::domain::bridge::Bridge;
use crate::domain::channel::{Channel, ChannelType, HangupCause, Tech};
use crate::domain::shared::Result;
use tracing::{debug, info};

impl CallHandler {
    /// A channel left a bridge that belongs to a call
    ///
    /// `bridge` is the state after the departure was recorded.
    pub async fn leave_bridge(&self, channel: &Channel, bridge: &Bridge) -> Result<()> {
        if channel.channel_type == ChannelType::Join {
            return self.leave_join_leg(channel, bridge).await;
        }

        if channel.channel_type == ChannelType::External || channel.tech == Tech::Snoop {
            if bridge.channel_ids.is_empty() {
                debug!("Bridge {} is empty, destroying it", bridge.id);
                self.bridge.destroy_quietly(&bridge.id).await;
            } else {
                self.bridge.remove_all_channels(bridge).await;
            }
            return Ok(());
        }

        self.channel
            .hangup_quietly(&channel.asterisk_id, &channel.id, HangupCause::NormalClearing)
            .await;
        for member in &bridge.channel_ids {
            self.channel
                .hangup_quietly(&bridge.asterisk_id, member, HangupCause::NormalClearing)
                .await;
        }
        Ok(())
    }

    /// The confbridge leg went away: the call leaves the conference and
    /// carries on with its flow
    async fn leave_join_leg(&self, channel: &Channel, bridge: &Bridge) -> Result<()> {
        self.channel
            .hangup_quietly(&channel.asterisk_id, &channel.id, HangupCause::NormalClearing)
            .await;

        let Some(call_id) = bridge.reference_id else {
            debug!("Bridge {} has no call reference", bridge.id);
            return Ok(());
        };
        let call = match self.calls.call_get(call_id).await {
            Ok(call) => call,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        if call.confbridge_id.is_some() {
            self.remove_confbridge(call_id).await?;
        }
        if call.status.is_tearing_down() {
            debug!("Call {} is {}, not continuing", call_id, call.status.as_str());
            return Ok(());
        }

        info!("Call {} left its conference, continuing the flow", call_id);
        self.action_next(call_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::super::tests::{fixture, quiet_notifier, seed_call};
    use super::*;
    use crate::domain::bridge::{bridge_name, BridgeRepository, ReferenceType};
    use crate::domain::call::{CallRepository, CallStatus};
    use crate::domain::ports::{MockAriCommander, MockServiceRequester};
    use uuid::Uuid;

    #[tokio::test]
    async fn test_join_leg_departure_continues_the_flow() {
        let mut ari = MockAriCommander::new();
        ari.expect_channel_hangup()
            .times(1)
            .withf(|_, id, _| id.to_string() == "j1")
            .returning(|_, _, _| Ok(()));
        let mut requester = MockServiceRequester::new();
        requester
            .expect_active_flow_action_next()
            .times(1)
            .returning(|_, _| {
                Ok(Some(crate::domain::call::Action::new(
                    crate::domain::call::ActionType::Play,
                    &serde_json::json!({"stream_urls": []}),
                )
                .unwrap()))
            });
        ari.expect_channel_play().times(1).returning(|_, _, _, _| Ok(()));

        let f = fixture(ari, requester, quiet_notifier());
        let call = seed_call(&f.store, "c1").await;
        f.store.call_set_flow(call.id, Uuid::new_v4(), Uuid::new_v4()).await.unwrap();
        f.store.call_set_confbridge_id(call.id, Some(Uuid::new_v4())).await.unwrap();

        let bridge = Bridge::new("b1", "node-1", bridge_name(ReferenceType::Call, call.id));
        f.store.bridge_create(&bridge).await.unwrap();
        let mut join = Channel::new("j1", "node-1", "PJSIP/conf-join-00000001");
        join.channel_type = ChannelType::Join;

        f.handler.leave_bridge(&join, &bridge).await.unwrap();

        let call = f.store.call_get(call.id).await.unwrap();
        assert!(call.confbridge_id.is_none());
    }

    #[tokio::test]
    async fn test_join_leg_departure_during_teardown() {
        let mut ari = MockAriCommander::new();
        ari.expect_channel_hangup().times(1).returning(|_, _, _| Ok(()));

        let f = fixture(ari, MockServiceRequester::new(), quiet_notifier());
        let call = seed_call(&f.store, "c1").await;
        f.store.call_set_status(call.id, CallStatus::Canceling).await.unwrap();

        let bridge = Bridge::new("b1", "node-1", bridge_name(ReferenceType::Call, call.id));
        let mut join = Channel::new("j1", "node-1", "PJSIP/conf-join-00000001");
        join.channel_type = ChannelType::Join;

        f.handler.leave_bridge(&join, &bridge).await.unwrap();
    }

    #[tokio::test]
    async fn test_snoop_departure_destroys_empty_bridge() {
        let mut ari = MockAriCommander::new();
        ari.expect_bridge_delete()
            .times(1)
            .withf(|_, id| id.to_string() == "b1")
            .returning(|_, _| Ok(()));

        let f = fixture(ari, MockServiceRequester::new(), quiet_notifier());
        let bridge = Bridge::new("b1", "node-1", bridge_name(ReferenceType::CallSnoop, Uuid::new_v4()));
        f.store.bridge_create(&bridge).await.unwrap();
        let snoop = Channel::new("s1", "node-1", "Snoop/c1-00000001");

        f.handler.leave_bridge(&snoop, &bridge).await.unwrap();
    }

    #[tokio::test]
    async fn test_external_departure_removes_remaining_members() {
        let mut ari = MockAriCommander::new();
        ari.expect_bridge_remove_channel()
            .times(1)
            .withf(|_, bridge_id, channel_id| {
                bridge_id.to_string() == "b1" && channel_id.to_string() == "c1"
            })
            .returning(|_, _, _| Ok(()));

        let f = fixture(ari, MockServiceRequester::new(), quiet_notifier());
        let mut bridge = Bridge::new("b1", "node-1", bridge_name(ReferenceType::Call, Uuid::new_v4()));
        bridge.channel_ids = vec!["c1".to_string()];
        let mut external = Channel::new("e1", "node-1", "UnicastRTP/127.0.0.1:5000-00000001");
        external.channel_type = ChannelType::External;

        f.handler.leave_bridge(&external, &bridge).await.unwrap();
    }

    #[tokio::test]
    async fn test_call_channel_departure_hangs_up_everyone() {
        let mut ari = MockAriCommander::new();
        ari.expect_channel_hangup()
            .times(2)
            .withf(|_, id, _| id.to_string() == "c1" || id.to_string() == "j1")
            .returning(|_, _, _| Ok(()));

        let f = fixture(ari, MockServiceRequester::new(), quiet_notifier());
        let mut bridge = Bridge::new("b1", "node-1", bridge_name(ReferenceType::Call, Uuid::new_v4()));
        bridge.channel_ids = vec!["j1".to_string()];
        let mut channel = Channel::new("c1", "node-1", "PJSIP/call-in-00000001");
        channel.channel_type = ChannelType::Call;

        f.handler.leave_bridge(&channel, &bridge).await.unwrap();
    }
}
