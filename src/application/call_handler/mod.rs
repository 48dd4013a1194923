//! Call handler
//!
//! Owns the call record. Status follows the node's channel state through the
//! call FSM, hangup is computed once when the channel ends, and flow actions
//! are pulled from the flow service one at a time.
//!
//! - [`start`]: incoming routing and stasis entry points
//! - [`outgoing`]: outgoing call creation
//! - [`action`]: flow action execution
//! - [`bridge`]: join bridge departures

mod action;
mod bridge;
mod outgoing;
mod start;

use crate::application::bridge_handler::BridgeHandler;
use crate::application::channel_handler::ChannelHandler;
use crate::application::confbridge_handler::ConfbridgeHandler;
use crate::config::RoutingConfig;
use crate::domain::call::{Call, CallRepository, CallStatus};
use crate::domain::channel::{Channel, HangupCause};
use crate::domain::ports::{snapshot, AriCommander, Notifier, ServiceRequester};
use crate::domain::shared::{EventType, Result};
use crate::infrastructure::metrics::Metrics;
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

pub struct CallHandler {
    calls: Arc<dyn CallRepository>,
    channel: Arc<ChannelHandler>,
    bridge: Arc<BridgeHandler>,
    confbridge: Arc<ConfbridgeHandler>,
    ari: Arc<dyn AriCommander>,
    requester: Arc<dyn ServiceRequester>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
    routing: RoutingConfig,
    health_delay: Duration,
}

impl CallHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        calls: Arc<dyn CallRepository>,
        channel: Arc<ChannelHandler>,
        bridge: Arc<BridgeHandler>,
        confbridge: Arc<ConfbridgeHandler>,
        ari: Arc<dyn AriCommander>,
        requester: Arc<dyn ServiceRequester>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            calls,
            channel,
            bridge,
            confbridge,
            ari,
            requester,
            notifier,
            metrics: Metrics::noop(),
            routing: RoutingConfig::default(),
            health_delay: Duration::from_secs(10),
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_routing(mut self, routing: RoutingConfig) -> Self {
        self.routing = routing;
        self
    }

    /// Delay before the first health probe of a new call
    pub fn with_health_delay(mut self, delay: Duration) -> Self {
        self.health_delay = delay;
        self
    }

    pub async fn get(&self, id: Uuid) -> Result<Call> {
        self.calls.call_get(id).await
    }

    pub async fn gets(
        &self,
        customer_id: Uuid,
        size: usize,
        token: Option<DateTime<Utc>>,
    ) -> Result<Vec<Call>> {
        self.calls.call_gets(customer_id, size, token).await
    }

    /// Live call owning the channel, if any
    pub async fn get_by_channel(&self, channel_id: &str) -> Result<Option<Call>> {
        match self.calls.call_get_by_channel_id(channel_id).await {
            Ok(call) => Ok(Some(call)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Follow the channel's state with the call status
    pub async fn update_status(&self, channel: &Channel) -> Result<()> {
        let Some(call) = self.get_by_channel(&channel.id).await? else {
            return Ok(());
        };

        let status = CallStatus::from_channel_state(channel.state);
        if !call.status.can_transition_to(status) {
            debug!(
                "Call {} stays {} on channel state {:?}",
                call.id,
                call.status.as_str(),
                channel.state
            );
            return Ok(());
        }

        self.calls.call_set_status(call.id, status).await?;
        let call = self.calls.call_get(call.id).await?;
        info!("Call {} is {}", call.id, call.status.as_str());

        let event_type = match status {
            CallStatus::Ringing => EventType::CallRinging,
            CallStatus::Progressing => EventType::CallProgressing,
            _ => EventType::CallUpdated,
        };
        self.notify(event_type, &call);
        Ok(())
    }

    /// Settle the call after its channel has ended
    ///
    /// Runs once per call: the outcome is derived from the last status, the
    /// chained calls are torn down and the call is soft-deleted.
    pub async fn hangup(&self, channel: &Channel) -> Result<()> {
        let Some(call) = self.get_by_channel(&channel.id).await? else {
            debug!("No call for ended channel {}", channel.id);
            return Ok(());
        };
        debug!("Channel {} of call {} ended with {:?}", channel.id, call.id, channel.hangup_cause);
        self.settle(call).await
    }

    /// Store the hangup outcome and release everything the call holds
    pub(crate) async fn settle(&self, call: Call) -> Result<()> {
        if call.is_hungup() {
            return Ok(());
        }

        let reason = call.status.hangup_reason();
        let by = call.status.hangup_by();
        self.calls.call_set_hangup(call.id, reason, by).await?;
        info!("Call {} hung up: reason {}, by {:?}", call.id, reason.as_str(), by);

        for chained_call_id in &call.chained_call_ids {
            if let Err(e) = self
                .hanging_up(*chained_call_id, HangupCause::NormalClearing)
                .await
            {
                warn!("Could not hang up chained call {}: {}", chained_call_id, e);
            }
        }

        if let Some(master_call_id) = call.master_call_id {
            if let Err(e) = self
                .calls
                .call_remove_chained_call_id(master_call_id, call.id)
                .await
            {
                warn!("Could not detach call {} from {}: {}", call.id, master_call_id, e);
            }
        }

        if let Some(bridge_id) = &call.bridge_id {
            self.bridge.destroy_quietly(bridge_id).await;
        }

        self.calls.call_delete(call.id).await?;
        self.metrics.call_hungup(reason.as_str());

        let call = self.calls.call_get(call.id).await?;
        self.notify(EventType::CallHangup, &call);
        Ok(())
    }

    /// Tear the call down from our side
    ///
    /// The call moves to Canceling or Terminating and its channel is hung up;
    /// the final hangup happens once the node reports the channel's end.
    pub async fn hanging_up(&self, id: Uuid, cause: HangupCause) -> Result<()> {
        let call = self.calls.call_get(id).await?;
        if call.is_hungup() {
            return Ok(());
        }

        if !call.status.is_tearing_down() {
            self.calls
                .call_set_status(id, call.status.teardown_status())
                .await?;
        }

        match self.channel.hangup_by_id(&call.channel_id, cause).await {
            Err(e) if e.is_not_found() => {
                debug!("Channel {} of call {} is gone", call.channel_id, id);
                Ok(())
            }
            other => other,
        }
    }

    /// Hang up and only log a failure
    pub(crate) async fn hanging_up_quietly(&self, id: Uuid, cause: HangupCause) {
        if let Err(e) = self.hanging_up(id, cause).await {
            warn!("Could not hang up call {}: {}", id, e);
        }
    }

    /// Clear the call's conference membership
    pub async fn remove_confbridge(&self, id: Uuid) -> Result<()> {
        self.calls.call_set_confbridge_id(id, None).await?;
        let call = self.calls.call_get(id).await?;
        self.notify(EventType::CallUpdated, &call);
        Ok(())
    }

    pub async fn dtmf_received(&self, channel: &Channel, digit: &str, duration_ms: i64) -> Result<()> {
        let Some(call) = self.get_by_channel(&channel.id).await? else {
            return Ok(());
        };
        debug!("Call {} received dtmf {}", call.id, digit);

        let payload = json!({
            "call_id": call.id,
            "digit": digit,
            "duration": duration_ms,
        });
        self.notifier
            .publish_event(EventType::CallDtmfReceived, payload.clone());
        self.notifier
            .notify_event(call.customer_id, EventType::CallDtmfReceived, payload);
        Ok(())
    }

    /// Continue the flow once the playback started by the current action ends
    pub async fn playback_finished(&self, channel: &Channel, playback_id: &str) -> Result<()> {
        let Some(call) = self.get_by_channel(&channel.id).await? else {
            return Ok(());
        };

        let current = call.current_action_id().map(|id| id.to_string());
        if current.as_deref() != Some(playback_id) {
            debug!(
                "Playback {} on call {} does not belong to the current action",
                playback_id, call.id
            );
            return Ok(());
        }
        self.action_next(call.id).await
    }

    pub async fn recording_started(&self, id: Uuid, recording_id: Uuid) -> Result<()> {
        self.calls.call_set_recording_id(id, Some(recording_id)).await?;
        let call = self.calls.call_get(id).await?;
        self.notify(EventType::RecordingStarted, &call);
        Ok(())
    }

    pub async fn recording_finished(&self, id: Uuid) -> Result<()> {
        self.calls.call_set_recording_id(id, None).await?;
        let call = self.calls.call_get(id).await?;
        self.notify(EventType::RecordingFinished, &call);
        Ok(())
    }

    /// Publish internally and deliver to the call's customer
    fn notify(&self, event_type: EventType, call: &Call) {
        let payload = snapshot(call);
        self.notifier.publish_event(event_type, payload.clone());
        self.notifier.notify_event(call.customer_id, event_type, payload);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::domain::call::{CallDirection, CallType, HangupBy, HangupReason};
    use crate::domain::channel::{ChannelRepository, ChannelState};
    use crate::domain::ports::{MockAriCommander, MockNotifier, MockServiceRequester};
    use crate::domain::shared::{Address, AddressType};
    use crate::infrastructure::persistence::MemoryStore;

    pub(crate) struct Fixture {
        pub store: Arc<MemoryStore>,
        pub channel: Arc<ChannelHandler>,
        pub handler: CallHandler,
    }

    pub(crate) fn quiet_notifier() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_publish_event().returning(|_, _| ());
        notifier.expect_notify_event().returning(|_, _, _| ());
        notifier
    }

    pub(crate) fn fixture(
        ari: MockAriCommander,
        requester: MockServiceRequester,
        notifier: MockNotifier,
    ) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let ari: Arc<dyn AriCommander> = Arc::new(ari);
        let requester: Arc<dyn ServiceRequester> = Arc::new(requester);
        let notifier: Arc<dyn Notifier> = Arc::new(notifier);

        let channel = Arc::new(ChannelHandler::new(
            store.clone(),
            ari.clone(),
            Duration::from_millis(50),
        ));
        let bridge = Arc::new(BridgeHandler::new(store.clone(), ari.clone()));
        let confbridge = Arc::new(ConfbridgeHandler::new(
            store.clone(),
            store.clone(),
            channel.clone(),
            bridge.clone(),
            ari.clone(),
            requester.clone(),
            notifier.clone(),
        ));
        let handler = CallHandler::new(
            store.clone(),
            channel.clone(),
            bridge,
            confbridge,
            ari,
            requester,
            notifier,
        )
        .with_health_delay(Duration::from_millis(10));

        Fixture {
            store,
            channel,
            handler,
        }
    }

    pub(crate) async fn seed_call(store: &MemoryStore, channel_id: &str) -> Call {
        store
            .channel_create(&Channel::new(channel_id, "node-1", "PJSIP/call-in-00000001"))
            .await
            .unwrap();
        let call = Call::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            channel_id,
            CallType::Flow,
            CallDirection::Incoming,
            Address::new(AddressType::Tel, "+15550001"),
            Address::new(AddressType::Tel, "+15550002"),
        );
        store.call_create(&call).await.unwrap();
        call
    }

    #[tokio::test]
    async fn test_update_status_follows_channel_state() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_publish_event()
            .withf(|event_type, _| *event_type == EventType::CallRinging)
            .times(1)
            .returning(|_, _| ());
        notifier
            .expect_publish_event()
            .withf(|event_type, _| *event_type == EventType::CallProgressing)
            .times(1)
            .returning(|_, _| ());
        notifier.expect_notify_event().times(2).returning(|_, _, _| ());

        let f = fixture(MockAriCommander::new(), MockServiceRequester::new(), notifier);
        let call = seed_call(&f.store, "c1").await;

        let mut channel = f.store.channel_get("c1").await.unwrap();
        channel.state = ChannelState::Ringing;
        f.handler.update_status(&channel).await.unwrap();

        channel.state = ChannelState::Up;
        f.handler.update_status(&channel).await.unwrap();

        // backwards move is a silent no-op
        channel.state = ChannelState::Ring;
        f.handler.update_status(&channel).await.unwrap();

        assert_eq!(f.store.call_get(call.id).await.unwrap().status, CallStatus::Progressing);
    }

    #[tokio::test]
    async fn test_update_status_without_call() {
        let f = fixture(
            MockAriCommander::new(),
            MockServiceRequester::new(),
            MockNotifier::new(),
        );
        let mut channel = Channel::new("orphan", "node-1", "PJSIP/x-1");
        channel.state = ChannelState::Up;
        f.handler.update_status(&channel).await.unwrap();
    }

    #[tokio::test]
    async fn test_hangup_runs_once_and_tears_down_chained_calls() {
        let mut ari = MockAriCommander::new();
        ari.expect_channel_hangup()
            .times(1)
            .withf(|_, id, cause| id.to_string() == "c2" && *cause == HangupCause::NormalClearing)
            .returning(|_, _, _| Ok(()));

        let f = fixture(ari, MockServiceRequester::new(), quiet_notifier());
        let master = seed_call(&f.store, "c1").await;
        let chained = seed_call(&f.store, "c2").await;
        f.store.call_add_chained_call_id(master.id, chained.id).await.unwrap();
        f.store.call_set_status(master.id, CallStatus::Progressing).await.unwrap();
        f.store.call_set_status(chained.id, CallStatus::Ringing).await.unwrap();

        let channel = f.store.channel_get("c1").await.unwrap();
        f.handler.hangup(&channel).await.unwrap();
        f.handler.hangup(&channel).await.unwrap();

        let master = f.store.call_get(master.id).await.unwrap();
        assert_eq!(master.status, CallStatus::Hangup);
        assert_eq!(master.hangup_reason, HangupReason::Normal);
        assert_eq!(master.hangup_by, HangupBy::Remote);
        assert!(master.tm_delete.is_some());

        let chained = f.store.call_get(chained.id).await.unwrap();
        assert_eq!(chained.status, CallStatus::Canceling);
    }

    #[tokio::test]
    async fn test_local_teardown_owns_the_hangup() {
        let mut ari = MockAriCommander::new();
        ari.expect_channel_hangup().times(1).returning(|_, _, _| Ok(()));

        let f = fixture(ari, MockServiceRequester::new(), quiet_notifier());
        let call = seed_call(&f.store, "c1").await;

        f.handler.hanging_up(call.id, HangupCause::NormalClearing).await.unwrap();
        let channel = f.store.channel_get("c1").await.unwrap();
        f.handler.hangup(&channel).await.unwrap();

        let call = f.store.call_get(call.id).await.unwrap();
        assert_eq!(call.hangup_reason, HangupReason::Canceled);
        assert_eq!(call.hangup_by, HangupBy::Local);
    }

    #[tokio::test]
    async fn test_playback_of_other_action_is_ignored() {
        let f = fixture(
            MockAriCommander::new(),
            MockServiceRequester::new(),
            MockNotifier::new(),
        );
        seed_call(&f.store, "c1").await;
        let channel = f.store.channel_get("c1").await.unwrap();
        f.handler
            .playback_finished(&channel, &Uuid::new_v4().to_string())
            .await
            .unwrap();
    }
}
