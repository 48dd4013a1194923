//! ARI event dispatcher
//!
//! Exactly one handler per event type. Handlers re-read state from the store
//! and never retry; a failure is logged, counted and returned to the caller.

mod bridge;
mod media;
mod stasis;

use crate::application::bridge_handler::BridgeHandler;
use crate::application::call_handler::CallHandler;
use crate::application::channel_handler::ChannelHandler;
use crate::application::confbridge_handler::ConfbridgeHandler;
use crate::domain::channel::HangupCause;
use crate::domain::ports::Notifier;
use crate::domain::shared::Result;
use crate::infrastructure::metrics::Metrics;
use crate::infrastructure::protocols::ari::event::{
    AriEvent, BridgeEvent, ChannelDestroyed, ChannelDtmfReceived, ChannelEvent, ChannelVarset,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error};

pub struct AriEventHandler {
    channel: Arc<ChannelHandler>,
    bridge: Arc<BridgeHandler>,
    call: Arc<CallHandler>,
    confbridge: Arc<ConfbridgeHandler>,
    notifier: Arc<dyn Notifier>,
    metrics: Metrics,
}

impl AriEventHandler {
    pub fn new(
        channel: Arc<ChannelHandler>,
        bridge: Arc<BridgeHandler>,
        call: Arc<CallHandler>,
        confbridge: Arc<ConfbridgeHandler>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            channel,
            bridge,
            call,
            confbridge,
            notifier,
            metrics: Metrics::noop(),
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Handle one decoded event
    pub async fn handle(&self, event: AriEvent) -> Result<()> {
        let name = event.name();
        self.metrics.ari_event_received(name);
        let started = Instant::now();

        let result = self.dispatch(event).await;

        self.metrics.ari_event_processed(name, started.elapsed());
        if let Err(e) = &result {
            self.metrics.ari_event_failed(name);
            error!("Could not handle {} event: {}", name, e);
        }
        result
    }

    async fn dispatch(&self, event: AriEvent) -> Result<()> {
        match event {
            AriEvent::BridgeCreated(e) => self.bridge_created(e).await,
            AriEvent::BridgeDestroyed(e) => self.bridge_destroyed(e).await,
            AriEvent::ChannelCreated(e) => self.channel_created(e).await,
            AriEvent::ChannelDestroyed(e) => self.channel_destroyed(e).await,
            AriEvent::ChannelStateChange(e) => self.channel_state_change(e).await,
            AriEvent::ChannelVarset(e) => self.channel_varset(e).await,
            AriEvent::ChannelEnteredBridge(e) => self.channel_entered_bridge(e).await,
            AriEvent::ChannelLeftBridge(e) => self.channel_left_bridge(e).await,
            AriEvent::ChannelDtmfReceived(e) => self.channel_dtmf_received(e).await,
            AriEvent::StasisStart(e) => self.stasis_start(e).await,
            AriEvent::StasisEnd(e) => self.stasis_end(e).await,
            AriEvent::PlaybackStarted(e) => self.playback_started(e).await,
            AriEvent::PlaybackFinished(e) => self.playback_finished(e).await,
            AriEvent::RecordingStarted(e) => self.recording_started(e).await,
            AriEvent::RecordingFinished(e) => self.recording_finished(e).await,
            AriEvent::ContactStatusChange(e) => self.contact_status_change(e),
            AriEvent::Unknown => {
                debug!("Ignoring unknown event");
                Ok(())
            }
        }
    }

    async fn bridge_created(&self, e: BridgeEvent) -> Result<()> {
        let bridge = e.bridge.to_bridge(&e.header.asterisk_id, e.header.timestamp);
        self.bridge.create(&bridge).await
    }

    async fn bridge_destroyed(&self, e: BridgeEvent) -> Result<()> {
        self.bridge.delete(&e.bridge.id, e.header.timestamp).await
    }

    async fn channel_created(&self, e: ChannelEvent) -> Result<()> {
        let channel = e.channel.to_channel(&e.header.asterisk_id, e.header.timestamp);
        self.channel.create(&channel).await
    }

    async fn channel_destroyed(&self, e: ChannelDestroyed) -> Result<()> {
        let cause = HangupCause::from(e.cause);
        let channel = self
            .channel
            .end(&e.channel.id, cause, e.header.timestamp)
            .await?;
        self.call.hangup(&channel).await
    }

    async fn channel_state_change(&self, e: ChannelEvent) -> Result<()> {
        let channel = self
            .channel
            .update_state(&e.channel.id, e.channel.state, e.header.timestamp)
            .await?;
        self.call.update_status(&channel).await
    }

    async fn channel_varset(&self, e: ChannelVarset) -> Result<()> {
        // global variables carry no channel
        let Some(channel) = e.channel else {
            return Ok(());
        };
        self.channel
            .set_variable(&channel.id, &e.variable, &e.value)
            .await
    }

    async fn channel_dtmf_received(&self, e: ChannelDtmfReceived) -> Result<()> {
        let channel = self.channel.get(&e.channel.id).await?;
        self.call
            .dtmf_received(&channel, &e.digit, e.duration_ms)
            .await
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::application::{CallCore, Repositories};
    use crate::config::Config;
    use crate::domain::call::{CallRepository, CallStatus};
    use crate::domain::channel::{ChannelRepository, ChannelState};
    use crate::domain::ports::{MockAriCommander, MockNotifier, MockServiceRequester};
    use crate::domain::shared::{DomainError, EventType};
    use crate::infrastructure::metrics::testing::CountingRecorder;
    use crate::infrastructure::persistence::MemoryStore;
    use serde_json::{json, Value};

    pub(crate) struct Fixture {
        pub store: Arc<MemoryStore>,
        pub core: CallCore,
    }

    pub(crate) fn quiet_notifier() -> MockNotifier {
        let mut notifier = MockNotifier::new();
        notifier.expect_publish_event().returning(|_, _| ());
        notifier.expect_notify_event().returning(|_, _, _| ());
        notifier
    }

    pub(crate) fn fixture_with(
        ari: MockAriCommander,
        requester: MockServiceRequester,
        notifier: MockNotifier,
        metrics: Metrics,
    ) -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let mut config = Config::default();
        config.store.exist_timeout_ms = 20;
        config.health.delay_ms = 10;

        let core = CallCore::new(
            Repositories::shared(store.clone()),
            Arc::new(ari),
            Arc::new(requester),
            Arc::new(notifier),
            metrics,
            &config,
        );
        Fixture { store, core }
    }

    pub(crate) fn fixture(ari: MockAriCommander, requester: MockServiceRequester) -> Fixture {
        fixture_with(ari, requester, quiet_notifier(), Metrics::noop())
    }

    /// Build an event the way the node sends it
    pub(crate) fn event(mut raw: Value) -> AriEvent {
        raw["asterisk_id"] = json!("node-1");
        raw["application"] = json!("voipbin");
        raw["timestamp"] = json!("2020-04-19T14:38:00.363+0000");
        serde_json::from_value(raw).unwrap()
    }

    pub(crate) fn channel_json(id: &str, name: &str, state: &str) -> Value {
        json!({
            "id": id,
            "name": name,
            "state": state,
            "caller": {"name": "", "number": "+15550001"},
            "dialplan": {"context": "call-in", "exten": "+15550002", "priority": 1},
        })
    }

    #[tokio::test]
    async fn test_channel_lifecycle_is_mirrored() {
        let f = fixture(MockAriCommander::new(), MockServiceRequester::new());
        let handler = &f.core.events;

        handler
            .handle(event(json!({
                "type": "ChannelCreated",
                "channel": channel_json("c1", "PJSIP/call-in-00000001", "Ring"),
            })))
            .await
            .unwrap();
        handler
            .handle(event(json!({
                "type": "ChannelStateChange",
                "channel": channel_json("c1", "PJSIP/call-in-00000001", "Up"),
            })))
            .await
            .unwrap();
        handler
            .handle(event(json!({
                "type": "ChannelVarset",
                "variable": "CC-SIP_CALLID",
                "value": "abc@host",
                "channel": channel_json("c1", "PJSIP/call-in-00000001", "Up"),
            })))
            .await
            .unwrap();

        let channel = f.store.channel_get("c1").await.unwrap();
        assert_eq!(channel.state, ChannelState::Up);
        assert!(channel.tm_answer.is_some());
        assert_eq!(channel.sip_call_id, "abc@host");

        handler
            .handle(event(json!({
                "type": "ChannelDestroyed",
                "cause": 16,
                "cause_txt": "Normal Clearing",
                "channel": channel_json("c1", "PJSIP/call-in-00000001", "Up"),
            })))
            .await
            .unwrap();

        let channel = f.store.channel_get("c1").await.unwrap();
        assert_eq!(channel.hangup_cause, HangupCause::NormalClearing);
        assert!(channel.is_ended());
    }

    #[tokio::test]
    async fn test_channel_end_settles_the_call() {
        let mut notifier = MockNotifier::new();
        notifier
            .expect_publish_event()
            .withf(|event_type, _| *event_type == EventType::CallHangup)
            .times(1)
            .returning(|_, _| ());
        notifier.expect_notify_event().times(1).returning(|_, _, _| ());

        let f = fixture_with(
            MockAriCommander::new(),
            MockServiceRequester::new(),
            notifier,
            Metrics::noop(),
        );
        let call = crate::application::call_handler::tests::seed_call(&f.store, "c1").await;

        f.core
            .events
            .handle(event(json!({
                "type": "ChannelDestroyed",
                "cause": 16,
                "channel": channel_json("c1", "PJSIP/call-in-00000001", "Up"),
            })))
            .await
            .unwrap();

        let call = f.store.call_get(call.id).await.unwrap();
        assert_eq!(call.status, CallStatus::Hangup);
    }

    #[tokio::test]
    async fn test_global_varset_is_ignored() {
        let f = fixture(MockAriCommander::new(), MockServiceRequester::new());
        f.core
            .events
            .handle(event(json!({
                "type": "ChannelVarset",
                "variable": "CC-TYPE",
                "value": "call",
            })))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_counted_and_returned() {
        let recorder = Arc::new(CountingRecorder::default());
        let f = fixture_with(
            MockAriCommander::new(),
            MockServiceRequester::new(),
            quiet_notifier(),
            Metrics::new(recorder.clone()),
        );

        let err = f
            .core
            .events
            .handle(event(json!({
                "type": "ChannelStateChange",
                "channel": channel_json("missing", "PJSIP/call-in-00000001", "Up"),
            })))
            .await
            .unwrap_err();

        assert!(matches!(err, DomainError::NotFound(_)));
        assert_eq!(
            recorder.count("callcore_ari_event_total", "type", "ChannelStateChange"),
            1
        );
        assert_eq!(
            recorder.count("callcore_ari_event_failed_total", "type", "ChannelStateChange"),
            1
        );
    }

    #[tokio::test]
    async fn test_unknown_event_is_ignored() {
        let f = fixture(MockAriCommander::new(), MockServiceRequester::new());
        f.core.events.handle(AriEvent::Unknown).await.unwrap();
    }
}
