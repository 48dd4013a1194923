//! Shared fixtures for the integration tests
//!
//! The telephony node and the sibling services are replaced by recording
//! fakes; everything else is the real wiring over the in-memory store.

#![allow(dead_code)]

use async_trait::async_trait;
use callcore::application::{CallCore, Repositories};
use callcore::config::Config;
use callcore::domain::bridge::BridgeType;
use callcore::domain::call::Action;
use callcore::domain::channel::{ChannelState, HangupCause};
use callcore::domain::ports::{
    AriCommander, ConferenceInfo, NumberInfo, OriginateRequest, ServiceRequester,
};
use callcore::infrastructure::messaging::EventBroadcaster;
use callcore::infrastructure::metrics::Metrics;
use callcore::infrastructure::persistence::MemoryStore;
use callcore::infrastructure::protocols::ari::AriEvent;
use callcore::{DomainError, Result};
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Telephony node that records every command
#[derive(Default)]
pub struct FakeAri {
    commands: Mutex<Vec<String>>,
    dead: Mutex<HashSet<String>>,
}

impl FakeAri {
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    /// Hangups issued for a channel
    pub fn hangups_of(&self, channel_id: &str) -> usize {
        let prefix = format!("hangup {} ", channel_id);
        self.commands()
            .iter()
            .filter(|c| c.starts_with(&prefix))
            .count()
    }

    /// Make `channel_get` fail for the channel
    pub fn kill(&self, channel_id: &str) {
        self.dead.lock().unwrap().insert(channel_id.to_string());
    }

    fn record(&self, command: String) {
        self.commands.lock().unwrap().push(command);
    }
}

#[async_trait]
impl AriCommander for FakeAri {
    async fn channel_answer(&self, _asterisk_id: &str, channel_id: &str) -> Result<()> {
        self.record(format!("answer {}", channel_id));
        Ok(())
    }

    async fn channel_ring(&self, _asterisk_id: &str, channel_id: &str) -> Result<()> {
        self.record(format!("ring {}", channel_id));
        Ok(())
    }

    async fn channel_hangup(&self, _asterisk_id: &str, channel_id: &str, cause: HangupCause) -> Result<()> {
        self.record(format!("hangup {} {}", channel_id, cause.code()));
        Ok(())
    }

    async fn channel_get(&self, _asterisk_id: &str, channel_id: &str) -> Result<ChannelState> {
        if self.dead.lock().unwrap().contains(channel_id) {
            return Err(DomainError::Upstream(format!("channel {} not found", channel_id)));
        }
        Ok(ChannelState::Up)
    }

    async fn channel_create(&self, request: &OriginateRequest) -> Result<()> {
        self.record(format!("originate {}", request.channel_id));
        Ok(())
    }

    async fn channel_variable_set(
        &self,
        _asterisk_id: &str,
        channel_id: &str,
        variable: &str,
        value: &str,
    ) -> Result<()> {
        self.record(format!("set {} {}={}", channel_id, variable, value));
        Ok(())
    }

    async fn channel_play(
        &self,
        _asterisk_id: &str,
        channel_id: &str,
        playback_id: &str,
        _medias: &[String],
    ) -> Result<()> {
        self.record(format!("play {} {}", channel_id, playback_id));
        Ok(())
    }

    async fn bridge_create(
        &self,
        _asterisk_id: &str,
        bridge_id: &str,
        _name: &str,
        _types: &[BridgeType],
    ) -> Result<()> {
        self.record(format!("bridge_create {}", bridge_id));
        Ok(())
    }

    async fn bridge_delete(&self, _asterisk_id: &str, bridge_id: &str) -> Result<()> {
        self.record(format!("bridge_delete {}", bridge_id));
        Ok(())
    }

    async fn bridge_add_channel(&self, _asterisk_id: &str, bridge_id: &str, channel_id: &str) -> Result<()> {
        self.record(format!("bridge_add {} {}", bridge_id, channel_id));
        Ok(())
    }

    async fn bridge_remove_channel(&self, _asterisk_id: &str, bridge_id: &str, channel_id: &str) -> Result<()> {
        self.record(format!("bridge_remove {} {}", bridge_id, channel_id));
        Ok(())
    }
}

/// Sibling services backed by fixed answers
#[derive(Default)]
pub struct FakeRequester {
    /// Numbers known to the number directory: (number, customer, flow)
    pub numbers: Mutex<Vec<(String, Uuid, Uuid)>>,
    /// Actions handed out by the flow service, in order
    pub actions: Mutex<VecDeque<Action>>,
    /// Scheduled channel probes: (channel, retry)
    pub channel_checks: Mutex<Vec<(String, u32)>>,
    /// Scheduled call probes: (call, retry)
    pub call_checks: Mutex<Vec<(Uuid, u32)>>,
    pub removed_confbridges: Mutex<Vec<Uuid>>,
}

impl FakeRequester {
    pub fn with_number(number: &str, customer_id: Uuid, flow_id: Uuid) -> Self {
        let requester = Self::default();
        requester
            .numbers
            .lock()
            .unwrap()
            .push((number.to_string(), customer_id, flow_id));
        requester
    }

    pub fn push_action(&self, action: Action) {
        self.actions.lock().unwrap().push_back(action);
    }
}

#[async_trait]
impl ServiceRequester for FakeRequester {
    async fn flow_create_temporary(&self, _customer_id: Uuid, actions: Vec<Action>) -> Result<Uuid> {
        self.actions.lock().unwrap().extend(actions);
        Ok(Uuid::new_v4())
    }

    async fn active_flow_create(&self, _call_id: Uuid, _flow_id: Uuid) -> Result<Uuid> {
        Ok(Uuid::new_v4())
    }

    async fn active_flow_action_next(&self, _active_flow_id: Uuid, _current_action_id: Option<Uuid>) -> Result<Option<Action>> {
        Ok(self.actions.lock().unwrap().pop_front())
    }

    async fn number_get_by_number(&self, number: &str) -> Result<NumberInfo> {
        self.numbers
            .lock()
            .unwrap()
            .iter()
            .find(|(n, _, _)| n == number)
            .map(|(n, customer_id, flow_id)| NumberInfo {
                id: Uuid::new_v4(),
                customer_id: *customer_id,
                number: n.clone(),
                call_flow_id: Some(*flow_id),
            })
            .ok_or_else(|| DomainError::NotFound(format!("number {}", number)))
    }

    async fn conference_get(&self, conference_id: Uuid) -> Result<ConferenceInfo> {
        Err(DomainError::NotFound(format!("conference {}", conference_id)))
    }

    async fn registrar_contacts_get(&self, _customer_id: Uuid, _extension: &str) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    async fn asterisk_address_internal(&self, _asterisk_id: &str) -> Result<String> {
        Ok("10.0.0.1".to_string())
    }

    async fn call_remove_confbridge(&self, call_id: Uuid) -> Result<()> {
        self.removed_confbridges.lock().unwrap().push(call_id);
        Ok(())
    }

    async fn call_channel_health_check(&self, channel_id: &str, retry_count: u32, _delay: Duration) -> Result<()> {
        self.channel_checks
            .lock()
            .unwrap()
            .push((channel_id.to_string(), retry_count));
        Ok(())
    }

    async fn call_health_check(&self, call_id: Uuid, retry_count: u32, _delay: Duration) -> Result<()> {
        self.call_checks.lock().unwrap().push((call_id, retry_count));
        Ok(())
    }
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub ari: Arc<FakeAri>,
    pub requester: Arc<FakeRequester>,
    pub broadcaster: Arc<EventBroadcaster>,
    pub core: Arc<CallCore>,
}

pub fn harness(requester: FakeRequester) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let ari = Arc::new(FakeAri::default());
    let requester = Arc::new(requester);
    let broadcaster = Arc::new(EventBroadcaster::new(64));

    let mut config = Config::default();
    config.store.exist_timeout_ms = 20;
    config.health.delay_ms = 10;

    let core = Arc::new(CallCore::new(
        Repositories::shared(store.clone()),
        ari.clone(),
        requester.clone(),
        broadcaster.clone(),
        Metrics::noop(),
        &config,
    ));

    Harness {
        store,
        ari,
        requester,
        broadcaster,
        core,
    }
}

impl Harness {
    /// Feed an event shaped the way the node sends it
    pub async fn feed(&self, mut raw: Value) -> Result<()> {
        raw["asterisk_id"] = json!("node-1");
        raw["application"] = json!("callcore");
        raw["timestamp"] = json!("2020-04-19T14:38:00.363+0000");
        let event = AriEvent::parse(raw.to_string().as_bytes())
            .map_err(|e| DomainError::ValidationError(e.to_string()))?;
        self.core.events.handle(event).await
    }
}

pub fn channel_json(id: &str, name: &str, state: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "state": state,
        "caller": {"name": "alice", "number": "+15550001"},
        "dialplan": {"context": "call-in", "exten": "+15550002", "priority": 1},
    })
}

pub fn bridge_json(id: &str, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "technology": "simple_bridge",
        "bridge_type": "mixing",
        "bridge_class": "stasis",
        "creator": "Stasis",
        "channels": [],
    })
}
