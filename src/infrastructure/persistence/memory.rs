//! In-memory entity store
//!
//! Implements every repository contract over `tokio::sync::RwLock` maps.
//! Used by tests and by deployments running without a database.

use crate::domain::bridge::{Bridge, BridgeRepository};
use crate::domain::call::{Action, Call, CallRepository, CallStatus, HangupBy, HangupReason};
use crate::domain::call_quality::RtpStat;
use crate::domain::channel::{
    Channel, ChannelDirection, ChannelRepository, ChannelState, ChannelType, DataKey, HangupCause,
};
use crate::domain::confbridge::{Confbridge, ConfbridgeRepository};
use crate::domain::shared::{DomainError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

const EXIST_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Default)]
pub struct MemoryStore {
    calls: RwLock<HashMap<Uuid, Call>>,
    channels: RwLock<HashMap<String, Channel>>,
    bridges: RwLock<HashMap<String, Bridge>>,
    confbridges: RwLock<HashMap<Uuid, Confbridge>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Apply `f` to the record under `key`, failing with `NotFound` if absent
async fn modify<K, V, F>(map: &RwLock<HashMap<K, V>>, key: &K, what: &str, f: F) -> Result<()>
where
    K: Eq + Hash + std::fmt::Display,
    F: FnOnce(&mut V),
{
    let mut map = map.write().await;
    let entity = map
        .get_mut(key)
        .ok_or_else(|| DomainError::NotFound(format!("{} {}", what, key)))?;
    f(entity);
    Ok(())
}

async fn read<K, V>(map: &RwLock<HashMap<K, V>>, key: &K, what: &str) -> Result<V>
where
    K: Eq + Hash + std::fmt::Display,
    V: Clone,
{
    map.read()
        .await
        .get(key)
        .cloned()
        .ok_or_else(|| DomainError::NotFound(format!("{} {}", what, key)))
}

#[async_trait]
impl CallRepository for MemoryStore {
    async fn call_create(&self, call: &Call) -> Result<()> {
        let mut calls = self.calls.write().await;
        if calls.contains_key(&call.id) {
            return Err(DomainError::AlreadyExists(format!("call {}", call.id)));
        }
        calls.insert(call.id, call.clone());
        debug!("Created call {}", call.id);
        Ok(())
    }

    async fn call_get(&self, id: Uuid) -> Result<Call> {
        read(&self.calls, &id, "call").await
    }

    async fn call_get_by_channel_id(&self, channel_id: &str) -> Result<Call> {
        self.calls
            .read()
            .await
            .values()
            .filter(|call| call.channel_id == channel_id && call.tm_delete.is_none())
            .max_by_key(|call| call.tm_create)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("call of channel {}", channel_id)))
    }

    async fn call_gets(
        &self,
        customer_id: Uuid,
        size: usize,
        token: Option<DateTime<Utc>>,
    ) -> Result<Vec<Call>> {
        let calls = self.calls.read().await;
        let mut result: Vec<Call> = calls
            .values()
            .filter(|call| call.customer_id == customer_id && call.tm_delete.is_none())
            .filter(|call| token.map_or(true, |token| call.tm_create < token))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.tm_create.cmp(&a.tm_create));
        result.truncate(size);
        Ok(result)
    }

    async fn call_set_status(&self, id: Uuid, status: CallStatus) -> Result<()> {
        modify(&self.calls, &id, "call", |call| {
            if !call.apply_status(status, Utc::now()) {
                debug!(
                    "Ignored call status change {:?} -> {:?} for {}",
                    call.status, status, call.id
                );
            }
        })
        .await
    }

    async fn call_set_hangup(&self, id: Uuid, reason: HangupReason, by: HangupBy) -> Result<()> {
        modify(&self.calls, &id, "call", |call| {
            if call.apply_status(CallStatus::Hangup, Utc::now()) {
                call.hangup_reason = reason;
                call.hangup_by = by;
            }
        })
        .await
    }

    async fn call_set_action(&self, id: Uuid, action: Option<Action>) -> Result<()> {
        modify(&self.calls, &id, "call", |call| {
            call.action = action;
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_set_flow(&self, id: Uuid, flow_id: Uuid, active_flow_id: Uuid) -> Result<()> {
        modify(&self.calls, &id, "call", |call| {
            call.flow_id = Some(flow_id);
            call.active_flow_id = Some(active_flow_id);
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_set_bridge_id(&self, id: Uuid, bridge_id: Option<String>) -> Result<()> {
        modify(&self.calls, &id, "call", |call| {
            call.bridge_id = bridge_id;
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_set_confbridge_id(&self, id: Uuid, confbridge_id: Option<Uuid>) -> Result<()> {
        modify(&self.calls, &id, "call", |call| {
            call.confbridge_id = confbridge_id;
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_add_chained_call_id(&self, id: Uuid, chained_call_id: Uuid) -> Result<()> {
        modify(&self.calls, &id, "call", |call| {
            if !call.chained_call_ids.contains(&chained_call_id) {
                call.chained_call_ids.push(chained_call_id);
            }
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_remove_chained_call_id(&self, id: Uuid, chained_call_id: Uuid) -> Result<()> {
        modify(&self.calls, &id, "call", |call| {
            call.chained_call_ids.retain(|id| *id != chained_call_id);
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_set_recording_id(&self, id: Uuid, recording_id: Option<Uuid>) -> Result<()> {
        modify(&self.calls, &id, "call", |call| {
            if let Some(recording_id) = recording_id {
                if !call.recording_ids.contains(&recording_id) {
                    call.recording_ids.push(recording_id);
                }
            }
            call.recording_id = recording_id;
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_delete(&self, id: Uuid) -> Result<()> {
        modify(&self.calls, &id, "call", |call| {
            if call.tm_delete.is_none() {
                call.tm_delete = Some(Utc::now());
            }
        })
        .await
    }
}

#[async_trait]
impl ChannelRepository for MemoryStore {
    async fn channel_create(&self, channel: &Channel) -> Result<()> {
        let mut channels = self.channels.write().await;
        if channels.contains_key(&channel.id) {
            return Err(DomainError::AlreadyExists(format!("channel {}", channel.id)));
        }
        channels.insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    async fn channel_get(&self, id: &str) -> Result<Channel> {
        read(&self.channels, &id.to_string(), "channel").await
    }

    async fn channel_is_exist(&self, id: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.channels.read().await.contains_key(id) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIST_POLL_INTERVAL).await;
        }
    }

    async fn channel_set_state(&self, id: &str, state: ChannelState, timestamp: DateTime<Utc>) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            channel.state = state;
            match state {
                ChannelState::Up => {
                    channel.tm_answer.get_or_insert(timestamp);
                }
                ChannelState::Ring | ChannelState::Ringing => {
                    channel.tm_ringing.get_or_insert(timestamp);
                }
                _ => {}
            }
            channel.tm_update = Some(timestamp);
        })
        .await
    }

    async fn channel_set_data_item(&self, id: &str, key: DataKey, value: &str) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            channel.data.set(key, value);
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_type(&self, id: &str, channel_type: ChannelType) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            channel.channel_type = channel_type;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_direction(&self, id: &str, direction: ChannelDirection) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            channel.direction = direction;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_sip_call_id(&self, id: &str, sip_call_id: &str) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            channel.sip_call_id = sip_call_id.to_string();
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_sip_transport(&self, id: &str, transport: &str) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            channel.sip_transport = transport.to_string();
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_stasis(&self, id: &str, name: &str, data: BTreeMap<String, String>) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            channel.stasis_name = name.to_string();
            channel.stasis_data = data;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_bridge_id(&self, id: &str, bridge_id: Option<String>) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            channel.bridge_id = bridge_id;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_playback_id(&self, id: &str, playback_id: Option<String>) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            channel.playback_id = playback_id;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_rtp_stat(&self, id: &str, stat: RtpStat) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            channel.rtp_stat = Some(stat);
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_hangup(&self, id: &str, cause: HangupCause, timestamp: DateTime<Utc>) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            if channel.tm_end.is_none() {
                channel.hangup_cause = cause;
                channel.tm_end = Some(timestamp);
            }
            channel.tm_update = Some(timestamp);
        })
        .await
    }

    async fn channel_delete(&self, id: &str, timestamp: DateTime<Utc>) -> Result<()> {
        modify(&self.channels, &id.to_string(), "channel", |channel| {
            channel.tm_delete.get_or_insert(timestamp);
        })
        .await
    }
}

#[async_trait]
impl BridgeRepository for MemoryStore {
    async fn bridge_create(&self, bridge: &Bridge) -> Result<()> {
        let mut bridges = self.bridges.write().await;
        if bridges.contains_key(&bridge.id) {
            return Err(DomainError::AlreadyExists(format!("bridge {}", bridge.id)));
        }
        bridges.insert(bridge.id.clone(), bridge.clone());
        Ok(())
    }

    async fn bridge_get(&self, id: &str) -> Result<Bridge> {
        read(&self.bridges, &id.to_string(), "bridge").await
    }

    async fn bridge_is_exist(&self, id: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.bridges.read().await.contains_key(id) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIST_POLL_INTERVAL).await;
        }
    }

    async fn bridge_delete(&self, id: &str, timestamp: DateTime<Utc>) -> Result<()> {
        modify(&self.bridges, &id.to_string(), "bridge", |bridge| {
            bridge.tm_delete.get_or_insert(timestamp);
        })
        .await
    }

    async fn bridge_add_channel_id(&self, id: &str, channel_id: &str) -> Result<()> {
        modify(&self.bridges, &id.to_string(), "bridge", |bridge| {
            if !bridge.channel_ids.iter().any(|c| c == channel_id) {
                bridge.channel_ids.push(channel_id.to_string());
            }
            bridge.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn bridge_remove_channel_id(&self, id: &str, channel_id: &str) -> Result<()> {
        modify(&self.bridges, &id.to_string(), "bridge", |bridge| {
            bridge.channel_ids.retain(|c| c != channel_id);
            bridge.tm_update = Some(Utc::now());
        })
        .await
    }
}

#[async_trait]
impl ConfbridgeRepository for MemoryStore {
    async fn confbridge_create(&self, confbridge: &Confbridge) -> Result<()> {
        let mut confbridges = self.confbridges.write().await;
        if confbridges.contains_key(&confbridge.id) {
            return Err(DomainError::AlreadyExists(format!("confbridge {}", confbridge.id)));
        }
        confbridges.insert(confbridge.id, confbridge.clone());
        Ok(())
    }

    async fn confbridge_get(&self, id: Uuid) -> Result<Confbridge> {
        read(&self.confbridges, &id, "confbridge").await
    }

    async fn confbridge_set_bridge_id(&self, id: Uuid, bridge_id: Option<String>) -> Result<()> {
        modify(&self.confbridges, &id, "confbridge", |confbridge| {
            confbridge.bridge_id = bridge_id;
            confbridge.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn confbridge_add_channel_call_id(&self, id: Uuid, channel_id: &str, call_id: Uuid) -> Result<()> {
        modify(&self.confbridges, &id, "confbridge", |confbridge| {
            confbridge
                .channel_call_ids
                .insert(channel_id.to_string(), call_id);
            confbridge.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn confbridge_remove_channel_call_id(&self, id: Uuid, channel_id: &str) -> Result<()> {
        modify(&self.confbridges, &id, "confbridge", |confbridge| {
            confbridge.channel_call_ids.remove(channel_id);
            confbridge.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn confbridge_set_recording_id(&self, id: Uuid, recording_id: Option<Uuid>) -> Result<()> {
        modify(&self.confbridges, &id, "confbridge", |confbridge| {
            if let Some(recording_id) = recording_id {
                if !confbridge.recording_ids.contains(&recording_id) {
                    confbridge.recording_ids.push(recording_id);
                }
            }
            confbridge.recording_id = recording_id;
            confbridge.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn confbridge_delete(&self, id: Uuid, timestamp: DateTime<Utc>) -> Result<()> {
        modify(&self.confbridges, &id, "confbridge", |confbridge| {
            confbridge.tm_delete.get_or_insert(timestamp);
        })
        .await
    }
}
