//! PostgreSQL entity store
//!
//! Each entity is kept as a JSONB document with a few columns copied out
//! for lookups. Field setters run as read-modify-write under
//! `SELECT ... FOR UPDATE` so concurrent handlers never lose an update.

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
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::types::Json;
use sqlx::PgPool;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

const EXIST_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// An entity stored as one row of a document table
trait Document: Serialize + DeserializeOwned + Send + Sync + Unpin + 'static {
    const TABLE: &'static str;
    const ENTITY: &'static str;

    fn key(&self) -> String;
    fn tm_create(&self) -> DateTime<Utc>;
    fn tm_delete(&self) -> Option<DateTime<Utc>>;

    fn customer_id(&self) -> Option<Uuid> {
        None
    }

    fn channel_id(&self) -> Option<&str> {
        None
    }
}

impl Document for Call {
    const TABLE: &'static str = "calls";
    const ENTITY: &'static str = "call";

    fn key(&self) -> String {
        self.id.to_string()
    }
    fn tm_create(&self) -> DateTime<Utc> {
        self.tm_create
    }
    fn tm_delete(&self) -> Option<DateTime<Utc>> {
        self.tm_delete
    }
    fn customer_id(&self) -> Option<Uuid> {
        Some(self.customer_id)
    }
    fn channel_id(&self) -> Option<&str> {
        Some(&self.channel_id)
    }
}

impl Document for Channel {
    const TABLE: &'static str = "channels";
    const ENTITY: &'static str = "channel";

    fn key(&self) -> String {
        self.id.clone()
    }
    fn tm_create(&self) -> DateTime<Utc> {
        self.tm_create
    }
    fn tm_delete(&self) -> Option<DateTime<Utc>> {
        self.tm_delete
    }
}

impl Document for Bridge {
    const TABLE: &'static str = "bridges";
    const ENTITY: &'static str = "bridge";

    fn key(&self) -> String {
        self.id.clone()
    }
    fn tm_create(&self) -> DateTime<Utc> {
        self.tm_create
    }
    fn tm_delete(&self) -> Option<DateTime<Utc>> {
        self.tm_delete
    }
}

impl Document for Confbridge {
    const TABLE: &'static str = "confbridges";
    const ENTITY: &'static str = "confbridge";

    fn key(&self) -> String {
        self.id.to_string()
    }
    fn tm_create(&self) -> DateTime<Utc> {
        self.tm_create
    }
    fn tm_delete(&self) -> Option<DateTime<Utc>> {
        self.tm_delete
    }
    fn customer_id(&self) -> Option<Uuid> {
        Some(self.customer_id)
    }
}

fn db_error(e: sqlx::Error) -> DomainError {
    error!("Database error: {}", e);
    DomainError::Internal(format!("database error: {}", e))
}

fn not_found<T: Document>(id: &str) -> DomainError {
    DomainError::NotFound(format!("{} {}", T::ENTITY, id))
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert<T: Document>(&self, doc: &T) -> Result<()> {
        let sql = format!(
            "INSERT INTO {} (id, customer_id, channel_id, data, tm_create, tm_delete) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            T::TABLE
        );
        let key = doc.key();

        sqlx::query(&sql)
            .bind(&key)
            .bind(doc.customer_id())
            .bind(doc.channel_id())
            .bind(Json(doc))
            .bind(doc.tm_create())
            .bind(doc.tm_delete())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                let duplicate = e
                    .as_database_error()
                    .map_or(false, |db| db.is_unique_violation());
                if duplicate {
                    DomainError::AlreadyExists(format!("{} {}", T::ENTITY, key))
                } else {
                    db_error(e)
                }
            })?;

        debug!("Created {} {}", T::ENTITY, key);
        Ok(())
    }

    async fn fetch<T: Document>(&self, id: &str) -> Result<T> {
        let sql = format!("SELECT data FROM {} WHERE id = $1", T::TABLE);
        let row: Option<(Json<T>,)> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error)?;

        row.map(|(Json(doc),)| doc)
            .ok_or_else(|| not_found::<T>(id))
    }

    async fn modify<T, F>(&self, id: &str, f: F) -> Result<()>
    where
        T: Document,
        F: FnOnce(&mut T) + Send,
    {
        let mut tx = self.pool.begin().await.map_err(db_error)?;

        let select = format!("SELECT data FROM {} WHERE id = $1 FOR UPDATE", T::TABLE);
        let row: Option<(Json<T>,)> = sqlx::query_as(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(db_error)?;
        let Some((Json(mut doc),)) = row else {
            return Err(not_found::<T>(id));
        };

        f(&mut doc);

        let update = format!(
            "UPDATE {} SET data = $2, tm_delete = $3 WHERE id = $1",
            T::TABLE
        );
        sqlx::query(&update)
            .bind(id)
            .bind(Json(&doc))
            .bind(doc.tm_delete())
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

        tx.commit().await.map_err(db_error)
    }

    async fn modify_call<F>(&self, id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut Call) + Send,
    {
        self.modify::<Call, _>(&id.to_string(), f).await
    }

    async fn modify_channel<F>(&self, id: &str, f: F) -> Result<()>
    where
        F: FnOnce(&mut Channel) + Send,
    {
        self.modify::<Channel, _>(id, f).await
    }

    async fn modify_confbridge<F>(&self, id: Uuid, f: F) -> Result<()>
    where
        F: FnOnce(&mut Confbridge) + Send,
    {
        self.modify::<Confbridge, _>(&id.to_string(), f).await
    }
}

#[async_trait]
impl CallRepository for PgStore {
    async fn call_create(&self, call: &Call) -> Result<()> {
        self.insert(call).await
    }

    async fn call_get(&self, id: Uuid) -> Result<Call> {
        self.fetch(&id.to_string()).await
    }

    async fn call_get_by_channel_id(&self, channel_id: &str) -> Result<Call> {
        let row: Option<(Json<Call>,)> = sqlx::query_as(
            "SELECT data FROM calls WHERE channel_id = $1 AND tm_delete IS NULL \
             ORDER BY tm_create DESC LIMIT 1",
        )
        .bind(channel_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(|(Json(call),)| call)
            .ok_or_else(|| DomainError::NotFound(format!("call of channel {}", channel_id)))
    }

    async fn call_gets(
        &self,
        customer_id: Uuid,
        size: usize,
        token: Option<DateTime<Utc>>,
    ) -> Result<Vec<Call>> {
        let rows: Vec<(Json<Call>,)> = sqlx::query_as(
            "SELECT data FROM calls WHERE customer_id = $1 AND tm_delete IS NULL \
             AND ($2::timestamptz IS NULL OR tm_create < $2) \
             ORDER BY tm_create DESC LIMIT $3",
        )
        .bind(customer_id)
        .bind(token)
        .bind(size as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        Ok(rows.into_iter().map(|(Json(call),)| call).collect())
    }

    async fn call_set_status(&self, id: Uuid, status: CallStatus) -> Result<()> {
        self.modify_call(id, |call| {
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
        self.modify_call(id, |call| {
            if call.apply_status(CallStatus::Hangup, Utc::now()) {
                call.hangup_reason = reason;
                call.hangup_by = by;
            }
        })
        .await
    }

    async fn call_set_action(&self, id: Uuid, action: Option<Action>) -> Result<()> {
        self.modify_call(id, |call| {
            call.action = action;
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_set_flow(&self, id: Uuid, flow_id: Uuid, active_flow_id: Uuid) -> Result<()> {
        self.modify_call(id, |call| {
            call.flow_id = Some(flow_id);
            call.active_flow_id = Some(active_flow_id);
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_set_bridge_id(&self, id: Uuid, bridge_id: Option<String>) -> Result<()> {
        self.modify_call(id, |call| {
            call.bridge_id = bridge_id;
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_set_confbridge_id(&self, id: Uuid, confbridge_id: Option<Uuid>) -> Result<()> {
        self.modify_call(id, |call| {
            call.confbridge_id = confbridge_id;
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_add_chained_call_id(&self, id: Uuid, chained_call_id: Uuid) -> Result<()> {
        self.modify_call(id, |call| {
            if !call.chained_call_ids.contains(&chained_call_id) {
                call.chained_call_ids.push(chained_call_id);
            }
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_remove_chained_call_id(&self, id: Uuid, chained_call_id: Uuid) -> Result<()> {
        self.modify_call(id, |call| {
            call.chained_call_ids.retain(|id| *id != chained_call_id);
            call.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn call_set_recording_id(&self, id: Uuid, recording_id: Option<Uuid>) -> Result<()> {
        self.modify_call(id, |call| {
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
        self.modify_call(id, |call| {
            call.tm_delete.get_or_insert(Utc::now());
        })
        .await
    }
}

#[async_trait]
impl ChannelRepository for PgStore {
    async fn channel_create(&self, channel: &Channel) -> Result<()> {
        self.insert(channel).await
    }

    async fn channel_get(&self, id: &str) -> Result<Channel> {
        self.fetch(id).await
    }

    async fn channel_is_exist(&self, id: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = sqlx::query("SELECT 1 FROM channels WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;
            match found {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(e) => error!("Could not probe channel {}: {}", id, e),
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIST_POLL_INTERVAL).await;
        }
    }

    async fn channel_set_state(&self, id: &str, state: ChannelState, timestamp: DateTime<Utc>) -> Result<()> {
        self.modify_channel(id, |channel| {
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
        let value = value.to_string();
        self.modify_channel(id, move |channel| {
            channel.data.set(key, value);
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_type(&self, id: &str, channel_type: ChannelType) -> Result<()> {
        self.modify_channel(id, |channel| {
            channel.channel_type = channel_type;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_direction(&self, id: &str, direction: ChannelDirection) -> Result<()> {
        self.modify_channel(id, |channel| {
            channel.direction = direction;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_sip_call_id(&self, id: &str, sip_call_id: &str) -> Result<()> {
        let sip_call_id = sip_call_id.to_string();
        self.modify_channel(id, move |channel| {
            channel.sip_call_id = sip_call_id;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_sip_transport(&self, id: &str, transport: &str) -> Result<()> {
        let transport = transport.to_string();
        self.modify_channel(id, move |channel| {
            channel.sip_transport = transport;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_stasis(&self, id: &str, name: &str, data: BTreeMap<String, String>) -> Result<()> {
        let name = name.to_string();
        self.modify_channel(id, move |channel| {
            channel.stasis_name = name;
            channel.stasis_data = data;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_bridge_id(&self, id: &str, bridge_id: Option<String>) -> Result<()> {
        self.modify_channel(id, |channel| {
            channel.bridge_id = bridge_id;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_playback_id(&self, id: &str, playback_id: Option<String>) -> Result<()> {
        self.modify_channel(id, |channel| {
            channel.playback_id = playback_id;
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_rtp_stat(&self, id: &str, stat: RtpStat) -> Result<()> {
        self.modify_channel(id, |channel| {
            channel.rtp_stat = Some(stat);
            channel.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn channel_set_hangup(&self, id: &str, cause: HangupCause, timestamp: DateTime<Utc>) -> Result<()> {
        self.modify_channel(id, |channel| {
            if channel.tm_end.is_none() {
                channel.hangup_cause = cause;
                channel.tm_end = Some(timestamp);
            }
            channel.tm_update = Some(timestamp);
        })
        .await
    }

    async fn channel_delete(&self, id: &str, timestamp: DateTime<Utc>) -> Result<()> {
        self.modify_channel(id, |channel| {
            channel.tm_delete.get_or_insert(timestamp);
        })
        .await
    }
}

#[async_trait]
impl BridgeRepository for PgStore {
    async fn bridge_create(&self, bridge: &Bridge) -> Result<()> {
        self.insert(bridge).await
    }

    async fn bridge_get(&self, id: &str) -> Result<Bridge> {
        self.fetch(id).await
    }

    async fn bridge_is_exist(&self, id: &str, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let found = sqlx::query("SELECT 1 FROM bridges WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await;
            match found {
                Ok(Some(_)) => return true,
                Ok(None) => {}
                Err(e) => error!("Could not look up bridge {}: {}", id, e),
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(EXIST_POLL_INTERVAL).await;
        }
    }

    async fn bridge_delete(&self, id: &str, timestamp: DateTime<Utc>) -> Result<()> {
        self.modify::<Bridge, _>(id, |bridge| {
            bridge.tm_delete.get_or_insert(timestamp);
        })
        .await
    }

    async fn bridge_add_channel_id(&self, id: &str, channel_id: &str) -> Result<()> {
        let channel_id = channel_id.to_string();
        self.modify::<Bridge, _>(id, move |bridge| {
            if !bridge.channel_ids.contains(&channel_id) {
                bridge.channel_ids.push(channel_id);
            }
            bridge.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn bridge_remove_channel_id(&self, id: &str, channel_id: &str) -> Result<()> {
        let channel_id = channel_id.to_string();
        self.modify::<Bridge, _>(id, move |bridge| {
            bridge.channel_ids.retain(|c| *c != channel_id);
            bridge.tm_update = Some(Utc::now());
        })
        .await
    }
}

#[async_trait]
impl ConfbridgeRepository for PgStore {
    async fn confbridge_create(&self, confbridge: &Confbridge) -> Result<()> {
        self.insert(confbridge).await
    }

    async fn confbridge_get(&self, id: Uuid) -> Result<Confbridge> {
        self.fetch(&id.to_string()).await
    }

    async fn confbridge_set_bridge_id(&self, id: Uuid, bridge_id: Option<String>) -> Result<()> {
        self.modify_confbridge(id, |confbridge| {
            confbridge.bridge_id = bridge_id;
            confbridge.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn confbridge_add_channel_call_id(&self, id: Uuid, channel_id: &str, call_id: Uuid) -> Result<()> {
        let channel_id = channel_id.to_string();
        self.modify_confbridge(id, move |confbridge| {
            confbridge.channel_call_ids.insert(channel_id, call_id);
            confbridge.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn confbridge_remove_channel_call_id(&self, id: Uuid, channel_id: &str) -> Result<()> {
        let channel_id = channel_id.to_string();
        self.modify_confbridge(id, move |confbridge| {
            confbridge.channel_call_ids.remove(&channel_id);
            confbridge.tm_update = Some(Utc::now());
        })
        .await
    }

    async fn confbridge_set_recording_id(&self, id: Uuid, recording_id: Option<Uuid>) -> Result<()> {
        self.modify_confbridge(id, |confbridge| {
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
        self.modify_confbridge(id, |confbridge| {
            confbridge.tm_delete.get_or_insert(timestamp);
        })
        .await
    }
}
