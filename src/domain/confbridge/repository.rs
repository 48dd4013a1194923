//! Confbridge repository interface

use super::entity::Confbridge;
use crate::domain::shared::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Store contract for Confbridge records
#[async_trait]
pub trait ConfbridgeRepository: Send + Sync {
    async fn confbridge_create(&self, confbridge: &Confbridge) -> Result<()>;

    async fn confbridge_get(&self, id: Uuid) -> Result<Confbridge>;

    async fn confbridge_set_bridge_id(&self, id: Uuid, bridge_id: Option<String>) -> Result<()>;

    async fn confbridge_add_channel_call_id(&self, id: Uuid, channel_id: &str, call_id: Uuid) -> Result<()>;

    async fn confbridge_remove_channel_call_id(&self, id: Uuid, channel_id: &str) -> Result<()>;

    /// Set the active recording; a new id is also appended to the history
    async fn confbridge_set_recording_id(&self, id: Uuid, recording_id: Option<Uuid>) -> Result<()>;

    async fn confbridge_delete(&self, id: Uuid, timestamp: DateTime<Utc>) -> Result<()>;
}
