//! Bridge repository interface

use super::entity::Bridge;
use crate::domain::shared::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Store contract for Bridge records
#[async_trait]
pub trait BridgeRepository: Send + Sync {
    async fn bridge_create(&self, bridge: &Bridge) -> Result<()>;

    async fn bridge_get(&self, id: &str) -> Result<Bridge>;

    /// Poll for a bridge record until it exists or the timeout elapses
    async fn bridge_is_exist(&self, id: &str, timeout: Duration) -> bool;

    /// Soft delete; the record stays readable with `tm_delete` set
    async fn bridge_delete(&self, id: &str, timestamp: DateTime<Utc>) -> Result<()>;

    /// Add a member channel; adding an existing member is a no-op
    async fn bridge_add_channel_id(&self, id: &str, channel_id: &str) -> Result<()>;

    async fn bridge_remove_channel_id(&self, id: &str, channel_id: &str) -> Result<()>;
}
