//! Call repository interface

use crate::domain::call::action::Action;
use crate::domain::call::aggregate::Call;
use crate::domain::call::value_object::{CallStatus, HangupBy, HangupReason};
use crate::domain::shared::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Repository interface for Call aggregate
///
/// This is defined in the domain layer as a trait (port),
/// and implemented in the infrastructure layer (adapter).
/// Every setter is safe to apply twice.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallRepository: Send + Sync {
    async fn call_create(&self, call: &Call) -> Result<()>;

    async fn call_get(&self, id: Uuid) -> Result<Call>;

    /// Reverse lookup of the live call owning a channel
    async fn call_get_by_channel_id(&self, channel_id: &str) -> Result<Call>;

    /// Page through calls, newest first, created strictly before `token`
    async fn call_gets(
        &self,
        customer_id: Uuid,
        size: usize,
        token: Option<DateTime<Utc>>,
    ) -> Result<Vec<Call>>;

    /// Move the call to a new status; rejected transitions leave it unchanged
    async fn call_set_status(&self, id: Uuid, status: CallStatus) -> Result<()>;

    /// Store the hangup outcome and move the call to `Hangup`
    async fn call_set_hangup(&self, id: Uuid, reason: HangupReason, by: HangupBy) -> Result<()>;

    async fn call_set_action(&self, id: Uuid, action: Option<Action>) -> Result<()>;

    async fn call_set_flow(&self, id: Uuid, flow_id: Uuid, active_flow_id: Uuid) -> Result<()>;

    async fn call_set_bridge_id(&self, id: Uuid, bridge_id: Option<String>) -> Result<()>;

    async fn call_set_confbridge_id(&self, id: Uuid, confbridge_id: Option<Uuid>) -> Result<()>;

    async fn call_add_chained_call_id(&self, id: Uuid, chained_call_id: Uuid) -> Result<()>;

    async fn call_remove_chained_call_id(&self, id: Uuid, chained_call_id: Uuid) -> Result<()>;

    /// Set the active recording; a new id is also appended to the history
    async fn call_set_recording_id(&self, id: Uuid, recording_id: Option<Uuid>) -> Result<()>;

    async fn call_delete(&self, id: Uuid) -> Result<()>;
}
