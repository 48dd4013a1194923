//! Request port towards sibling services
//!
//! Flow execution, number and conference directories, the SIP registrar and
//! the node address book live in other services. Requests addressed to this
//! service itself (`call_*`) also go through here so that ownership of the
//! call record stays with the call service, and so delayed requests can be
//! scheduled.

use crate::domain::call::Action;
use crate::domain::shared::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Number directory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumberInfo {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub number: String,
    pub call_flow_id: Option<Uuid>,
}

/// Conference directory entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConferenceInfo {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub confbridge_id: Uuid,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ServiceRequester: Send + Sync {
    /// Create a temporary flow made of the given actions; returns the flow id
    async fn flow_create_temporary(&self, customer_id: Uuid, actions: Vec<Action>) -> Result<Uuid>;

    /// Start executing a flow for a call; returns the active flow id
    async fn active_flow_create(&self, call_id: Uuid, flow_id: Uuid) -> Result<Uuid>;

    /// Next action of an active flow; `None` once the flow has finished
    async fn active_flow_action_next(&self, active_flow_id: Uuid, current_action_id: Option<Uuid>) -> Result<Option<Action>>;

    async fn number_get_by_number(&self, number: &str) -> Result<NumberInfo>;

    async fn conference_get(&self, conference_id: Uuid) -> Result<ConferenceInfo>;

    /// Registered contact URIs of an extension
    async fn registrar_contacts_get(&self, customer_id: Uuid, extension: &str) -> Result<Vec<String>>;

    /// Internal SIP address of a telephony node
    async fn asterisk_address_internal(&self, asterisk_id: &str) -> Result<String>;

    async fn call_remove_confbridge(&self, call_id: Uuid) -> Result<()>;

    /// Schedule a channel health probe after `delay`
    async fn call_channel_health_check(&self, channel_id: &str, retry_count: u32, delay: Duration) -> Result<()>;

    /// Schedule a call health probe after `delay`
    async fn call_health_check(&self, call_id: Uuid, retry_count: u32, delay: Duration) -> Result<()>;
}
