//! Call aggregate root

use crate::domain::call::action::Action;
use crate::domain::call::value_object::{CallDirection, CallStatus, CallType, HangupBy, HangupReason};
use crate::domain::shared::Address;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Call aggregate root
///
/// A call owns exactly one channel at a time (looked up in reverse by
/// channel id) and optionally a join bridge and a confbridge membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    pub id: Uuid,
    pub customer_id: Uuid,

    pub channel_id: String,
    /// Join bridge holding the call's channel and its dial-back leg
    pub bridge_id: Option<String>,

    pub flow_id: Option<Uuid>,
    pub active_flow_id: Option<Uuid>,
    /// Confbridge the call is currently a member of
    pub confbridge_id: Option<Uuid>,
    pub call_type: CallType,

    pub master_call_id: Option<Uuid>,
    pub chained_call_ids: Vec<Uuid>,

    pub recording_id: Option<Uuid>,
    pub recording_ids: Vec<Uuid>,

    pub source: Address,
    pub destination: Address,

    pub status: CallStatus,
    pub direction: CallDirection,
    pub hangup_by: HangupBy,
    pub hangup_reason: HangupReason,

    /// Flow action currently being executed
    pub action: Option<Action>,

    pub tm_create: DateTime<Utc>,
    pub tm_update: Option<DateTime<Utc>>,
    pub tm_ringing: Option<DateTime<Utc>>,
    pub tm_progressing: Option<DateTime<Utc>>,
    pub tm_hangup: Option<DateTime<Utc>>,
    pub tm_delete: Option<DateTime<Utc>>,
}

impl Call {
    /// Create a new call in `Dialing` status
    pub fn new(
        id: Uuid,
        customer_id: Uuid,
        channel_id: impl Into<String>,
        call_type: CallType,
        direction: CallDirection,
        source: Address,
        destination: Address,
    ) -> Self {
        Self {
            id,
            customer_id,
            channel_id: channel_id.into(),
            bridge_id: None,
            flow_id: None,
            active_flow_id: None,
            confbridge_id: None,
            call_type,
            master_call_id: None,
            chained_call_ids: Vec::new(),
            recording_id: None,
            recording_ids: Vec::new(),
            source,
            destination,
            status: CallStatus::Dialing,
            direction,
            hangup_by: HangupBy::None,
            hangup_reason: HangupReason::None,
            action: None,
            tm_create: Utc::now(),
            tm_update: None,
            tm_ringing: None,
            tm_progressing: None,
            tm_hangup: None,
            tm_delete: None,
        }
    }

    pub fn with_flow(mut self, flow_id: Uuid) -> Self {
        self.flow_id = Some(flow_id);
        self
    }

    pub fn with_master(mut self, master_call_id: Option<Uuid>) -> Self {
        self.master_call_id = master_call_id;
        self
    }

    /// Apply a status change if the transition table allows it
    ///
    /// Returns false, leaving the call untouched, for a rejected transition.
    pub fn apply_status(&mut self, status: CallStatus, now: DateTime<Utc>) -> bool {
        if !self.status.can_transition_to(status) {
            return false;
        }

        self.status = status;
        self.tm_update = Some(now);
        match status {
            CallStatus::Ringing => self.tm_ringing = Some(now),
            CallStatus::Progressing => self.tm_progressing = Some(now),
            CallStatus::Hangup => self.tm_hangup = Some(now),
            _ => {}
        }
        true
    }

    pub fn current_action_id(&self) -> Option<Uuid> {
        self.action.as_ref().map(|action| action.id)
    }

    pub fn is_hungup(&self) -> bool {
        self.status == CallStatus::Hangup
    }

    /// Call duration (answer to hangup)
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.tm_progressing
            .and_then(|answered| self.tm_hangup.map(|ended| ended - answered))
    }
}
