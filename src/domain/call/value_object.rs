//! Call value objects

use crate::domain::channel::ChannelState;
use serde::{Deserialize, Serialize};

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Call arrived from outside
    Incoming,
    /// Call originated by this system
    Outgoing,
}

/// What kind of session the call is executing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CallType {
    /// Runs a call flow
    Flow,
    /// Joins a conference
    Conference,
    /// Built-in SIP service
    SipService,
}

/// Call status
///
/// Starts at `Dialing`, ends at `Hangup`; only forward moves from the
/// transition table are applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Dialing,
    Ringing,
    Progressing,
    Terminating,
    Canceling,
    Hangup,
}

impl CallStatus {
    pub const ALL: [CallStatus; 6] = [
        CallStatus::Dialing,
        CallStatus::Ringing,
        CallStatus::Progressing,
        CallStatus::Terminating,
        CallStatus::Canceling,
        CallStatus::Hangup,
    ];

    /// Check if state transition is valid
    pub fn can_transition_to(&self, new_status: CallStatus) -> bool {
        use CallStatus::*;

        match (self, new_status) {
            // From Dialing
            (Dialing, Ringing | Progressing | Terminating | Canceling | Hangup) => true,

            // From Ringing
            (Ringing, Progressing | Terminating | Canceling | Hangup) => true,

            // From Progressing
            (Progressing, Terminating | Hangup) => true,

            // From Terminating / Canceling
            (Terminating, Hangup) => true,
            (Canceling, Hangup) => true,

            // Self transitions and anything out of Hangup
            _ => false,
        }
    }

    /// Status implied by a telephony channel state
    pub fn from_channel_state(state: ChannelState) -> Self {
        match state {
            ChannelState::Up | ChannelState::Mute => CallStatus::Progressing,
            ChannelState::Ring | ChannelState::Ringing => CallStatus::Ringing,
            _ => CallStatus::Dialing,
        }
    }

    /// Hangup reason when the call ends while in this status
    ///
    /// Busy / timeout / no-answer are not distinguished: any end before the
    /// call was answered, unless it was being canceled, counts as failed.
    pub fn hangup_reason(&self) -> HangupReason {
        match self {
            CallStatus::Progressing | CallStatus::Terminating | CallStatus::Hangup => {
                HangupReason::Normal
            }
            CallStatus::Canceling => HangupReason::Canceled,
            CallStatus::Dialing | CallStatus::Ringing => HangupReason::Failed,
        }
    }

    /// Which side owns the hangup when the call ends while in this status
    pub fn hangup_by(&self) -> HangupBy {
        match self {
            CallStatus::Terminating | CallStatus::Canceling => HangupBy::Local,
            CallStatus::Dialing
            | CallStatus::Ringing
            | CallStatus::Progressing
            | CallStatus::Hangup => HangupBy::Remote,
        }
    }

    /// Status a local teardown request moves to: unanswered calls are canceled
    pub fn teardown_status(&self) -> CallStatus {
        match self {
            CallStatus::Dialing | CallStatus::Ringing => CallStatus::Canceling,
            _ => CallStatus::Terminating,
        }
    }

    pub fn is_tearing_down(&self) -> bool {
        matches!(
            self,
            CallStatus::Terminating | CallStatus::Canceling | CallStatus::Hangup
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Dialing => "dialing",
            CallStatus::Ringing => "ringing",
            CallStatus::Progressing => "progressing",
            CallStatus::Terminating => "terminating",
            CallStatus::Canceling => "canceling",
            CallStatus::Hangup => "hangup",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HangupBy {
    #[default]
    None,
    Remote,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HangupReason {
    #[default]
    None,
    Normal,
    Canceled,
    Failed,
}

impl HangupReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            HangupReason::None => "",
            HangupReason::Normal => "normal",
            HangupReason::Canceled => "canceled",
            HangupReason::Failed => "failed",
        }
    }
}
