//! Notification event tags published by the call-control core

use serde::{Deserialize, Serialize};
use std::fmt;

/// Event type tag carried by every published notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    CallCreated,
    CallUpdated,
    CallRinging,
    CallProgressing,
    CallHangup,
    CallDtmfReceived,
    ConfbridgeCreated,
    ConfbridgeJoined,
    ConfbridgeLeaved,
    ConfbridgeDeleted,
    RecordingStarted,
    RecordingFinished,
    ContactStatusChanged,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::CallCreated => "call_created",
            EventType::CallUpdated => "call_updated",
            EventType::CallRinging => "call_ringing",
            EventType::CallProgressing => "call_progressing",
            EventType::CallHangup => "call_hangup",
            EventType::CallDtmfReceived => "call_dtmf_received",
            EventType::ConfbridgeCreated => "confbridge_created",
            EventType::ConfbridgeJoined => "confbridge_joined",
            EventType::ConfbridgeLeaved => "confbridge_leaved",
            EventType::ConfbridgeDeleted => "confbridge_deleted",
            EventType::RecordingStarted => "recording_started",
            EventType::RecordingFinished => "recording_finished",
            EventType::ContactStatusChanged => "contact_status_changed",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_matches_serde_tag() {
        for event_type in [
            EventType::CallHangup,
            EventType::ConfbridgeLeaved,
            EventType::ContactStatusChanged,
        ] {
            let json = serde_json::to_value(event_type).unwrap();
            assert_eq!(json, event_type.as_str());
        }
    }
}
