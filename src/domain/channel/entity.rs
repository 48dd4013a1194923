//! Channel entity

use super::data::ChannelData;
use super::value_object::{ChannelDirection, ChannelState, ChannelType, HangupCause, Tech};
use crate::domain::call_quality::RtpStat;
use crate::domain::shared::{DomainError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Routing hint carried in the stasis `context` argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StasisContext {
    /// Fresh inbound call to be routed
    CallIn,
    /// Outbound leg originated by this system
    CallOut,
    /// Dial-back leg arriving at the node that owns a confbridge bridge
    ConfIn,
    /// Dial-back leg on the calling node, joins the call bridge
    CallJoin,
    /// External media / snoop leg to be placed into a bridge
    ExternalMedia,
}

impl StasisContext {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "call-in" => Some(StasisContext::CallIn),
            "call-out" => Some(StasisContext::CallOut),
            "conf-in" => Some(StasisContext::ConfIn),
            "call-join" => Some(StasisContext::CallJoin),
            "external-media" => Some(StasisContext::ExternalMedia),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StasisContext::CallIn => "call-in",
            StasisContext::CallOut => "call-out",
            StasisContext::ConfIn => "conf-in",
            StasisContext::CallJoin => "call-join",
            StasisContext::ExternalMedia => "external-media",
        }
    }
}

/// One leg of media on the telephony server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub asterisk_id: String,
    pub name: String,
    pub channel_type: ChannelType,
    pub tech: Tech,

    pub sip_call_id: String,
    pub sip_transport: String,

    pub source_name: String,
    pub source_number: String,
    pub destination_name: String,
    pub destination_number: String,

    pub state: ChannelState,
    pub data: ChannelData,

    pub stasis_name: String,
    pub stasis_data: BTreeMap<String, String>,

    pub bridge_id: Option<String>,
    pub playback_id: Option<String>,

    pub dial_result: String,
    pub hangup_cause: HangupCause,
    pub direction: ChannelDirection,
    pub rtp_stat: Option<RtpStat>,

    pub tm_create: DateTime<Utc>,
    pub tm_update: Option<DateTime<Utc>>,
    pub tm_answer: Option<DateTime<Utc>>,
    pub tm_ringing: Option<DateTime<Utc>>,
    pub tm_end: Option<DateTime<Utc>>,
    pub tm_delete: Option<DateTime<Utc>>,
}

impl Channel {
    pub fn new(id: impl Into<String>, asterisk_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: id.into(),
            asterisk_id: asterisk_id.into(),
            tech: Tech::from_channel_name(&name),
            name,
            channel_type: ChannelType::None,
            sip_call_id: String::new(),
            sip_transport: String::new(),
            source_name: String::new(),
            source_number: String::new(),
            destination_name: String::new(),
            destination_number: String::new(),
            state: ChannelState::Unknown,
            data: ChannelData::new(),
            stasis_name: String::new(),
            stasis_data: BTreeMap::new(),
            bridge_id: None,
            playback_id: None,
            dial_result: String::new(),
            hangup_cause: HangupCause::Unknown,
            direction: ChannelDirection::None,
            rtp_stat: None,
            tm_create: Utc::now(),
            tm_update: None,
            tm_answer: None,
            tm_ringing: None,
            tm_end: None,
            tm_delete: None,
        }
    }

    pub fn stasis_arg(&self, key: &str) -> Option<&str> {
        self.stasis_data
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Stasis argument holding an entity id
    pub fn stasis_uuid(&self, key: &str) -> Result<Uuid> {
        let value = self.stasis_arg(key).ok_or_else(|| {
            DomainError::ValidationError(format!("channel {} has no {} argument", self.id, key))
        })?;
        Uuid::parse_str(value).map_err(|e| {
            DomainError::ValidationError(format!("channel {} has invalid {}: {}", self.id, key, e))
        })
    }

    pub fn stasis_context(&self) -> Option<StasisContext> {
        self.stasis_arg("context").and_then(StasisContext::parse)
    }

    pub fn is_ended(&self) -> bool {
        self.tm_end.is_some()
    }
}

/// Parse stasis application arguments
///
/// ARI hands the arguments over either as a list of `key=value` items or as a
/// single comma separated string; both shapes are accepted.
pub fn parse_stasis_args<S: AsRef<str>>(args: &[S]) -> BTreeMap<String, String> {
    args.iter()
        .flat_map(|arg| arg.as_ref().split(','))
        .filter_map(|item| {
            let (key, value) = item.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_channel_parses_tech() {
        let channel = Channel::new("1589178410.123", "42:01:0a:a4:00:05", "PJSIP/call-in-00000001");
        assert_eq!(channel.tech, Tech::Pjsip);
        assert_eq!(channel.channel_type, ChannelType::None);
        assert!(!channel.is_ended());
    }

    #[test]
    fn test_parse_stasis_args() {
        let args = parse_stasis_args(&["context=call-in,domain=pstn.example.com", "source=+1555"]);
        assert_eq!(args.get("context").map(String::as_str), Some("call-in"));
        assert_eq!(args.get("domain").map(String::as_str), Some("pstn.example.com"));
        assert_eq!(args.get("source").map(String::as_str), Some("+1555"));

        let args = parse_stasis_args(&["novalue", "=x"]);
        assert!(args.is_empty());
    }

    #[test]
    fn test_stasis_context() {
        let mut channel = Channel::new("c1", "node", "PJSIP/x-1");
        assert_eq!(channel.stasis_context(), None);

        channel.stasis_data = parse_stasis_args(&["context=conf-in"]);
        assert_eq!(channel.stasis_context(), Some(StasisContext::ConfIn));

        channel.stasis_data = parse_stasis_args(&["context=bogus"]);
        assert_eq!(channel.stasis_context(), None);
    }

    #[test]
    fn test_stasis_uuid() {
        let id = Uuid::new_v4();
        let mut channel = Channel::new("c1", "node", "PJSIP/x-1");
        channel.stasis_data = parse_stasis_args(&[format!("call_id={},bridge_id=nope", id)]);

        assert_eq!(channel.stasis_uuid("call_id").unwrap(), id);
        assert!(channel.stasis_uuid("bridge_id").is_err());
        assert!(channel.stasis_uuid("confbridge_id").is_err());
    }
}
