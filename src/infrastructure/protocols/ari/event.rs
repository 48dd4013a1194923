//! ARI event types
//!
//! Events arrive as JSON objects discriminated by `type`. Each payload carries
//! the owning node id, the stasis application and a timestamp such as
//! `2020-04-19T14:38:00.363+0000`.

use crate::domain::bridge::{Bridge, BridgeType};
use crate::domain::channel::{Channel, ChannelData, ChannelState, DataKey};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f%z";

/// Parse an ARI timestamp into UTC
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_str(s, TIMESTAMP_FORMAT)
        .or_else(|_| DateTime::parse_from_rfc3339(s))
        .ok()
        .map(|ts| ts.with_timezone(&Utc))
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp: {}", raw)))
}

fn default_timestamp() -> DateTime<Utc> {
    Utc::now()
}

/// Fields common to every event
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventHeader {
    #[serde(default)]
    pub asterisk_id: String,
    #[serde(default)]
    pub application: String,
    #[serde(default = "default_timestamp", deserialize_with = "deserialize_timestamp")]
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct CallerId {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub number: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct DialplanCep {
    #[serde(default)]
    pub context: String,
    #[serde(default)]
    pub exten: String,
    #[serde(default)]
    pub priority: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AriChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: ChannelState,
    #[serde(default)]
    pub caller: CallerId,
    #[serde(default)]
    pub connected: CallerId,
    #[serde(default)]
    pub dialplan: DialplanCep,
    #[serde(default)]
    pub channelvars: BTreeMap<String, String>,
}

impl AriChannel {
    /// Build a channel record as first seen on `asterisk_id`
    pub fn to_channel(&self, asterisk_id: &str, timestamp: DateTime<Utc>) -> Channel {
        let mut channel = Channel::new(self.id.as_str(), asterisk_id, self.name.as_str());
        channel.state = self.state;
        channel.source_name = self.caller.name.clone();
        channel.source_number = self.caller.number.clone();
        channel.destination_name = self.connected.name.clone();
        channel.destination_number = self.dialplan.exten.clone();

        let mut data = ChannelData::new();
        for (name, value) in &self.channelvars {
            match DataKey::from_variable(name) {
                Some(key) => data.set(key, value.as_str()),
                None => data.insert(name, value.as_str()),
            }
        }
        channel.data = data;

        channel.tm_create = timestamp;
        if self.state == ChannelState::Up {
            channel.tm_answer = Some(timestamp);
        }
        channel
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AriBridge {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub technology: String,
    #[serde(default)]
    pub bridge_type: String,
    #[serde(default)]
    pub bridge_class: String,
    #[serde(default)]
    pub creator: String,
    #[serde(default)]
    pub video_mode: String,
    #[serde(default)]
    pub video_source_id: String,
    #[serde(default)]
    pub channels: Vec<String>,
}

impl AriBridge {
    pub fn to_bridge(&self, asterisk_id: &str, timestamp: DateTime<Utc>) -> Bridge {
        let mut bridge = Bridge::new(self.id.as_str(), asterisk_id, self.name.as_str());
        bridge.bridge_type = BridgeType::parse_list(&self.bridge_type);
        bridge.tech = self.technology.clone();
        bridge.class = self.bridge_class.clone();
        bridge.creator = self.creator.clone();
        bridge.video_mode = self.video_mode.clone();
        bridge.video_source_id = self.video_source_id.clone();
        bridge.channel_ids = self.channels.clone();
        bridge.tm_create = timestamp;
        bridge
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AriPlayback {
    pub id: String,
    #[serde(default)]
    pub media_uri: String,
    /// `channel:<id>` or `bridge:<id>`
    #[serde(default)]
    pub target_uri: String,
    #[serde(default)]
    pub state: String,
}

impl AriPlayback {
    /// Channel the playback runs on, if it targets a channel
    pub fn channel_id(&self) -> Option<&str> {
        self.target_uri.strip_prefix("channel:")
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AriRecording {
    /// `<reference_type>_<reference_id>_<recording_id>`
    pub name: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub target_uri: String,
    #[serde(default)]
    pub duration: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AriEndpoint {
    #[serde(default)]
    pub technology: String,
    #[serde(default)]
    pub resource: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AriContactInfo {
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub contact_status: String,
    #[serde(default)]
    pub aor: String,
    #[serde(default)]
    pub roundtrip_usec: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BridgeEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub bridge: AriBridge,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub channel: AriChannel,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelDestroyed {
    #[serde(flatten)]
    pub header: EventHeader,
    #[serde(default)]
    pub cause: i32,
    #[serde(default)]
    pub cause_txt: String,
    pub channel: AriChannel,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelVarset {
    #[serde(flatten)]
    pub header: EventHeader,
    pub variable: String,
    #[serde(default)]
    pub value: String,
    /// Absent for global variables
    pub channel: Option<AriChannel>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelBridgeEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub bridge: AriBridge,
    pub channel: AriChannel,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ChannelDtmfReceived {
    #[serde(flatten)]
    pub header: EventHeader,
    pub digit: String,
    #[serde(default)]
    pub duration_ms: i64,
    pub channel: AriChannel,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StasisStart {
    #[serde(flatten)]
    pub header: EventHeader,
    #[serde(default)]
    pub args: Vec<String>,
    pub channel: AriChannel,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PlaybackEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub playback: AriPlayback,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordingEvent {
    #[serde(flatten)]
    pub header: EventHeader,
    pub recording: AriRecording,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ContactStatusChange {
    #[serde(flatten)]
    pub header: EventHeader,
    pub endpoint: AriEndpoint,
    pub contact_info: AriContactInfo,
}

/// Decoded ARI event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum AriEvent {
    BridgeCreated(BridgeEvent),
    BridgeDestroyed(BridgeEvent),
    ChannelCreated(ChannelEvent),
    ChannelDestroyed(ChannelDestroyed),
    ChannelStateChange(ChannelEvent),
    ChannelVarset(ChannelVarset),
    ChannelEnteredBridge(ChannelBridgeEvent),
    ChannelLeftBridge(ChannelBridgeEvent),
    ChannelDtmfReceived(ChannelDtmfReceived),
    StasisStart(StasisStart),
    StasisEnd(ChannelEvent),
    PlaybackStarted(PlaybackEvent),
    PlaybackFinished(PlaybackEvent),
    RecordingStarted(RecordingEvent),
    RecordingFinished(RecordingEvent),
    ContactStatusChange(ContactStatusChange),
    #[serde(other)]
    Unknown,
}

impl AriEvent {
    pub fn parse(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    /// Event type name, used for logs and metric labels
    pub fn name(&self) -> &'static str {
        match self {
            AriEvent::BridgeCreated(_) => "BridgeCreated",
            AriEvent::BridgeDestroyed(_) => "BridgeDestroyed",
            AriEvent::ChannelCreated(_) => "ChannelCreated",
            AriEvent::ChannelDestroyed(_) => "ChannelDestroyed",
            AriEvent::ChannelStateChange(_) => "ChannelStateChange",
            AriEvent::ChannelVarset(_) => "ChannelVarset",
            AriEvent::ChannelEnteredBridge(_) => "ChannelEnteredBridge",
            AriEvent::ChannelLeftBridge(_) => "ChannelLeftBridge",
            AriEvent::ChannelDtmfReceived(_) => "ChannelDtmfReceived",
            AriEvent::StasisStart(_) => "StasisStart",
            AriEvent::StasisEnd(_) => "StasisEnd",
            AriEvent::PlaybackStarted(_) => "PlaybackStarted",
            AriEvent::PlaybackFinished(_) => "PlaybackFinished",
            AriEvent::RecordingStarted(_) => "RecordingStarted",
            AriEvent::RecordingFinished(_) => "RecordingFinished",
            AriEvent::ContactStatusChange(_) => "ContactStatusChange",
            AriEvent::Unknown => "Unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::bridge::ReferenceType;
    use crate::domain::channel::Tech;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2020-04-19T14:38:00.363+0000").unwrap();
        assert_eq!(ts.year(), 2020);
        assert_eq!(ts.hour(), 14);
        assert_eq!(ts.nanosecond(), 363_000_000);

        let shifted = parse_timestamp("2020-04-19T16:38:00.363+0200").unwrap();
        assert_eq!(shifted, ts);

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_parse_stasis_start() {
        let raw = br#"{
            "type": "StasisStart",
            "timestamp": "2020-04-19T14:38:00.363+0000",
            "args": ["context=call-in,domain=pstn.voipbin.net,source=+15550001,destination=+15550002"],
            "channel": {
                "id": "1587307080.49",
                "name": "PJSIP/call-in-00000031",
                "state": "Ring",
                "caller": {"name": "", "number": "+15550001"},
                "connected": {"name": "", "number": ""},
                "accountcode": "",
                "dialplan": {"context": "call-in", "exten": "+15550002", "priority": 2},
                "creationtime": "2020-04-19T14:38:00.362+0000",
                "language": "en"
            },
            "asterisk_id": "42:01:0a:a4:00:05",
            "application": "voipbin"
        }"#;

        let event = AriEvent::parse(raw).unwrap();
        let AriEvent::StasisStart(start) = event else {
            panic!("unexpected event");
        };
        assert_eq!(start.header.asterisk_id, "42:01:0a:a4:00:05");
        assert_eq!(start.header.application, "voipbin");
        assert_eq!(start.channel.state, ChannelState::Ring);
        assert_eq!(start.args.len(), 1);

        let channel = start.channel.to_channel(&start.header.asterisk_id, start.header.timestamp);
        assert_eq!(channel.tech, Tech::Pjsip);
        assert_eq!(channel.source_number, "+15550001");
        assert_eq!(channel.destination_number, "+15550002");
    }

    #[test]
    fn test_parse_channel_destroyed() {
        let raw = br#"{
            "type": "ChannelDestroyed",
            "timestamp": "2020-04-19T14:38:10.000+0000",
            "cause": 16,
            "cause_txt": "Normal Clearing",
            "channel": {"id": "1587307080.49", "name": "PJSIP/call-in-00000031", "state": "Up"},
            "asterisk_id": "42:01:0a:a4:00:05",
            "application": "voipbin"
        }"#;

        match AriEvent::parse(raw).unwrap() {
            AriEvent::ChannelDestroyed(destroyed) => {
                assert_eq!(destroyed.cause, 16);
                assert_eq!(destroyed.channel.state, ChannelState::Up);
            }
            other => panic!("unexpected event {}", other.name()),
        }
    }

    #[test]
    fn test_parse_bridge_created() {
        let raw = br#"{
            "type": "BridgeCreated",
            "timestamp": "2020-04-19T14:38:00.363+0000",
            "bridge": {
                "id": "b5f5e0a2-0e8f-11eb-9a1b-2f0d5d9f3e1a",
                "technology": "simple_bridge",
                "bridge_type": "mixing,proxy_media",
                "bridge_class": "stasis",
                "creator": "Stasis",
                "name": "reference_type=confbridge,reference_id=b1f1a0c8-0e8f-11eb-9f6d-8b6c0a6a9b7e",
                "channels": [],
                "video_mode": "talker"
            },
            "asterisk_id": "42:01:0a:a4:00:05",
            "application": "voipbin"
        }"#;

        let AriEvent::BridgeCreated(created) = AriEvent::parse(raw).unwrap() else {
            panic!("unexpected event");
        };
        let bridge = created.bridge.to_bridge(&created.header.asterisk_id, created.header.timestamp);
        assert_eq!(bridge.bridge_type, vec![BridgeType::Mixing, BridgeType::ProxyMedia]);
        assert_eq!(bridge.reference_type, ReferenceType::Confbridge);
        assert!(bridge.reference_id.is_some());
    }

    #[test]
    fn test_parse_playback_target() {
        let raw = br#"{
            "type": "PlaybackFinished",
            "timestamp": "2020-04-19T14:38:00.363+0000",
            "playback": {"id": "p-1", "media_uri": "sound:hello", "target_uri": "channel:1587307080.49", "state": "done"},
            "asterisk_id": "node",
            "application": "voipbin"
        }"#;

        let AriEvent::PlaybackFinished(finished) = AriEvent::parse(raw).unwrap() else {
            panic!("unexpected event");
        };
        assert_eq!(finished.playback.channel_id(), Some("1587307080.49"));
    }

    #[test]
    fn test_unknown_event_type() {
        let raw = br#"{"type": "DeviceStateChanged", "application": "voipbin", "device_state": {}}"#;
        assert_eq!(AriEvent::parse(raw).unwrap(), AriEvent::Unknown);
    }

    #[test]
    fn test_malformed_event() {
        assert!(AriEvent::parse(b"{\"type\": \"ChannelCreated\"}").is_err());
        assert!(AriEvent::parse(b"not json").is_err());
    }
}
