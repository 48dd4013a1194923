//! Typed key/value bag attached to a channel
//!
//! Channels carry a small set of well-known session variables (call type,
//! direction, SIP metadata). They are set on the telephony server with the
//! `CC-` prefix and reported back through `ChannelVarset` events. Anything
//! outside the known set lands in an unknown bucket and is kept verbatim.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Variable namespace reserved for the call-control core
pub const VARIABLE_PREFIX: &str = "CC-";

/// Well-known channel data keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKey {
    Context,
    Direction,
    #[serde(rename = "sip_callid")]
    SipCallId,
    SipPai,
    SipPrivacy,
    SipTransport,
    Type,
}

impl DataKey {
    pub const ALL: [DataKey; 7] = [
        DataKey::Context,
        DataKey::Direction,
        DataKey::SipCallId,
        DataKey::SipPai,
        DataKey::SipPrivacy,
        DataKey::SipTransport,
        DataKey::Type,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataKey::Context => "context",
            DataKey::Direction => "direction",
            DataKey::SipCallId => "sip_callid",
            DataKey::SipPai => "sip_pai",
            DataKey::SipPrivacy => "sip_privacy",
            DataKey::SipTransport => "sip_transport",
            DataKey::Type => "type",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.as_str() == s)
    }

    /// Map a session variable name (`CC-SIP_CALLID`) to its key
    pub fn from_variable(name: &str) -> Option<Self> {
        let key = name.strip_prefix(VARIABLE_PREFIX)?;
        Self::parse(&key.to_ascii_lowercase())
    }

    /// Session variable name for this key
    pub fn variable_name(&self) -> String {
        format!("{}{}", VARIABLE_PREFIX, self.as_str().to_ascii_uppercase())
    }
}

/// Channel data bag
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct ChannelData {
    known: BTreeMap<DataKey, String>,
    unknown: BTreeMap<String, String>,
}

impl ChannelData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: DataKey) -> Option<&str> {
        self.known.get(&key).map(String::as_str)
    }

    pub fn set(&mut self, key: DataKey, value: impl Into<String>) {
        self.known.insert(key, value.into());
    }

    /// Insert by raw name; unrecognized names go to the unknown bucket
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        match DataKey::parse(name) {
            Some(key) => self.set(key, value),
            None => {
                self.unknown.insert(name.to_string(), value.into());
            }
        }
    }

    pub fn unknown(&self) -> &BTreeMap<String, String> {
        &self.unknown
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty() && self.unknown.is_empty()
    }
}

impl From<BTreeMap<String, String>> for ChannelData {
    fn from(map: BTreeMap<String, String>) -> Self {
        let mut data = ChannelData::new();
        for (name, value) in map {
            data.insert(&name, value);
        }
        data
    }
}

impl From<ChannelData> for BTreeMap<String, String> {
    fn from(data: ChannelData) -> Self {
        let mut map = data.unknown;
        for (key, value) in data.known {
            map.insert(key.as_str().to_string(), value);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_names() {
        assert_eq!(DataKey::SipCallId.variable_name(), "CC-SIP_CALLID");
        assert_eq!(DataKey::from_variable("CC-SIP_CALLID"), Some(DataKey::SipCallId));
        assert_eq!(DataKey::from_variable("CC-TYPE"), Some(DataKey::Type));
        assert_eq!(DataKey::from_variable("CC-UNKNOWN"), None);
        assert_eq!(DataKey::from_variable("TYPE"), None);

        for key in DataKey::ALL {
            assert_eq!(DataKey::from_variable(&key.variable_name()), Some(key));
        }
    }

    #[test]
    fn test_unknown_bucket() {
        let mut data = ChannelData::new();
        data.insert("direction", "incoming");
        data.insert("custom", "value");

        assert_eq!(data.get(DataKey::Direction), Some("incoming"));
        assert_eq!(data.unknown().get("custom").map(String::as_str), Some("value"));
    }

    #[test]
    fn test_serializes_flat() {
        let mut data = ChannelData::new();
        data.set(DataKey::SipTransport, "udp");
        data.insert("custom", "x");

        let json = serde_json::to_value(&data).unwrap();
        assert_eq!(json["sip_transport"], "udp");
        assert_eq!(json["custom"], "x");

        let decoded: ChannelData = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, data);
    }
}
