//! Bridge entity

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Mixing policy of a bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeType {
    Mixing,
    ProxyMedia,
    Holding,
    Dtmf,
}

impl BridgeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeType::Mixing => "mixing",
            BridgeType::ProxyMedia => "proxy_media",
            BridgeType::Holding => "holding",
            BridgeType::Dtmf => "dtmf_events",
        }
    }

    /// Parse ARI's comma separated `bridge_type` field
    pub fn parse_list(s: &str) -> Vec<BridgeType> {
        s.split(',')
            .filter_map(|item| match item.trim() {
                "mixing" => Some(BridgeType::Mixing),
                "proxy_media" => Some(BridgeType::ProxyMedia),
                "holding" => Some(BridgeType::Holding),
                "dtmf_events" => Some(BridgeType::Dtmf),
                _ => None,
            })
            .collect()
    }

    pub fn join_list(types: &[BridgeType]) -> String {
        types
            .iter()
            .map(BridgeType::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// What a bridge is used for; drives dispatch when a channel leaves it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceType {
    #[default]
    Unknown,
    Call,
    CallSnoop,
    Confbridge,
    ConfbridgeSnoop,
}

impl ReferenceType {
    pub fn parse(s: &str) -> Self {
        match s {
            "call" => ReferenceType::Call,
            "call-snoop" => ReferenceType::CallSnoop,
            "confbridge" => ReferenceType::Confbridge,
            "confbridge-snoop" => ReferenceType::ConfbridgeSnoop,
            _ => ReferenceType::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Unknown => "",
            ReferenceType::Call => "call",
            ReferenceType::CallSnoop => "call-snoop",
            ReferenceType::Confbridge => "confbridge",
            ReferenceType::ConfbridgeSnoop => "confbridge-snoop",
        }
    }

    pub fn is_call(&self) -> bool {
        matches!(self, ReferenceType::Call | ReferenceType::CallSnoop)
    }

    pub fn is_confbridge(&self) -> bool {
        matches!(self, ReferenceType::Confbridge | ReferenceType::ConfbridgeSnoop)
    }
}

/// A mixing point on the telephony server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bridge {
    pub id: String,
    pub asterisk_id: String,
    pub name: String,

    pub bridge_type: Vec<BridgeType>,
    pub tech: String,
    pub class: String,
    pub creator: String,
    pub video_mode: String,
    pub video_source_id: String,

    pub channel_ids: Vec<String>,

    pub reference_type: ReferenceType,
    pub reference_id: Option<Uuid>,

    pub tm_create: DateTime<Utc>,
    pub tm_update: Option<DateTime<Utc>>,
    pub tm_delete: Option<DateTime<Utc>>,
}

impl Bridge {
    pub fn new(id: impl Into<String>, asterisk_id: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        let (reference_type, reference_id) = parse_bridge_name(&name);
        Self {
            id: id.into(),
            asterisk_id: asterisk_id.into(),
            name,
            bridge_type: Vec::new(),
            tech: String::new(),
            class: String::new(),
            creator: String::new(),
            video_mode: String::new(),
            video_source_id: String::new(),
            channel_ids: Vec::new(),
            reference_type,
            reference_id,
            tm_create: Utc::now(),
            tm_update: None,
            tm_delete: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.tm_delete.is_some()
    }
}

/// Name given to a bridge so its purpose survives the round trip through ARI
pub fn bridge_name(reference_type: ReferenceType, reference_id: Uuid) -> String {
    format!(
        "reference_type={},reference_id={}",
        reference_type.as_str(),
        reference_id
    )
}

/// Inverse of [`bridge_name`]; unknown names map to `ReferenceType::Unknown`
pub fn parse_bridge_name(name: &str) -> (ReferenceType, Option<Uuid>) {
    let mut reference_type = ReferenceType::Unknown;
    let mut reference_id = None;

    for item in name.split(',') {
        match item.split_once('=') {
            Some(("reference_type", value)) => reference_type = ReferenceType::parse(value.trim()),
            Some(("reference_id", value)) => reference_id = Uuid::parse_str(value.trim()).ok(),
            _ => {}
        }
    }

    (reference_type, reference_id)
}
