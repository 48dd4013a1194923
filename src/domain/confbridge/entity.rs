//! Confbridge entity

use crate::domain::bridge::BridgeType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfbridgeType {
    /// Exactly two parties
    Connect,
    /// N-party mixing
    Conference,
}

impl ConfbridgeType {
    /// Mixing policy of the bridge backing a confbridge of this type
    pub fn bridge_types(&self) -> Vec<BridgeType> {
        match self {
            ConfbridgeType::Connect => vec![BridgeType::Mixing, BridgeType::ProxyMedia],
            ConfbridgeType::Conference => vec![BridgeType::Mixing],
        }
    }
}

/// Logical conference / connect session backed by a bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confbridge {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub confbridge_type: ConfbridgeType,

    /// Underlying bridge, created lazily on the first join
    pub bridge_id: Option<String>,

    /// Member channel id -> call id
    pub channel_call_ids: BTreeMap<String, Uuid>,

    pub recording_id: Option<Uuid>,
    pub recording_ids: Vec<Uuid>,
    pub external_media_id: Option<Uuid>,

    pub tm_create: DateTime<Utc>,
    pub tm_update: Option<DateTime<Utc>>,
    pub tm_delete: Option<DateTime<Utc>>,
}

impl Confbridge {
    pub fn new(customer_id: Uuid, confbridge_type: ConfbridgeType) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            confbridge_type,
            bridge_id: None,
            channel_call_ids: BTreeMap::new(),
            recording_id: None,
            recording_ids: Vec::new(),
            external_media_id: None,
            tm_create: Utc::now(),
            tm_update: None,
            tm_delete: None,
        }
    }

    /// Member channel currently representing the given call
    pub fn channel_id_of(&self, call_id: Uuid) -> Option<&str> {
        self.channel_call_ids
            .iter()
            .find(|(_, member)| **member == call_id)
            .map(|(channel_id, _)| channel_id.as_str())
    }

    pub fn member_count(&self) -> usize {
        self.channel_call_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_types_by_confbridge_type() {
        assert_eq!(
            ConfbridgeType::Connect.bridge_types(),
            vec![BridgeType::Mixing, BridgeType::ProxyMedia]
        );
        assert_eq!(ConfbridgeType::Conference.bridge_types(), vec![BridgeType::Mixing]);
    }

    #[test]
    fn test_channel_id_of() {
        let mut confbridge = Confbridge::new(Uuid::new_v4(), ConfbridgeType::Connect);
        let call_id = Uuid::new_v4();
        confbridge.channel_call_ids.insert("ch-1".to_string(), call_id);

        assert_eq!(confbridge.channel_id_of(call_id), Some("ch-1"));
        assert_eq!(confbridge.channel_id_of(Uuid::new_v4()), None);
        assert_eq!(confbridge.member_count(), 1);
    }
}
