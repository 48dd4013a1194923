//! Flow actions executed by a call

use crate::domain::shared::{Address, DomainError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Answer,
    ConfbridgeJoin,
    ConferenceJoin,
    Connect,
    Hangup,
    Play,
    /// Action executed by another service; a call cannot run it
    #[serde(other)]
    Unsupported,
}

/// Step of a call flow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    #[serde(default)]
    pub option: serde_json::Value,
}

impl Action {
    pub fn new<T: Serialize>(action_type: ActionType, option: &T) -> Result<Self> {
        let option = serde_json::to_value(option)
            .map_err(|e| DomainError::ValidationError(format!("action option: {}", e)))?;
        Ok(Self {
            id: Uuid::new_v4(),
            action_type,
            option,
        })
    }

    /// Decode the option payload for this action
    pub fn parse_option<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.option.clone()).map_err(|e| {
            DomainError::ValidationError(format!(
                "could not parse {:?} option: {}",
                self.action_type, e
            ))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfbridgeJoinOption {
    pub confbridge_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConferenceJoinOption {
    pub conference_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectOption {
    pub source: Address,
    pub destinations: Vec<Address>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlayOption {
    pub stream_urls: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::AddressType;

    #[test]
    fn test_option_roundtrip() {
        let option = ConnectOption {
            source: Address::new(AddressType::Tel, "+15550001"),
            destinations: vec![Address::new(AddressType::Agent, Uuid::new_v4().to_string())],
        };
        let action = Action::new(ActionType::Connect, &option).unwrap();
        assert_eq!(action.parse_option::<ConnectOption>().unwrap(), option);
    }

    #[test]
    fn test_malformed_option() {
        let action = Action {
            id: Uuid::new_v4(),
            action_type: ActionType::ConfbridgeJoin,
            option: serde_json::json!({"confbridge_id": "nope"}),
        };
        let err = action.parse_option::<ConfbridgeJoinOption>().unwrap_err();
        assert!(matches!(err, DomainError::ValidationError(_)));
    }

    #[test]
    fn test_action_type_serde() {
        let json = serde_json::json!({"id": Uuid::nil(), "type": "confbridge_join"});
        let action: Action = serde_json::from_value(json).unwrap();
        assert_eq!(action.action_type, ActionType::ConfbridgeJoin);
        assert!(action.option.is_null());
    }

    #[test]
    fn test_unknown_action_type() {
        let json = serde_json::json!({"id": Uuid::nil(), "type": "talk"});
        let action: Action = serde_json::from_value(json).unwrap();
        assert_eq!(action.action_type, ActionType::Unsupported);
    }
}
