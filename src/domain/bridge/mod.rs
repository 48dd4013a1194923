//! Bridge bounded context - mixing points on the telephony server

pub mod entity;
pub mod repository;

pub use entity::{bridge_name, parse_bridge_name, Bridge, BridgeType, ReferenceType};
pub use repository::BridgeRepository;
