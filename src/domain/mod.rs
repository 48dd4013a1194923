//! Domain layer - Core business logic and rules
//!
//! This layer contains:
//! - Entities: calls, channels, bridges and confbridges
//! - Value Objects: statuses, types, addresses
//! - Repository Interfaces: Ports for persistence
//! - Collaborator Ports: telephony commands, sibling services, notifications

pub mod bridge;
pub mod call;
pub mod call_quality;
pub mod channel;
pub mod confbridge;
pub mod ports;
pub mod shared;

// Re-export commonly used types
pub use shared::{DomainError, Result};
