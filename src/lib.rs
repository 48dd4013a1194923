//! callcore - call-control core of a VoIP platform
//!
//! Consumes telephony events from Asterisk nodes (ARI), keeps call, channel,
//! bridge and confbridge state in sync with them, routes incoming calls and
//! drives conferences and flows through sibling services.

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod interface;

// Re-export commonly used types
pub use domain::shared::{DomainError, Result};
