//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Repository implementations (in-memory, Postgres)
//! - ARI event decoding and the event stream client
//! - JSON-RPC clients for the telephony proxy and sibling services
//! - Notification fan-out and the metrics sink

pub mod messaging;
pub mod metrics;
pub mod persistence;
pub mod protocols;
pub mod rpc;
