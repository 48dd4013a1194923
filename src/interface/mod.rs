//! Interface layer - External interfaces
//!
//! - JSON-RPC server for sibling services
//! - Ops HTTP API (health, metrics, lookups, notification websocket)

pub mod api;
pub mod rpc;
