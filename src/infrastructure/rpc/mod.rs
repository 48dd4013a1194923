//! JSON-RPC adapters

pub mod client;
pub mod error;

pub use client::{AriProxyClient, ServiceClient};
pub use error::{from_client_error, to_rpc_error};
