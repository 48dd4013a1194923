//! Ops HTTP surface
//!
//! Health, Prometheus metrics, read-only call and confbridge lookups, and a
//! websocket streaming outbound notifications.

pub mod calls_handler;
pub mod metrics_handler;
pub mod router;
pub mod ws_handler;

use crate::application::CallCore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub use router::build_router;

/// Shared state of the API handlers
#[derive(Clone)]
pub struct AppState {
    pub core: Arc<CallCore>,
}

/// Envelope of every JSON response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}
