//! Inbound JSON-RPC server
//!
//! Sibling services drive calls and confbridges through these methods; the
//! delayed health probes and conference-reference clearing this service
//! sends to itself land here too. Parameters are named.

use crate::application::CallCore;
use crate::domain::call::Call;
use crate::domain::channel::HangupCause;
use crate::domain::confbridge::{Confbridge, ConfbridgeType};
use crate::domain::shared::Address;
use crate::infrastructure::rpc::to_rpc_error;
use chrono::{DateTime, Utc};
use jsonrpsee::core::RegisterMethodError;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::types::ErrorObjectOwned;
use jsonrpsee::RpcModule;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize)]
struct CallIdParams {
    call_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct CallGetsParams {
    customer_id: Uuid,
    #[serde(default)]
    size: Option<usize>,
    /// Page token: creation time of the last call of the previous page
    #[serde(default)]
    token: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct CallHangupParams {
    call_id: Uuid,
    /// Q.850 cause code, normal clearing when absent
    #[serde(default)]
    cause: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct CallCreateParams {
    customer_id: Uuid,
    flow_id: Uuid,
    #[serde(default)]
    master_call_id: Option<Uuid>,
    source: Address,
    destination: Address,
}

#[derive(Debug, Deserialize)]
struct HealthCheckParams {
    call_id: Uuid,
    #[serde(default)]
    retry_count: u32,
}

#[derive(Debug, Deserialize)]
struct ChannelHealthCheckParams {
    channel_id: String,
    #[serde(default)]
    retry_count: u32,
}

#[derive(Debug, Deserialize)]
struct ConfbridgeCreateParams {
    customer_id: Uuid,
    #[serde(rename = "type")]
    confbridge_type: ConfbridgeType,
}

#[derive(Debug, Deserialize)]
struct ConfbridgeIdParams {
    confbridge_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct ConfbridgeCallParams {
    confbridge_id: Uuid,
    call_id: Uuid,
}

type RpcResult<T> = std::result::Result<T, ErrorObjectOwned>;

/// Register every method on a module sharing the wired handlers
pub fn build_module(core: Arc<CallCore>) -> Result<RpcModule<Arc<CallCore>>, RegisterMethodError> {
    let mut module = RpcModule::new(core);

    module.register_async_method("call_get", |params, core, _| async move {
        let p: CallIdParams = params.parse()?;
        core.call.get(p.call_id).await.map_err(to_rpc_error)
    })?;

    module.register_async_method("call_gets", |params, core, _| async move {
        let p: CallGetsParams = params.parse()?;
        let calls: Vec<Call> = core
            .call
            .gets(p.customer_id, p.size.unwrap_or(DEFAULT_PAGE_SIZE), p.token)
            .await
            .map_err(to_rpc_error)?;
        RpcResult::Ok(calls)
    })?;

    module.register_async_method("call_create", |params, core, _| async move {
        let p: CallCreateParams = params.parse()?;
        core.call
            .create_outgoing(p.customer_id, p.flow_id, p.master_call_id, p.source, p.destination)
            .await
            .map_err(to_rpc_error)
    })?;

    module.register_async_method("call_hangup", |params, core, _| async move {
        let p: CallHangupParams = params.parse()?;
        let cause = p.cause.map_or(HangupCause::NormalClearing, HangupCause::from);
        core.call.hanging_up(p.call_id, cause).await.map_err(to_rpc_error)?;
        core.call.get(p.call_id).await.map_err(to_rpc_error)
    })?;

    module.register_async_method("call_remove_confbridge", |params, core, _| async move {
        let p: CallIdParams = params.parse()?;
        core.call.remove_confbridge(p.call_id).await.map_err(to_rpc_error)
    })?;

    module.register_async_method("call_health_check", |params, core, _| async move {
        let p: HealthCheckParams = params.parse()?;
        core.health
            .call_health_check(p.call_id, p.retry_count)
            .await
            .map_err(to_rpc_error)
    })?;

    module.register_async_method("call_channel_health_check", |params, core, _| async move {
        let p: ChannelHealthCheckParams = params.parse()?;
        core.health
            .channel_health_check(&p.channel_id, p.retry_count)
            .await
            .map_err(to_rpc_error)
    })?;

    module.register_async_method("confbridge_create", |params, core, _| async move {
        let p: ConfbridgeCreateParams = params.parse()?;
        let confbridge: Confbridge = core
            .confbridge
            .create(p.customer_id, p.confbridge_type)
            .await
            .map_err(to_rpc_error)?;
        RpcResult::Ok(confbridge)
    })?;

    module.register_async_method("confbridge_get", |params, core, _| async move {
        let p: ConfbridgeIdParams = params.parse()?;
        core.confbridge.get(p.confbridge_id).await.map_err(to_rpc_error)
    })?;

    module.register_async_method("confbridge_join", |params, core, _| async move {
        let p: ConfbridgeCallParams = params.parse()?;
        core.confbridge
            .join(p.confbridge_id, p.call_id)
            .await
            .map_err(to_rpc_error)
    })?;

    module.register_async_method("confbridge_kick", |params, core, _| async move {
        let p: ConfbridgeCallParams = params.parse()?;
        core.confbridge
            .kick(p.confbridge_id, p.call_id)
            .await
            .map_err(to_rpc_error)
    })?;

    module.register_async_method("confbridge_terminate", |params, core, _| async move {
        let p: ConfbridgeIdParams = params.parse()?;
        core.confbridge
            .terminate(p.confbridge_id)
            .await
            .map_err(to_rpc_error)
    })?;

    Ok(module)
}

/// Bind the server and start serving the module
pub async fn serve(listen: SocketAddr, module: RpcModule<Arc<CallCore>>) -> std::io::Result<ServerHandle> {
    let server = Server::builder().build(listen).await?;
    info!("JSON-RPC server listening on {}", server.local_addr()?);
    Ok(server.start(module))
}
