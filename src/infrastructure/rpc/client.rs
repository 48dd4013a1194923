//! JSON-RPC clients for the telephony proxy and sibling services

use super::error::from_client_error;
use crate::config::RpcConfig;
use crate::domain::bridge::BridgeType;
use crate::domain::call::Action;
use crate::domain::channel::{ChannelState, HangupCause};
use crate::domain::ports::{AriCommander, ConferenceInfo, NumberInfo, OriginateRequest, ServiceRequester};
use crate::domain::shared::{DomainError, Result};
use async_trait::async_trait;
use jsonrpsee::core::client::ClientT;
use jsonrpsee::core::params::ObjectParams;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

/// Thin wrapper issuing named-parameter requests
#[derive(Clone)]
struct RpcEndpoint {
    client: HttpClient,
}

impl RpcEndpoint {
    fn connect(url: &str, timeout: Duration) -> Result<Self> {
        let client = HttpClientBuilder::default()
            .request_timeout(timeout)
            .build(url)
            .map_err(|e| DomainError::Internal(format!("invalid rpc endpoint {}: {}", url, e)))?;
        Ok(Self { client })
    }

    async fn request<R: DeserializeOwned>(&self, method: &str, params: Value) -> Result<R> {
        let mut object = ObjectParams::new();
        if let Value::Object(map) = params {
            for (name, value) in map {
                object
                    .insert(&name, value)
                    .map_err(|e| DomainError::Internal(format!("{}: {}", method, e)))?;
            }
        }

        debug!("Sending rpc request {}", method);
        self.client
            .request(method, object)
            .await
            .map_err(|e| from_client_error(method, e))
    }

    /// Request whose result is ignored
    async fn command(&self, method: &str, params: Value) -> Result<()> {
        self.request::<Value>(method, params).await.map(|_| ())
    }
}

/// Commands to the telephony nodes, relayed by the ARI proxy
pub struct AriProxyClient {
    proxy: RpcEndpoint,
}

impl AriProxyClient {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        Ok(Self {
            proxy: RpcEndpoint::connect(
                &config.ari_proxy_url,
                Duration::from_millis(config.request_timeout_ms),
            )?,
        })
    }
}

#[derive(Deserialize)]
struct ChannelInfo {
    state: ChannelState,
}

#[async_trait]
impl AriCommander for AriProxyClient {
    async fn channel_answer(&self, asterisk_id: &str, channel_id: &str) -> Result<()> {
        self.proxy
            .command(
                "ari_channel_answer",
                json!({"asterisk_id": asterisk_id, "channel_id": channel_id}),
            )
            .await
    }

    async fn channel_ring(&self, asterisk_id: &str, channel_id: &str) -> Result<()> {
        self.proxy
            .command(
                "ari_channel_ring",
                json!({"asterisk_id": asterisk_id, "channel_id": channel_id}),
            )
            .await
    }

    async fn channel_hangup(&self, asterisk_id: &str, channel_id: &str, cause: HangupCause) -> Result<()> {
        self.proxy
            .command(
                "ari_channel_hangup",
                json!({"asterisk_id": asterisk_id, "channel_id": channel_id, "cause": cause.code()}),
            )
            .await
    }

    async fn channel_get(&self, asterisk_id: &str, channel_id: &str) -> Result<ChannelState> {
        let info: ChannelInfo = self
            .proxy
            .request(
                "ari_channel_get",
                json!({"asterisk_id": asterisk_id, "channel_id": channel_id}),
            )
            .await?;
        Ok(info.state)
    }

    async fn channel_create(&self, request: &OriginateRequest) -> Result<()> {
        let params = serde_json::to_value(request)
            .map_err(|e| DomainError::Internal(format!("originate request: {}", e)))?;
        self.proxy.command("ari_channel_create", params).await
    }

    async fn channel_variable_set(
        &self,
        asterisk_id: &str,
        channel_id: &str,
        variable: &str,
        value: &str,
    ) -> Result<()> {
        self.proxy
            .command(
                "ari_channel_variable_set",
                json!({
                    "asterisk_id": asterisk_id,
                    "channel_id": channel_id,
                    "variable": variable,
                    "value": value,
                }),
            )
            .await
    }

    async fn channel_play(
        &self,
        asterisk_id: &str,
        channel_id: &str,
        playback_id: &str,
        medias: &[String],
    ) -> Result<()> {
        self.proxy
            .command(
                "ari_channel_play",
                json!({
                    "asterisk_id": asterisk_id,
                    "channel_id": channel_id,
                    "playback_id": playback_id,
                    "medias": medias,
                }),
            )
            .await
    }

    async fn bridge_create(
        &self,
        asterisk_id: &str,
        bridge_id: &str,
        name: &str,
        types: &[BridgeType],
    ) -> Result<()> {
        self.proxy
            .command(
                "ari_bridge_create",
                json!({
                    "asterisk_id": asterisk_id,
                    "bridge_id": bridge_id,
                    "name": name,
                    "type": BridgeType::join_list(types),
                }),
            )
            .await
    }

    async fn bridge_delete(&self, asterisk_id: &str, bridge_id: &str) -> Result<()> {
        self.proxy
            .command(
                "ari_bridge_delete",
                json!({"asterisk_id": asterisk_id, "bridge_id": bridge_id}),
            )
            .await
    }

    async fn bridge_add_channel(&self, asterisk_id: &str, bridge_id: &str, channel_id: &str) -> Result<()> {
        self.proxy
            .command(
                "ari_bridge_add_channel",
                json!({"asterisk_id": asterisk_id, "bridge_id": bridge_id, "channel_id": channel_id}),
            )
            .await
    }

    async fn bridge_remove_channel(&self, asterisk_id: &str, bridge_id: &str, channel_id: &str) -> Result<()> {
        self.proxy
            .command(
                "ari_bridge_remove_channel",
                json!({"asterisk_id": asterisk_id, "bridge_id": bridge_id, "channel_id": channel_id}),
            )
            .await
    }
}

/// Requests towards sibling services and this service's own RPC server
pub struct ServiceClient {
    flow: RpcEndpoint,
    number: RpcEndpoint,
    conference: RpcEndpoint,
    registrar: RpcEndpoint,
    ari_proxy: RpcEndpoint,
    callcore: RpcEndpoint,
}

#[derive(Deserialize)]
struct Created {
    id: Uuid,
}

impl ServiceClient {
    pub fn new(config: &RpcConfig) -> Result<Self> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        Ok(Self {
            flow: RpcEndpoint::connect(&config.flow_url, timeout)?,
            number: RpcEndpoint::connect(&config.number_url, timeout)?,
            conference: RpcEndpoint::connect(&config.conference_url, timeout)?,
            registrar: RpcEndpoint::connect(&config.registrar_url, timeout)?,
            ari_proxy: RpcEndpoint::connect(&config.ari_proxy_url, timeout)?,
            callcore: RpcEndpoint::connect(&config.self_url, timeout)?,
        })
    }

    /// Send a request to ourselves after `delay` on a detached task
    ///
    /// Delivery is at most once; a failure is only logged.
    fn send_delayed(&self, method: &'static str, params: Value, delay: Duration) {
        let endpoint = self.callcore.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Err(e) = endpoint.command(method, params).await {
                error!("Delayed request {} failed: {}", method, e);
            }
        });
    }
}

#[async_trait]
impl ServiceRequester for ServiceClient {
    async fn flow_create_temporary(&self, customer_id: Uuid, actions: Vec<Action>) -> Result<Uuid> {
        let created: Created = self
            .flow
            .request(
                "flow_create",
                json!({
                    "customer_id": customer_id,
                    "type": "flow",
                    "persist": false,
                    "actions": actions,
                }),
            )
            .await?;
        Ok(created.id)
    }

    async fn active_flow_create(&self, call_id: Uuid, flow_id: Uuid) -> Result<Uuid> {
        let created: Created = self
            .flow
            .request(
                "activeflow_create",
                json!({"reference_type": "call", "reference_id": call_id, "flow_id": flow_id}),
            )
            .await?;
        Ok(created.id)
    }

    async fn active_flow_action_next(
        &self,
        active_flow_id: Uuid,
        current_action_id: Option<Uuid>,
    ) -> Result<Option<Action>> {
        self.flow
            .request(
                "activeflow_action_next",
                json!({"active_flow_id": active_flow_id, "current_action_id": current_action_id}),
            )
            .await
    }

    async fn number_get_by_number(&self, number: &str) -> Result<NumberInfo> {
        self.number
            .request("number_get_by_number", json!({"number": number}))
            .await
    }

    async fn conference_get(&self, conference_id: Uuid) -> Result<ConferenceInfo> {
        self.conference
            .request("conference_get", json!({"id": conference_id}))
            .await
    }

    async fn registrar_contacts_get(&self, customer_id: Uuid, extension: &str) -> Result<Vec<String>> {
        self.registrar
            .request(
                "contacts_get",
                json!({"customer_id": customer_id, "extension": extension}),
            )
            .await
    }

    async fn asterisk_address_internal(&self, asterisk_id: &str) -> Result<String> {
        self.ari_proxy
            .request("asterisk_address_internal", json!({"asterisk_id": asterisk_id}))
            .await
    }

    async fn call_remove_confbridge(&self, call_id: Uuid) -> Result<()> {
        self.callcore
            .command("call_remove_confbridge", json!({"call_id": call_id}))
            .await
    }

    async fn call_channel_health_check(&self, channel_id: &str, retry_count: u32, delay: Duration) -> Result<()> {
        self.send_delayed(
            "call_channel_health_check",
            json!({"channel_id": channel_id, "retry_count": retry_count}),
            delay,
        );
        Ok(())
    }

    async fn call_health_check(&self, call_id: Uuid, retry_count: u32, delay: Duration) -> Result<()> {
        self.send_delayed(
            "call_health_check",
            json!({"call_id": call_id, "retry_count": retry_count}),
            delay,
        );
        Ok(())
    }
}
