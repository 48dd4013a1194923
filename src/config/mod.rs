//! Configuration management
//!
//! Defaults are overridden by an optional TOML file and then by
//! `CALLCORE__SECTION__KEY` environment variables.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub ari: AriConfig,
    pub rpc: RpcConfig,
    pub database: DatabaseConfig,
    pub routing: RoutingConfig,
    pub health: HealthConfig,
    pub store: StoreConfig,
}

/// Ops HTTP surface (`/health`, `/metrics`)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// ARI event stream
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AriConfig {
    /// Websocket URL of the event proxy, e.g. `ws://ari-proxy:8088/events`
    pub url: String,
    /// Stasis application name
    pub application: String,
    pub reconnect_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RpcConfig {
    /// Listen address of the inbound JSON-RPC server
    pub listen: String,
    /// Telephony command proxy
    pub ari_proxy_url: String,
    /// Sibling services
    pub flow_url: String,
    pub number_url: String,
    pub conference_url: String,
    pub registrar_url: String,
    /// Address this service is reachable at for its own delayed requests
    pub self_url: String,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Empty means the in-memory store
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Platform base domain; `conference.`, `pstn.` and `<customer>.registrar.` hang off it
    pub base_domain: String,
    /// Outbound trunk for tel destinations
    pub trunk_domain: String,
    /// Dial timeout for originated channels, seconds
    pub dial_timeout_secs: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub max_retry: u32,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// How long StasisStart waits for the channel record to appear
    pub exist_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl Default for AriConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8088/events".to_string(),
            application: "callcore".to_string(),
            reconnect_delay_ms: 1000,
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9090".to_string(),
            ari_proxy_url: "http://localhost:9100".to_string(),
            flow_url: "http://localhost:9101".to_string(),
            number_url: "http://localhost:9102".to_string(),
            conference_url: "http://localhost:9103".to_string(),
            registrar_url: "http://localhost:9104".to_string(),
            self_url: "http://localhost:9090".to_string(),
            request_timeout_ms: 3000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 10,
            min_connections: 2,
            connect_timeout_secs: 5,
            idle_timeout_secs: 600,
            max_lifetime_secs: 1800,
        }
    }
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_domain: "voipbin.net".to_string(),
            trunk_domain: "sip.trunk.voipbin.net".to_string(),
            dial_timeout_secs: 30,
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            max_retry: 2,
            delay_ms: 10_000,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            exist_timeout_ms: 3000,
        }
    }
}

impl HealthConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl StoreConfig {
    pub fn exist_timeout(&self) -> Duration {
        Duration::from_millis(self.exist_timeout_ms)
    }
}

impl RoutingConfig {
    pub fn conference_domain(&self) -> String {
        format!("conference.{}", self.base_domain)
    }

    pub fn pstn_domain(&self) -> String {
        format!("pstn.{}", self.base_domain)
    }

    /// Suffix shared by every customer's registrar domain
    pub fn registrar_suffix(&self) -> String {
        format!(".registrar.{}", self.base_domain)
    }
}

impl Config {
    /// Load configuration from an optional file plus the environment
    pub fn load(path: Option<&str>) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }
        builder
            .add_source(
                config::Environment::with_prefix("CALLCORE")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?
            .try_deserialize()
    }

    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }
}
