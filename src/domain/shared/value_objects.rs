//! Shared value objects used across multiple bounded contexts

use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of party an [`Address`] points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AddressType {
    #[default]
    None,
    /// E.164 telephone number
    Tel,
    /// SIP address (user@domain)
    Sip,
    /// Agent id
    Agent,
    /// Conference id
    Conference,
    /// Registered endpoint (extension@domain)
    Endpoint,
    /// Messaging line
    Line,
}

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AddressType::None => "",
            AddressType::Tel => "tel",
            AddressType::Sip => "sip",
            AddressType::Agent => "agent",
            AddressType::Conference => "conference",
            AddressType::Endpoint => "endpoint",
            AddressType::Line => "line",
        }
    }
}

/// Source or destination of a call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Address {
    #[serde(rename = "type")]
    pub address_type: AddressType,
    pub target: String,
    #[serde(default)]
    pub target_name: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub detail: String,
}

impl Address {
    pub fn new(address_type: AddressType, target: impl Into<String>) -> Self {
        Self {
            address_type,
            target: target.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address_type.as_str(), self.target)
    }
}

/// SIP URI value object
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SipUri {
    user: String,
    host: String,
    port: Option<u16>,
}

impl SipUri {
    pub fn new(user: String, host: String, port: Option<u16>) -> Self {
        Self { user, host, port }
    }

    /// Parse `sip:user@host[:port]`, `sips:` or a bare `user@host[:port]`
    pub fn parse(uri: &str) -> Result<Self, String> {
        let uri = uri
            .strip_prefix("sips:")
            .or_else(|| uri.strip_prefix("sip:"))
            .unwrap_or(uri);

        let (user, host_port) = uri
            .split_once('@')
            .ok_or_else(|| "Invalid SIP URI format".to_string())?;

        if user.is_empty() || host_port.is_empty() {
            return Err("Invalid SIP URI format".to_string());
        }

        // drop uri parameters
        let host_port = host_port.split(';').next().unwrap_or(host_port);
        let (host, port) = match host_port.split_once(':') {
            Some((host, port)) => (host, port.parse().ok()),
            None => (host_port, None),
        };

        Ok(Self {
            user: user.to_string(),
            host: host.to_string(),
            port,
        })
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(port) = self.port {
            write!(f, "sip:{}@{}:{}", self.user, self.host, port)
        } else {
            write!(f, "sip:{}@{}", self.user, self.host)
        }
    }
}
