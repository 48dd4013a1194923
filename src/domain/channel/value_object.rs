//! Channel value objects

use serde::{Deserialize, Serialize};

/// What a channel is used for inside the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    #[default]
    None,
    Call,
    Confbridge,
    Join,
    External,
    Recording,
    Application,
}

impl ChannelType {
    pub fn parse(s: &str) -> Self {
        match s {
            "call" => ChannelType::Call,
            "confbridge" => ChannelType::Confbridge,
            "join" => ChannelType::Join,
            "external" => ChannelType::External,
            "recording" => ChannelType::Recording,
            "application" => ChannelType::Application,
            _ => ChannelType::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::None => "",
            ChannelType::Call => "call",
            ChannelType::Confbridge => "confbridge",
            ChannelType::Join => "join",
            ChannelType::External => "external",
            ChannelType::Recording => "recording",
            ChannelType::Application => "application",
        }
    }
}

/// Channel technology, taken from the channel name prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tech {
    #[default]
    None,
    Pjsip,
    Sip,
    Local,
    Snoop,
    #[serde(rename = "unicastrtp")]
    UnicastRtp,
}

impl Tech {
    /// Parse the technology out of a channel name such as `PJSIP/call-in-00000001`
    pub fn from_channel_name(name: &str) -> Self {
        let prefix = match name.split_once('/') {
            Some((prefix, _)) => prefix,
            None => return Tech::None,
        };

        match prefix.to_ascii_lowercase().as_str() {
            "pjsip" => Tech::Pjsip,
            "sip" => Tech::Sip,
            "local" => Tech::Local,
            "snoop" => Tech::Snoop,
            "unicastrtp" => Tech::UnicastRtp,
            _ => Tech::None,
        }
    }
}

/// ARI channel state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ChannelState {
    Down,
    Rsrvd,
    OffHook,
    Dialing,
    Ring,
    Ringing,
    Up,
    Busy,
    #[serde(rename = "Dialing Offhook")]
    DialingOffhook,
    #[serde(rename = "Pre-ring")]
    PreRing,
    Mute,
    #[default]
    #[serde(other)]
    Unknown,
}

/// Which side originated the channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChannelDirection {
    #[default]
    None,
    Incoming,
    Outgoing,
}

impl ChannelDirection {
    pub fn parse(s: &str) -> Self {
        match s {
            "incoming" => ChannelDirection::Incoming,
            "outgoing" => ChannelDirection::Outgoing,
            _ => ChannelDirection::None,
        }
    }
}

/// Q.850 hangup cause as reported and accepted by ARI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(from = "i32", into = "i32")]
pub enum HangupCause {
    #[default]
    Unknown,
    Unallocated,
    NoRouteDestination,
    NormalClearing,
    UserBusy,
    NoAnswer,
    CallRejected,
    NetworkOutOfOrder,
    NormalTemporaryFailure,
    Interworking,
    Other(i32),
}

impl HangupCause {
    pub fn code(&self) -> i32 {
        match self {
            HangupCause::Unknown => 0,
            HangupCause::Unallocated => 1,
            HangupCause::NoRouteDestination => 3,
            HangupCause::NormalClearing => 16,
            HangupCause::UserBusy => 17,
            HangupCause::NoAnswer => 19,
            HangupCause::CallRejected => 21,
            HangupCause::NetworkOutOfOrder => 38,
            HangupCause::NormalTemporaryFailure => 41,
            HangupCause::Interworking => 127,
            HangupCause::Other(code) => *code,
        }
    }
}

impl From<i32> for HangupCause {
    fn from(code: i32) -> Self {
        match code {
            0 => HangupCause::Unknown,
            1 => HangupCause::Unallocated,
            3 => HangupCause::NoRouteDestination,
            16 => HangupCause::NormalClearing,
            17 => HangupCause::UserBusy,
            19 => HangupCause::NoAnswer,
            21 => HangupCause::CallRejected,
            38 => HangupCause::NetworkOutOfOrder,
            41 => HangupCause::NormalTemporaryFailure,
            127 => HangupCause::Interworking,
            other => HangupCause::Other(other),
        }
    }
}

impl From<HangupCause> for i32 {
    fn from(cause: HangupCause) -> Self {
        cause.code()
    }
}
