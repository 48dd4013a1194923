//! Call quality reporting
//!
//! Media gateways report per-leg quality in an `X-RTP-Stat` style header:
//!
//! ```text
//! MOS=3.8;Jitter=7;PacketLossPct=0;RTT=260682;RTPStat=RTP: 258452 bytes, 1509 packets, 0 errors; RTCP:  1248 bytes, 18 packets, 12 errors
//! ```
//!
//! Parsing is partial-tolerant: a field that fails to parse keeps its zero
//! value, and only a header with no recognizable key at all is rejected.

use serde::{Deserialize, Serialize};

/// Quality metrics parsed from an `X-RTP-Stat` header
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RtpStat {
    /// Mean Opinion Score (1.0 - 5.0)
    pub mos: f64,
    /// Jitter in milliseconds
    pub jitter: i64,
    /// Packet loss percentage (0.0 - 100.0)
    pub packet_loss_pct: f64,
    /// Round-trip time
    pub rtt: i64,

    pub rtp_bytes: i64,
    pub rtp_packets: i64,
    pub rtp_errors: i64,

    pub rtcp_bytes: i64,
    pub rtcp_packets: i64,
    pub rtcp_errors: i64,
}

impl RtpStat {
    /// Parse a header value; `None` for blank input or when nothing was recognized
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        if header.is_empty() {
            return None;
        }

        let mut stat = RtpStat::default();
        let mut recognized = false;

        // RTPStat's own value contains ';', so it is split off before the rest
        let (fields, rtp_section) = match header.find("RTPStat=") {
            Some(pos) => (&header[..pos], Some(&header[pos + "RTPStat=".len()..])),
            None => (header, None),
        };

        for field in fields.split(';') {
            let Some((key, value)) = field.split_once('=') else {
                continue;
            };
            let value = value.trim();

            match key.trim() {
                "MOS" => {
                    recognized = true;
                    stat.mos = value.parse().unwrap_or_default();
                }
                "Jitter" => {
                    recognized = true;
                    stat.jitter = value.parse().unwrap_or_default();
                }
                "PacketLossPct" => {
                    recognized = true;
                    stat.packet_loss_pct = value.parse().unwrap_or_default();
                }
                "RTT" => {
                    recognized = true;
                    stat.rtt = value.parse().unwrap_or_default();
                }
                _ => {}
            }
        }

        if let Some(section) = rtp_section {
            recognized = true;
            for part in section.split(';') {
                let part = part.trim();
                if let Some(counters) = part.strip_prefix("RTCP:") {
                    let (bytes, packets, errors) = parse_counters(counters);
                    stat.rtcp_bytes = bytes;
                    stat.rtcp_packets = packets;
                    stat.rtcp_errors = errors;
                } else if let Some(counters) = part.strip_prefix("RTP:") {
                    let (bytes, packets, errors) = parse_counters(counters);
                    stat.rtp_bytes = bytes;
                    stat.rtp_packets = packets;
                    stat.rtp_errors = errors;
                }
            }
        }

        recognized.then_some(stat)
    }
}

/// Parse `"<n> bytes, <n> packets, <n> errors"`
fn parse_counters(s: &str) -> (i64, i64, i64) {
    let mut bytes = 0;
    let mut packets = 0;
    let mut errors = 0;

    for item in s.split(',') {
        let mut words = item.split_whitespace();
        let (Some(number), Some(unit)) = (words.next(), words.next()) else {
            continue;
        };
        let number = number.parse().unwrap_or_default();
        match unit {
            "bytes" => bytes = number,
            "packets" => packets = number,
            "errors" => errors = number,
            _ => {}
        }
    }

    (bytes, packets, errors)
}
