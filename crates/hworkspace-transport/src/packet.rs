//! Engine.IO v4 / Socket.IO v5 text packet framing.
//!
//! The workspace server runs Socket.IO. On a WebSocket every text frame is
//! one Engine.IO packet: a type digit followed by its data. Engine.IO
//! `message` packets (`4`) carry one Socket.IO packet, again a type digit
//! followed by its data. Only the main namespace is used.
//!
//! ```text
//! 0{"sid":..,"pingInterval":..,"pingTimeout":..}   open        server → client
//! 2 / 3                                            ping / pong
//! 40 / 40{"sid":".."}                              namespace connect
//! 41                                               namespace disconnect
//! 42["event",data]                                 event
//! 44{"message":".."}                               namespace connect error
//! ```
//!
//! Binary attachments and acknowledgements are not used by the workspace
//! protocol; an ack id on an inbound event is skipped.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::TransportError;

/// Namespace connect request for the main namespace.
pub(crate) const CONNECT: &str = "40";

/// Heartbeat reply.
pub(crate) const PONG: &str = "3";

/// Handshake data from the Engine.IO open packet.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct OpenPacket {
    /// Engine-level session id.
    pub sid: String,
    /// How often the server pings, in milliseconds.
    #[serde(default = "default_ping_interval")]
    pub ping_interval: u64,
    /// How long the server waits for a pong, in milliseconds.
    #[serde(default = "default_ping_timeout")]
    pub ping_timeout: u64,
}

fn default_ping_interval() -> u64 {
    25_000
}

fn default_ping_timeout() -> u64 {
    20_000
}

impl OpenPacket {
    /// How long the link may stay silent before it counts as dead.
    pub fn idle_limit(&self) -> Duration {
        Duration::from_millis(self.ping_interval.saturating_add(self.ping_timeout))
    }
}

/// One decoded text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Packet {
    Open(OpenPacket),
    Close,
    Ping,
    Pong,
    Noop,
    /// Namespace joined. Socket.IO v5 servers send the socket id.
    Connect { sid: Option<String> },
    /// Namespace left on the server's initiative.
    Disconnect,
    /// Namespace join refused.
    ConnectError(String),
    /// Event argument list, as raw JSON array text.
    Event(Vec<u8>),
    /// Anything the client does not act on, with its type for logging.
    Ignored(String),
}

/// Decodes one text frame.
///
/// # Errors
/// Returns [`TransportError::Connection`] for an empty frame, an unknown
/// packet type, or malformed handshake data.
pub(crate) fn decode(text: &str) -> Result<Packet, TransportError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| TransportError::Connection("empty packet".into()))?;
    let body = chars.as_str();

    let packet = match kind {
        '0' => Packet::Open(
            serde_json::from_str(body)
                .map_err(|e| TransportError::Connection(format!("invalid open packet: {e}")))?,
        ),
        '1' => Packet::Close,
        '2' => Packet::Ping,
        '3' => Packet::Pong,
        '4' => decode_message(body)?,
        '5' | '6' => Packet::Noop,
        other => {
            return Err(TransportError::Connection(format!(
                "unknown packet type `{other}`"
            )));
        }
    };
    Ok(packet)
}

fn decode_message(body: &str) -> Result<Packet, TransportError> {
    let mut chars = body.chars();
    let kind = chars
        .next()
        .ok_or_else(|| TransportError::Connection("empty message packet".into()))?;
    let data = chars.as_str();

    // Packets for other namespaces start with `/<nsp>,`.
    if data.starts_with('/') {
        return Ok(Packet::Ignored(format!("4{kind} (namespace)")));
    }

    let packet = match kind {
        '0' => Packet::Connect {
            sid: serde_json::from_str::<Value>(data)
                .ok()
                .and_then(|v| v.get("sid").and_then(Value::as_str).map(str::to_owned)),
        },
        '1' => Packet::Disconnect,
        '2' => {
            let args = data.trim_start_matches(|c: char| c.is_ascii_digit());
            Packet::Event(args.as_bytes().to_vec())
        }
        '4' => {
            let message = serde_json::from_str::<Value>(data)
                .ok()
                .and_then(|v| match v {
                    Value::String(message) => Some(message),
                    v => v.get("message").and_then(Value::as_str).map(str::to_owned),
                })
                .unwrap_or_else(|| "namespace connection refused".into());
            Packet::ConnectError(message)
        }
        other => Packet::Ignored(format!("4{other}")),
    };
    Ok(packet)
}

/// Wraps an event argument list into an event packet.
///
/// # Errors
/// Returns [`TransportError::InvalidFrame`] if `args` is not UTF-8 text.
pub(crate) fn encode_event(args: Vec<u8>) -> Result<String, TransportError> {
    let args = String::from_utf8(args)
        .map_err(|_| TransportError::InvalidFrame("event arguments are not UTF-8".into()))?;
    Ok(format!("42{args}"))
}
