//! Core protocol types for the workspace channel.
//!
//! Every frame on the wire is a named event with an optional JSON payload.
//! This module defines the names and the payloads the session layer cares
//! about: authentication, application messages, and the server-pushed
//! workspace lifecycle.

use std::fmt;

use serde::de::{self, IgnoredAny, SeqAccess, Visitor};
use serde::ser::SerializeSeq;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// Wire event names. These must match the server bit for bit.
pub mod event {
    /// Client → Server: authentication request ([`AuthRequest`](crate::AuthRequest)).
    pub const AUTH_REQUEST: &str = "authenticate";
    /// Server → Client: authentication accepted. No payload.
    pub const AUTH_SUCCESS: &str = "authenticated";
    /// Server → Client: authentication rejected ([`AuthErrorPayload`](crate::AuthErrorPayload)).
    pub const AUTH_ERROR: &str = "unauthorized";
    /// Either direction: application message for the messaging runtime.
    pub const MESSAGE: &str = "message";
    /// Server → Client: the workspace room is gone for good.
    pub const ROOM_DESTROYED: &str = "room-destroyed";
    /// Server → Client: a workspace update (maintenance window) began.
    pub const UPDATE_STARTED: &str = "workspace-update-started";
    /// Server → Client: the workspace update completed.
    pub const UPDATE_FINISHED: &str = "workspace-update-finished";
    /// Server → Client: the workspace update failed.
    pub const UPDATE_FAILED: &str = "workspace-update-failed";
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One event on the wire, encoded as its argument list:
/// `["<name>"]` or `["<name>", <data>]`.
///
/// This is the body of a Socket.IO event packet; the transport adds the
/// packet header. `data` is left out when it is `null`, and defaults to
/// `null` when the server sends no argument. Arguments past the first are
/// ignored.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// The event name (see [`event`]).
    pub event: String,

    /// The event payload.
    pub data: Value,
}

impl Serialize for Frame {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let len = if self.data.is_null() { 1 } else { 2 };
        let mut seq = serializer.serialize_seq(Some(len))?;
        seq.serialize_element(&self.event)?;
        if !self.data.is_null() {
            seq.serialize_element(&self.data)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Frame {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_seq(FrameVisitor)
    }
}

struct FrameVisitor;

impl<'de> Visitor<'de> for FrameVisitor {
    type Value = Frame;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an event argument list `[name, data?]`")
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Frame, A::Error> {
        let event: String = seq
            .next_element()?
            .ok_or_else(|| de::Error::invalid_length(0, &self))?;
        let data = seq.next_element::<Value>()?.unwrap_or(Value::Null);
        while seq.next_element::<IgnoredAny>()?.is_some() {}
        Ok(Frame { event, data })
    }
}

impl Frame {
    /// A frame with no payload.
    pub fn new(event: impl Into<String>) -> Self {
        Self {
            event: event.into(),
            data: Value::Null,
        }
    }

    /// A frame carrying `data`.
    pub fn with_data(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// The payload, or `None` when the frame carried none.
    pub fn payload(&self) -> Option<&Value> {
        (!self.data.is_null()).then_some(&self.data)
    }
}

// ---------------------------------------------------------------------------
// Authentication
// ---------------------------------------------------------------------------

/// The role a client claims in its authentication request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    /// Access code only.
    AnonymousClient,
    /// Access code plus a bearer credential.
    AuthenticatedClient,
}

/// Payload of the [`event::AUTH_REQUEST`] event.
///
/// Built fresh for every negotiation and never stored. On the wire the
/// access code travels as `code` and the credential as `authToken`:
///
/// ```json
/// { "code": "ABC123", "authToken": "tok", "role": "authenticated-client" }
/// ```
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthRequest {
    /// Shared workspace access code.
    #[serde(rename = "code")]
    pub access_code: String,

    /// Bearer credential; absent for anonymous clients.
    #[serde(
        rename = "authToken",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub credential: Option<String>,

    /// The claimed role.
    pub role: Role,
}

impl AuthRequest {
    /// Builds a request, deriving the role from whether a credential is
    /// present.
    pub fn new(access_code: impl Into<String>, credential: Option<String>) -> Self {
        let role = if credential.is_some() {
            Role::AuthenticatedClient
        } else {
            Role::AnonymousClient
        };
        Self {
            access_code: access_code.into(),
            credential,
            role,
        }
    }
}

// Keeps bearer tokens out of logs.
impl fmt::Debug for AuthRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthRequest")
            .field("access_code", &self.access_code)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .field("role", &self.role)
            .finish()
    }
}

/// Payload of the [`event::AUTH_ERROR`] event.
///
/// Read leniently: the server is expected to send
/// `{"name": "...", "message": "..."}`, but any shape is accepted and the
/// missing parts are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthErrorPayload {
    /// Server-side error name, the key for error mapping.
    #[serde(default)]
    pub name: Option<String>,

    /// Human-readable detail.
    #[serde(default)]
    pub message: Option<String>,
}

impl AuthErrorPayload {
    /// Reads the payload out of a frame's data.
    pub fn from_value(data: &Value) -> Self {
        match data {
            Value::Object(map) => Self {
                name: map.get("name").and_then(Value::as_str).map(str::to_owned),
                message: map.get("message").and_then(Value::as_str).map(str::to_owned),
            },
            Value::String(message) => Self {
                name: None,
                message: Some(message.clone()),
            },
            _ => Self::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// LifecycleEvent
// ---------------------------------------------------------------------------

/// A server-pushed signal about the workspace's operational state.
///
/// Each variant keeps the server's payload (if any) so it can be
/// forwarded to session subscribers untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    /// The workspace room was destroyed. The session is no longer valid.
    RoomDestroyed { payload: Option<Value> },
    /// A workspace update started. Writes must stop.
    UpdateStarted { payload: Option<Value> },
    /// The workspace update finished. Writes may resume.
    UpdateFinished { payload: Option<Value> },
    /// The workspace update failed. Writes may resume as well.
    UpdateFailed { payload: Option<Value> },
}

impl LifecycleEvent {
    /// Recognizes a lifecycle frame. Returns `None` for any other event.
    pub fn from_frame(frame: &Frame) -> Option<Self> {
        let payload = frame.payload().cloned();
        let event = match frame.event.as_str() {
            event::ROOM_DESTROYED => Self::RoomDestroyed { payload },
            event::UPDATE_STARTED => Self::UpdateStarted { payload },
            event::UPDATE_FINISHED => Self::UpdateFinished { payload },
            event::UPDATE_FAILED => Self::UpdateFailed { payload },
            _ => return None,
        };
        Some(event)
    }

    /// The wire name of this event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::RoomDestroyed { .. } => event::ROOM_DESTROYED,
            Self::UpdateStarted { .. } => event::UPDATE_STARTED,
            Self::UpdateFinished { .. } => event::UPDATE_FINISHED,
            Self::UpdateFailed { .. } => event::UPDATE_FAILED,
        }
    }

    /// The server's payload, if it sent one.
    pub fn payload(&self) -> Option<&Value> {
        match self {
            Self::RoomDestroyed { payload }
            | Self::UpdateStarted { payload }
            | Self::UpdateFinished { payload }
            | Self::UpdateFailed { payload } => payload.as_ref(),
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
