//! Events a session publishes to its subscribers.

use serde_json::Value;

use crate::{AuthenticationError, SessionId};

/// Something that happened to the session.
///
/// Delivered through [`WorkspaceSession::subscribe`](crate::WorkspaceSession::subscribe).
/// Lifecycle payloads are forwarded exactly as the server sent them.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The first authentication succeeded. Writes are open.
    Ready { session_id: SessionId },

    /// The transport dropped. Writes are closed until re-authentication.
    Disconnected { reason: String },

    /// The transport is trying to come back.
    Reconnecting { attempt: u32 },

    /// Re-authentication after a reconnect succeeded.
    Reauthenticated { session_id: SessionId },

    /// The server refused to re-authenticate after a reconnect. The session
    /// stays degraded.
    ReauthenticationFailed { error: AuthenticationError },

    /// A workspace update started. Writes are closed.
    DegradedStarted { payload: Option<Value> },

    /// The workspace update ended, successfully or not. Writes are open
    /// again unless the connection is also down.
    DegradedEnded {
        outcome: UpdateOutcome,
        payload: Option<Value>,
    },

    /// The session is over. Published at most once.
    Terminated { reason: TerminationReason },
}

/// How a workspace update ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Finished,
    Failed,
}

/// Why a session terminated.
#[derive(Debug, Clone, PartialEq)]
pub enum TerminationReason {
    /// The server destroyed the workspace room.
    RoomDestroyed { payload: Option<Value> },
    /// The owner called `disconnect`.
    Disconnected,
    /// The transport gave up reconnecting.
    ReconnectExhausted,
}
