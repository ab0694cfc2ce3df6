//! Authentication and session lifecycle for hworkspace clients.
//!
//! This crate turns a raw transport channel into an authenticated
//! workspace session:
//!
//! 1. **Authentication**: one request/answer negotiation per transport
//!    ([`Negotiator`]), repeated after every reconnect
//! 2. **State**: the connection state machine and the write gate
//!    ([`SessionCore`], [`ConnectionState`])
//! 3. **Messaging bridge**: the [`MessageSink`] / [`MessageHandler`] pair a
//!    messaging runtime plugs into
//!
//! # How it fits in the stack
//!
//! ```text
//! Client facade (above)  ← builds sessions from a server URI and credentials
//!     ↕
//! Session Layer (this crate)  ← authentication, state, lifecycle events
//!     ↕
//! Protocol Layer  ← frames, event names, auth payloads
//!     ↕
//! Transport Layer (below)  ← channel, reconnection
//! ```

pub mod auth;
mod bridge;
mod control;
mod error;
mod events;
mod identity;
mod session;
mod state;

pub use auth::Negotiator;
pub use bridge::{MessageHandler, MessageSink};
pub use control::ControlPlaneContext;
pub use error::{AuthenticationError, SessionError};
pub use events::{SessionEvent, TerminationReason, UpdateOutcome};
pub use identity::{Identity, SessionId};
pub use session::WorkspaceSession;
pub use state::{ConnectionState, DegradeCause, SessionConfig, SessionCore};
