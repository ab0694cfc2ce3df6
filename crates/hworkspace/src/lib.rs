//! # hworkspace
//!
//! Client session manager for hosted collaborative workspaces.
//!
//! A client joins a workspace over a persistent event channel, either
//! anonymously (shared access code) or authenticated (access code plus a
//! bearer credential). The session authenticates, re-authenticates after
//! every reconnect, pauses writes during workspace updates, and reports
//! all of it as [`SessionEvent`](hworkspace_session::SessionEvent)s.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hworkspace::prelude::*;
//!
//! # async fn run() -> Result<(), ClientError> {
//! let mut client = ClientBuilder::new("https://workspace.example.com").anonymous("ABC123")?;
//! let mut events = client.subscribe();
//!
//! client.connect(|message: Value| println!("received {message}")).await?;
//! client.send_message(json!({ "type": "ping" }))?;
//!
//! while let Ok(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::{AnonymousClient, AuthenticatedClient, ClientBuilder, ClientConfig, WorkspaceClient};
pub use error::ClientError;

pub use hworkspace_protocol as protocol;
pub use hworkspace_session as session;
pub use hworkspace_transport as transport;

/// Common imports for applications.
pub mod prelude {
    pub use crate::{
        AnonymousClient, AuthenticatedClient, ClientBuilder, ClientConfig, ClientError,
        WorkspaceClient,
    };
    pub use hworkspace_session::{
        AuthenticationError, ConnectionState, ControlPlaneContext, DegradeCause, Identity,
        MessageHandler, MessageSink, SessionConfig, SessionError, SessionEvent, SessionId,
        TerminationReason, UpdateOutcome,
    };
    pub use hworkspace_transport::{ConnectConfig, ReconnectConfig, TransportError};
    pub use serde_json::{Value, json};
}
