//! `ClientBuilder`: turns a server URI and an identity into a session.
//!
//! This is the entry point for applications. It ties together the layers:
//! address parsing and the WebSocket connector (transport), and the
//! session with its identity (session).

use std::time::Duration;

use hworkspace_session::{Identity, SessionConfig, WorkspaceSession};
use hworkspace_transport::{ConnectConfig, ReconnectConfig, ServerAddress, WebSocketConnector};

use crate::ClientError;

/// A workspace session over the WebSocket transport.
pub type WorkspaceClient = WorkspaceSession<WebSocketConnector>;

/// A client that joins with the shared access code only.
pub type AnonymousClient = WorkspaceClient;

/// A client that joins with an access code plus a bearer credential and
/// can use the control plane.
pub type AuthenticatedClient = WorkspaceClient;

/// Everything a client can be configured with besides its address and
/// identity.
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    /// Transport settings: connect timeout and reconnection policy.
    pub connect: ConnectConfig,
    /// Session settings.
    pub session: SessionConfig,
}

/// Builder for workspace clients.
///
/// # Example
///
/// ```rust,no_run
/// use hworkspace::prelude::*;
///
/// # async fn run() -> Result<(), ClientError> {
/// let mut client = ClientBuilder::new("https://workspace.example.com")
///     .connect_timeout(std::time::Duration::from_secs(10))
///     .anonymous("ABC123")?;
///
/// client.connect(|message: Value| println!("{message}")).await?;
/// client.send_message(json!({ "type": "ping" }))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ClientBuilder {
    server_uri: String,
    config: ClientConfig,
}

impl ClientBuilder {
    /// Creates a builder for the server at `server_uri` with default
    /// settings.
    pub fn new(server_uri: impl Into<String>) -> Self {
        Self {
            server_uri: server_uri.into(),
            config: ClientConfig::default(),
        }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the transport configuration.
    pub fn connect_config(mut self, config: ConnectConfig) -> Self {
        self.config.connect = config;
        self
    }

    /// Sets the deadline for the transport to come up.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect.connect_timeout = timeout;
        self
    }

    /// Sets the reconnection policy.
    pub fn reconnect(mut self, policy: ReconnectConfig) -> Self {
        self.config.connect.reconnect = policy;
        self
    }

    /// Sets the session configuration.
    pub fn session_config(mut self, config: SessionConfig) -> Self {
        self.config.session = config;
        self
    }

    /// Builds an anonymous client.
    ///
    /// # Errors
    /// - [`ClientError::Transport`] if the server URI is invalid
    /// - [`ClientError::Session`] if the access code is blank
    pub fn anonymous(self, access_code: impl Into<String>) -> Result<AnonymousClient, ClientError> {
        self.build(Identity::anonymous(access_code))
    }

    /// Builds an authenticated client.
    ///
    /// # Errors
    /// - [`ClientError::Transport`] if the server URI is invalid
    /// - [`ClientError::Session`] if the access code or credential is blank
    pub fn authenticated(
        self,
        credential: impl Into<String>,
        access_code: impl Into<String>,
    ) -> Result<AuthenticatedClient, ClientError> {
        self.build(Identity::authenticated(credential, access_code))
    }

    /// Builds a client for an arbitrary identity.
    ///
    /// # Errors
    /// - [`ClientError::Transport`] if the server URI is invalid
    /// - [`ClientError::Session`] if the identity is incomplete
    pub fn build(self, identity: Identity) -> Result<WorkspaceClient, ClientError> {
        identity.validate()?;
        let address = ServerAddress::parse(&self.server_uri)?;
        tracing::debug!(
            base_uri = address.base_uri(),
            url = %address.websocket_url(),
            role = ?identity.role(),
            "workspace client built"
        );

        Ok(WorkspaceSession::new(
            WebSocketConnector::new(self.config.connect),
            address,
            identity,
            self.config.session,
        ))
    }
}
