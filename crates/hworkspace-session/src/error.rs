//! Error types for the session layer.

use hworkspace_protocol::ProtocolError;
use hworkspace_transport::TransportError;

/// Errors returned by session operations.
///
/// Transport failures while connecting surface as [`SessionError::Connection`]
/// (which includes the connect timeout), a server rejection of the
/// credentials as [`SessionError::Authentication`].
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport could not be opened, timed out, or dropped during the
    /// handshake.
    #[error(transparent)]
    Connection(#[from] TransportError),

    /// The server rejected the authentication request.
    #[error(transparent)]
    Authentication(#[from] AuthenticationError),

    /// A write was attempted while the session is not writable: not yet
    /// authenticated, reconnecting, in a maintenance window, or terminated.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called on a session that is already authenticating or
    /// active.
    #[error("session is already connected")]
    AlreadyConnected,

    /// `connect` was called on a session that has been terminated. Sessions
    /// are single-use; build a new one.
    #[error("session has been terminated")]
    Terminated,

    /// A frame could not be encoded.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The identity has an empty access code.
    #[error("access code is required")]
    MissingAccessCode,

    /// An authenticated identity has an empty credential.
    #[error("credential is required")]
    MissingCredential,
}

/// Why the server rejected an authentication request.
///
/// Built from the server's `{"name", "message"}` error payload. Known names
/// map to a dedicated variant; anything else lands in
/// [`AuthenticationError::Rejected`] with the raw name and message kept.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthenticationError {
    /// The access code does not match any workspace.
    #[error("authentication failed: invalid access code")]
    InvalidCode,

    /// The bearer credential was refused.
    #[error("authentication failed: invalid credential")]
    InvalidCredential,

    /// The client is not allowed into this workspace.
    #[error("authentication failed: unauthorized")]
    Unauthorized,

    /// The client is known but lacks permission for the requested role.
    #[error("authentication failed: forbidden")]
    Forbidden,

    /// The workspace behind the access code no longer exists.
    #[error("authentication failed: workspace not found")]
    WorkspaceNotFound,

    /// Any other rejection.
    #[error("authentication failed: {}", rejection_detail(.name, .message))]
    Rejected {
        name: Option<String>,
        message: Option<String>,
    },
}

fn rejection_detail<'a>(name: &'a Option<String>, message: &'a Option<String>) -> &'a str {
    message
        .as_deref()
        .or(name.as_deref())
        .unwrap_or("rejected by server")
}
