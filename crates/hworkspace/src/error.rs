//! Unified error type for hworkspace clients.

use hworkspace_protocol::ProtocolError;
use hworkspace_session::SessionError;
use hworkspace_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `hworkspace` facade you deal with this single error type
/// instead of importing errors from each layer. The `#[from]` attribute on
/// each variant lets `?` convert layer errors automatically.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// A transport-level error (invalid address, connect failure, timeout).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (frame encode or decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (authentication, not connected, terminated).
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl ClientError {
    /// The authentication rejection behind this error, if that is what it is.
    pub fn authentication(&self) -> Option<&hworkspace_session::AuthenticationError> {
        match self {
            Self::Session(SessionError::Authentication(e)) => Some(e),
            _ => None,
        }
    }
}
