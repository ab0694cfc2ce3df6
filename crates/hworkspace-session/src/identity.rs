//! Who the client claims to be, and the id the server hands back.

use std::fmt;

use hworkspace_protocol::{AuthRequest, Role};
use hworkspace_transport::ChannelId;

use crate::SessionError;

/// The credentials a session authenticates with.
///
/// Fixed when the session is built and reused verbatim on every
/// re-authentication after a reconnect.
#[derive(Clone, PartialEq, Eq)]
pub enum Identity {
    /// Joins with the shared access code only.
    Anonymous { access_code: String },

    /// Joins with the access code plus a bearer credential.
    Authenticated {
        access_code: String,
        credential: String,
    },
}

impl Identity {
    pub fn anonymous(access_code: impl Into<String>) -> Self {
        Self::Anonymous {
            access_code: access_code.into(),
        }
    }

    pub fn authenticated(credential: impl Into<String>, access_code: impl Into<String>) -> Self {
        Self::Authenticated {
            access_code: access_code.into(),
            credential: credential.into(),
        }
    }

    pub fn access_code(&self) -> &str {
        match self {
            Self::Anonymous { access_code } | Self::Authenticated { access_code, .. } => {
                access_code
            }
        }
    }

    /// The bearer credential, `None` for anonymous identities.
    pub fn credential(&self) -> Option<&str> {
        match self {
            Self::Anonymous { .. } => None,
            Self::Authenticated { credential, .. } => Some(credential),
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Self::Anonymous { .. } => Role::AnonymousClient,
            Self::Authenticated { .. } => Role::AuthenticatedClient,
        }
    }

    /// Checks that the identity can be sent to the server at all.
    ///
    /// # Errors
    /// - [`SessionError::MissingAccessCode`] if the access code is empty or
    ///   only whitespace
    /// - [`SessionError::MissingCredential`] if an authenticated identity
    ///   has an empty credential
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.access_code().trim().is_empty() {
            return Err(SessionError::MissingAccessCode);
        }
        match self.credential() {
            Some(credential) if credential.trim().is_empty() => {
                Err(SessionError::MissingCredential)
            }
            _ => Ok(()),
        }
    }

    /// Builds a fresh authentication request for this identity.
    pub fn auth_request(&self) -> AuthRequest {
        AuthRequest::new(self.access_code(), self.credential().map(str::to_owned))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Anonymous { access_code } => f
                .debug_struct("Anonymous")
                .field("access_code", access_code)
                .finish(),
            Self::Authenticated { access_code, .. } => f
                .debug_struct("Authenticated")
                .field("access_code", access_code)
                .field("credential", &"<redacted>")
                .finish(),
        }
    }
}

/// The server-visible id of an authenticated session.
///
/// This is the transport id at the moment authentication succeeded. A
/// reconnect assigns a new one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<ChannelId> for SessionId {
    fn from(id: ChannelId) -> Self {
        Self(id.into_inner())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
