//! What a control-plane client needs from a session.

use std::fmt;

/// The normalized server address and bearer credential, handed to
/// whatever performs control-plane requests (workspace creation,
/// project snapshots) for this session.
#[derive(Clone, PartialEq, Eq)]
pub struct ControlPlaneContext {
    /// Server address with trailing `/` stripped.
    pub base_uri: String,
    /// Bearer credential; `None` for anonymous sessions, which cannot use
    /// the control plane.
    pub credential: Option<String>,
}

impl ControlPlaneContext {
    /// The `Authorization` header value, if the session has a credential.
    pub fn authorization(&self) -> Option<String> {
        self.credential
            .as_ref()
            .map(|credential| format!("Bearer {credential}"))
    }
}

impl fmt::Debug for ControlPlaneContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlPlaneContext")
            .field("base_uri", &self.base_uri)
            .field("credential", &self.credential.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}
