//! The authentication handshake.
//!
//! The client sends one [`event::AUTH_REQUEST`] frame and waits for the
//! server to answer with [`event::AUTH_SUCCESS`] or [`event::AUTH_ERROR`].
//! [`Negotiator`] tracks the one outstanding request so that exactly one
//! answer settles it; later answers, and answers after the transport
//! dropped, are ignored.
//!
//! ```text
//! begin() ──→ [pending] ──settle(success | error)──→ [idle]
//!                 │
//!                 └──abandon() (transport dropped)──→ [idle]
//! ```

use std::fmt;

use hworkspace_protocol::{AuthErrorPayload, AuthRequest, Codec, Frame, event};
use hworkspace_transport::{Channel, ChannelEvent, ChannelEvents, TransportError};

use crate::{AuthenticationError, SessionError};

/// Server error names with a dedicated [`AuthenticationError`] variant.
const KNOWN_ERRORS: &[(&str, AuthenticationError)] = &[
    ("InvalidCode", AuthenticationError::InvalidCode),
    ("InvalidToken", AuthenticationError::InvalidCredential),
    ("Unauthorized", AuthenticationError::Unauthorized),
    ("Forbidden", AuthenticationError::Forbidden),
    ("WorkspaceNotFound", AuthenticationError::WorkspaceNotFound),
];

/// Identifies one negotiation, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt(u64);

impl fmt::Display for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// The settled result of a negotiation.
pub type Outcome = Result<(), AuthenticationError>;

/// Tracks the authentication request in flight.
///
/// At most one negotiation is pending at a time. Settling or abandoning it
/// clears the slot, so a duplicate answer for the same attempt has nothing
/// left to settle.
#[derive(Debug, Default)]
pub struct Negotiator {
    last: u64,
    pending: Option<Attempt>,
}

impl Negotiator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a negotiation unless one is already pending.
    ///
    /// Returns `None` when a negotiation is outstanding; the caller should
    /// not send a second request.
    pub fn begin(&mut self) -> Option<Attempt> {
        if self.pending.is_some() {
            return None;
        }
        Some(self.restart())
    }

    /// Starts a negotiation, dropping any pending one.
    pub fn restart(&mut self) -> Attempt {
        self.last += 1;
        let attempt = Attempt(self.last);
        self.pending = Some(attempt);
        attempt
    }

    /// Settles the pending negotiation if `frame` is an authentication
    /// answer.
    ///
    /// Returns `None` for non-authentication frames and for answers that
    /// arrive with nothing pending.
    pub fn settle(&mut self, frame: &Frame) -> Option<(Attempt, Outcome)> {
        let outcome = match frame.event.as_str() {
            event::AUTH_SUCCESS => Ok(()),
            event::AUTH_ERROR => Err(map_auth_error(&frame.data)),
            _ => return None,
        };
        match self.pending.take() {
            Some(attempt) => Some((attempt, outcome)),
            None => {
                tracing::debug!(event = %frame.event, "ignoring unsolicited authentication answer");
                None
            }
        }
    }

    /// Forgets the pending negotiation, if any. Used when the transport
    /// drops before the server answered.
    pub fn abandon(&mut self) -> Option<Attempt> {
        self.pending.take()
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Runs one complete negotiation over a freshly opened channel.
    ///
    /// Sends `request`, then reads channel events until the server answers.
    /// Frames other than the answer are skipped: nothing is delivered to the
    /// application before the session is authenticated.
    ///
    /// # Errors
    /// - [`SessionError::Authentication`] when the server rejects the request
    /// - [`SessionError::Connection`] when the transport drops or closes
    ///   before an answer arrives
    pub async fn negotiate<Ch: Channel, C: Codec>(
        &mut self,
        channel: &Ch,
        events: &mut ChannelEvents,
        request: &AuthRequest,
        codec: &C,
    ) -> Result<(), SessionError> {
        let attempt = self.restart();
        send_request(channel, request, codec)?;
        tracing::debug!(%attempt, role = ?request.role, "authentication request sent");

        while let Some(channel_event) = events.recv().await {
            match channel_event {
                ChannelEvent::Data(bytes) => {
                    let frame: Frame = match codec.decode(&bytes) {
                        Ok(frame) => frame,
                        Err(e) => {
                            tracing::debug!(error = %e, "skipping undecodable frame");
                            continue;
                        }
                    };
                    if let Some((attempt, outcome)) = self.settle(&frame) {
                        tracing::debug!(%attempt, ok = outcome.is_ok(), "authentication settled");
                        return outcome.map_err(SessionError::from);
                    }
                    tracing::trace!(event = %frame.event, "skipping frame before authentication");
                }
                ChannelEvent::Disconnect { reason } => {
                    self.abandon();
                    return Err(TransportError::Connection(reason).into());
                }
                ChannelEvent::Error(e) => {
                    tracing::debug!(error = %e, "transport error during authentication");
                }
                other => {
                    tracing::trace!(event = ?other, "skipping channel event before authentication");
                }
            }
        }

        self.abandon();
        Err(TransportError::Closed.into())
    }
}

/// Encodes and emits an authentication request.
pub(crate) fn send_request<Ch: Channel, C: Codec>(
    channel: &Ch,
    request: &AuthRequest,
    codec: &C,
) -> Result<(), SessionError> {
    let data = serde_json::to_value(request).map_err(hworkspace_protocol::ProtocolError::Encode)?;
    let bytes = codec.encode(&Frame::with_data(event::AUTH_REQUEST, data))?;
    channel.emit(bytes)?;
    Ok(())
}

/// Maps the server's error payload to an [`AuthenticationError`].
pub fn map_auth_error(data: &serde_json::Value) -> AuthenticationError {
    let payload = AuthErrorPayload::from_value(data);
    let known = payload.name.as_deref().and_then(|name| {
        KNOWN_ERRORS
            .iter()
            .find(|(known, _)| *known == name)
            .map(|(_, error)| error.clone())
    });
    known.unwrap_or(AuthenticationError::Rejected {
        name: payload.name,
        message: payload.message,
    })
}
