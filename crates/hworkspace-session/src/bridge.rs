//! The two contract points between a session and a messaging runtime.
//!
//! The runtime hands outbound messages to a [`MessageSink`] (the session)
//! and receives inbound messages through the [`MessageHandler`] it
//! registered at connect time. Messages are opaque JSON to the session.

use serde_json::Value;

use crate::SessionError;

/// Receives inbound application messages, in arrival order.
///
/// Called from the session's driver task. Implementations must not block;
/// hand the message off (for example into a channel) and return.
///
/// Any `Fn(Value)` closure is a handler:
///
/// ```rust
/// use hworkspace_session::MessageHandler;
///
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// let handler = move |message| {
///     let _ = tx.send(message);
/// };
/// handler.handle_message(serde_json::json!({ "type": "ping" }));
/// assert!(rx.try_recv().is_ok());
/// ```
pub trait MessageHandler: Send + Sync + 'static {
    fn handle_message(&self, message: Value);
}

impl<F> MessageHandler for F
where
    F: Fn(Value) + Send + Sync + 'static,
{
    fn handle_message(&self, message: Value) {
        self(message)
    }
}

/// Accepts outbound application messages.
pub trait MessageSink {
    /// Sends one message to the server.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] while the session is not
    /// writable.
    fn send_message(&self, message: Value) -> Result<(), SessionError>;
}
