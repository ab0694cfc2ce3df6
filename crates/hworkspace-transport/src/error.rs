/// Errors that can occur in the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server address could not be turned into a channel endpoint.
    #[error("invalid server address: {0}")]
    InvalidAddress(String),

    /// The channel could not be established.
    ///
    /// Covers both a refused/failed upgrade (`connect_error`) and a
    /// low-level socket failure while opening (`error`).
    #[error("connection failed: {0}")]
    Connection(String),

    /// The channel was not established before the connect deadline.
    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// An outbound frame cannot be put on the wire.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// The channel is closed or its transport is currently down.
    #[error("channel closed")]
    Closed,
}
