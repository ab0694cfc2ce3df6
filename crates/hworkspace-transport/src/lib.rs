//! Transport layer for hworkspace clients.
//!
//! Provides the [`Connector`] and [`Channel`] traits that abstract over the
//! bidirectional event channel a client holds to the workspace server, plus
//! the [`ChannelEvent`]s a live channel reports (data, drops, reconnects).
//!
//! The connector only opens the transport. Authentication and session
//! state live one layer up, in `hworkspace-session`.
//!
//! # Feature Flags
//!
//! - `websocket` (default): Socket.IO channel over a WebSocket via
//!   `tokio-tungstenite`

mod address;
mod config;
mod error;
#[cfg(feature = "websocket")]
mod packet;
#[cfg(feature = "websocket")]
mod websocket;

pub use address::ServerAddress;
pub use config::{ConnectConfig, ReconnectConfig};
pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{WebSocketChannel, WebSocketConnector};

use std::fmt;
use std::future::Future;

use tokio::sync::mpsc;

/// The transport-assigned identifier of a channel.
///
/// The server hands this out when the transport opens. It changes every
/// time the transport reconnects, so callers should read it again after
/// a [`ChannelEvent::Reconnect`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelId(String);

impl ChannelId {
    /// Creates a new `ChannelId` from the raw transport id.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the underlying `String`.
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Something that happened on a live channel.
///
/// Events are delivered in the order the transport observes them, on the
/// [`ChannelEvents`] receiver returned alongside the channel. The receiver
/// yields `None` once the channel is closed for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    /// One inbound event, as its JSON argument list.
    Data(Vec<u8>),

    /// A low-level error that did not (yet) drop the transport.
    Error(String),

    /// The transport dropped. Unless the drop was requested through
    /// [`Channel::disconnect`], reconnection starts right after.
    Disconnect { reason: String },

    /// A reconnection attempt is about to be made.
    ReconnectAttempt { attempt: u32 },

    /// A reconnection attempt failed; another one may follow.
    ReconnectError { attempt: u32, reason: String },

    /// The transport is live again under a new [`ChannelId`].
    Reconnect { attempt: u32 },

    /// The retry policy gave up. No further events follow.
    ReconnectFailed,
}

/// Receiving half of a channel's event stream.
pub type ChannelEvents = mpsc::UnboundedReceiver<ChannelEvent>;

/// A live bidirectional channel to the server.
///
/// All operations are synchronous: `emit` queues a frame for the
/// transport's writer and fails straight away if the transport is down.
pub trait Channel: Send + Sync + 'static {
    /// Returns the current transport-assigned id.
    fn id(&self) -> ChannelId;

    /// Queues one outbound event, given as its JSON argument list.
    ///
    /// # Errors
    /// - [`TransportError::Closed`] while the transport is down (between a
    ///   drop and a reconnect) or after `disconnect`
    /// - [`TransportError::InvalidFrame`] if the frame cannot be sent
    fn emit(&self, frame: Vec<u8>) -> Result<(), TransportError>;

    /// Closes the channel. No reconnection is attempted afterwards.
    fn disconnect(&self);
}

/// Opens channels to a server address.
pub trait Connector: Send + Sync + 'static {
    /// The channel type produced by this connector.
    type Channel: Channel;

    /// Opens a channel and resolves once the transport is live.
    ///
    /// Resolves on the first successful connect; any other terminal
    /// outcome fails with [`TransportError::Connection`] or
    /// [`TransportError::ConnectTimeout`].
    fn connect(
        &self,
        address: &ServerAddress,
    ) -> impl Future<Output = Result<(Self::Channel, ChannelEvents), TransportError>> + Send;
}
