//! Server address normalization and channel endpoint derivation.
//!
//! A workspace server may be mounted under a path prefix
//! (`https://example.com/workspace`). The channel endpoint keeps only the
//! protocol and host; the prefix moves into the transport-level routing
//! path so the request reaches the channel service behind the prefix.

use url::Url;

use crate::TransportError;

/// Routing path used when the server is mounted at the root.
pub const DEFAULT_ROUTING_PATH: &str = "/socket.io/";

/// Query selecting Engine.IO v4 over a WebSocket with no polling phase.
const TRANSPORT_QUERY: &str = "EIO=4&transport=websocket";

/// A normalized workspace server address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    base_uri: String,
    endpoint: String,
    routing_path: Option<String>,
}

impl ServerAddress {
    /// Parses and normalizes a server URI.
    ///
    /// Trailing `/` separators are stripped. `http`/`https` map to
    /// `ws`/`wss`; `ws`/`wss` are kept as is.
    ///
    /// # Errors
    /// Returns [`TransportError::InvalidAddress`] if the URI does not
    /// parse, has no host, or uses any other scheme.
    pub fn parse(uri: &str) -> Result<Self, TransportError> {
        let base_uri = uri.trim().trim_end_matches('/').to_string();
        let url = Url::parse(&base_uri)
            .map_err(|e| TransportError::InvalidAddress(format!("{uri}: {e}")))?;

        let scheme = match url.scheme() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => {
                return Err(TransportError::InvalidAddress(format!(
                    "unsupported scheme `{other}`"
                )));
            }
        };
        let host = url
            .host_str()
            .ok_or_else(|| TransportError::InvalidAddress(format!("{uri}: missing host")))?;
        let endpoint = match url.port() {
            Some(port) => format!("{scheme}://{host}:{port}"),
            None => format!("{scheme}://{host}"),
        };

        let routing_path = match url.path() {
            "" | "/" => None,
            path => Some(path_join(path, DEFAULT_ROUTING_PATH)),
        };

        Ok(Self {
            base_uri,
            endpoint,
            routing_path,
        })
    }

    /// The normalized address, for control-plane requests.
    pub fn base_uri(&self) -> &str {
        &self.base_uri
    }

    /// Protocol and host of the channel endpoint (`wss://host:port`).
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Routing path when the server sits under a non-root prefix.
    pub fn routing_path(&self) -> Option<&str> {
        self.routing_path.as_deref()
    }

    /// Full URL the WebSocket transport connects to, including the
    /// Engine.IO query that selects protocol v4 over a bare WebSocket.
    pub fn websocket_url(&self) -> String {
        let path = self.routing_path().unwrap_or(DEFAULT_ROUTING_PATH);
        format!("{}{}?{}", self.endpoint, path, TRANSPORT_QUERY)
    }
}

fn path_join(left: &str, right: &str) -> String {
    format!(
        "{}/{}",
        left.trim_end_matches('/'),
        right.trim_start_matches('/')
    )
}
