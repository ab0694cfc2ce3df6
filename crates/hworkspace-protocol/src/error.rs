//! Error types for the protocol layer.
//!
//! Each crate defines its own error enum. A `ProtocolError` always means
//! a frame could not be turned into bytes or back, never a transport or
//! session problem.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serialization failed (turning a Rust type into bytes).
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a Rust type).
    ///
    /// Common causes: malformed JSON, missing required fields, or a frame
    /// without an `event` name.
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
