//! Wire protocol for hworkspace clients.
//!
//! This crate defines what travels over a workspace channel:
//!
//! - **Events** ([`event`]): the names the server and client agree on.
//! - **Types** ([`Frame`], [`AuthRequest`], [`LifecycleEvent`], etc.):
//!   the payloads attached to those events.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames become bytes.
//! - **Errors** ([`ProtocolError`]).
//!
//! ```text
//! Transport (bytes) → Protocol (Frame) → Session (auth, lifecycle, messages)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{AuthErrorPayload, AuthRequest, Frame, LifecycleEvent, Role, event};
