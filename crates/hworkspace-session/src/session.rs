//! The workspace session: one authenticated channel to a workspace.
//!
//! [`WorkspaceSession::connect`] opens the channel and runs the first
//! negotiation inline. Once that succeeds, a driver task owns the channel's
//! event stream for the rest of the session's life. It delivers inbound
//! messages, applies lifecycle events, and re-authenticates after every
//! reconnect.
//!
//! # Locking
//!
//! All state sits behind one `std::sync::Mutex`, taken only for short
//! synchronous sections and never across an `.await`. Events are published
//! while the lock is held, so subscribers see them in transition order.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use hworkspace_protocol::{Codec, Frame, JsonCodec, LifecycleEvent, event};
use hworkspace_transport::{Channel, ChannelEvent, ChannelEvents, Connector, ServerAddress};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::auth::{self, Attempt, Negotiator, Outcome};
use crate::{
    ConnectionState, ControlPlaneContext, Identity, MessageHandler, MessageSink, SessionConfig,
    SessionCore, SessionError, SessionEvent, SessionId, TerminationReason,
};

/// A client session against one workspace.
///
/// Single-use: once terminated it stays terminated. Termination comes from
/// [`disconnect`](Self::disconnect), a destroyed room, the transport giving
/// up, or dropping the session. Dropping behaves like `disconnect`, so
/// subscribers that outlive the handle still see
/// [`SessionEvent::Terminated`].
///
/// ## Lifecycle
///
/// ```text
/// new() ──→ subscribe() ──→ connect(handler) ──→ send_message() ... ──→ disconnect()
///                                 │
///                                 ├─ Ok  → Active, driver task running
///                                 └─ Err → Unauthenticated, connect may be retried
/// ```
pub struct WorkspaceSession<K: Connector> {
    connector: K,
    shared: Arc<Shared<K::Channel>>,
    driver: Option<JoinHandle<()>>,
}

/// State shared between the session handle and its driver task.
struct Shared<Ch> {
    inner: Mutex<Inner<Ch>>,
    events: broadcast::Sender<SessionEvent>,
    identity: Identity,
    address: ServerAddress,
}

struct Inner<Ch> {
    core: SessionCore,
    channel: Option<Arc<Ch>>,
}

impl<K: Connector> WorkspaceSession<K> {
    /// Creates an unconnected session.
    pub fn new(
        connector: K,
        address: ServerAddress,
        identity: Identity,
        config: SessionConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            connector,
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    core: SessionCore::new(),
                    channel: None,
                }),
                events,
                identity,
                address,
            }),
            driver: None,
        }
    }

    /// Opens the channel and authenticates.
    ///
    /// Resolves once the server accepts the credentials; inbound messages
    /// go to `handler` from then on. Subscribe before calling this to see
    /// [`SessionEvent::Ready`].
    ///
    /// Cancel-safe: dropping the returned future before it resolves closes
    /// the channel and leaves the session `Unauthenticated`, so `connect`
    /// can be retried (for example after a `tokio::time::timeout`).
    ///
    /// # Errors
    /// - [`SessionError::MissingAccessCode`] / [`SessionError::MissingCredential`]
    ///   if the identity is incomplete
    /// - [`SessionError::Connection`] if the transport cannot be opened
    ///   (including the connect timeout) or drops mid-handshake
    /// - [`SessionError::Authentication`] if the server rejects the
    ///   credentials; the session is left unauthenticated
    /// - [`SessionError::AlreadyConnected`] / [`SessionError::Terminated`]
    ///   if the session is not in its initial state
    pub async fn connect<H: MessageHandler>(&mut self, handler: H) -> Result<(), SessionError> {
        self.shared.identity.validate()?;
        self.shared.lock().core.ensure_connectable()?;

        let address = &self.shared.address;
        tracing::info!(
            endpoint = address.endpoint(),
            role = ?self.shared.identity.role(),
            "connecting to workspace"
        );
        let (channel, mut events) = self.connector.connect(address).await?;
        let channel = Arc::new(channel);
        let guard = ConnectGuard::open(Arc::clone(&self.shared), Arc::clone(&channel));

        let mut negotiator = Negotiator::new();
        let request = self.shared.identity.auth_request();
        if let Err(e) = negotiator
            .negotiate(channel.as_ref(), &mut events, &request, &JsonCodec)
            .await
        {
            tracing::warn!(error = %e, "workspace authentication failed");
            return Err(e);
        }
        guard.disarm();

        let session_id = SessionId::from(channel.id());
        tracing::info!(%session_id, "workspace session ready");
        self.shared.transition(|core| core.authenticated(session_id));

        self.driver = Some(tokio::spawn(drive(
            Arc::clone(&self.shared),
            channel,
            events,
            handler,
            negotiator,
        )));
        Ok(())
    }

    /// Sends one application message.
    ///
    /// # Errors
    /// - [`SessionError::NotConnected`] unless the session is
    ///   [`Active`](ConnectionState::Active)
    /// - [`SessionError::Protocol`] if the frame cannot be encoded
    pub fn send_message(&self, message: Value) -> Result<(), SessionError> {
        let inner = self.shared.lock();
        inner.core.ensure_writable()?;
        let channel = inner.channel.as_ref().ok_or(SessionError::NotConnected)?;

        let bytes = JsonCodec.encode(&Frame::with_data(event::MESSAGE, message))?;
        channel.emit(bytes).map_err(|e| {
            tracing::debug!(error = %e, "message rejected by transport");
            SessionError::NotConnected
        })
    }

    /// Terminates the session and closes its channel.
    ///
    /// Publishes [`SessionEvent::Terminated`] the first time; later calls
    /// do nothing.
    pub fn disconnect(&self) {
        let channel = {
            let mut inner = self.shared.lock();
            if let Some(event) = inner.core.terminate(TerminationReason::Disconnected) {
                tracing::info!("workspace session disconnected");
                let _ = self.shared.events.send(event);
            }
            inner.channel.take()
        };
        if let Some(channel) = channel {
            channel.disconnect();
        }
    }

    /// Subscribes to [`SessionEvent`]s. May be called before `connect`.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.shared.events.subscribe()
    }

    /// The id from the latest successful authentication. `None` until the
    /// session first becomes active.
    pub fn id(&self) -> Option<SessionId> {
        self.shared.lock().core.session_id().cloned()
    }

    pub fn state(&self) -> ConnectionState {
        self.shared.lock().core.state()
    }

    /// Whether [`send_message`](Self::send_message) would be accepted right now.
    pub fn is_writable(&self) -> bool {
        self.shared.lock().core.is_writable()
    }

    /// The address and credential for control-plane requests.
    pub fn control_plane(&self) -> ControlPlaneContext {
        ControlPlaneContext {
            base_uri: self.shared.address.base_uri().to_string(),
            credential: self.shared.identity.credential().map(str::to_owned),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.shared.identity
    }

    pub fn address(&self) -> &ServerAddress {
        &self.shared.address
    }
}

impl<K: Connector> MessageSink for WorkspaceSession<K> {
    fn send_message(&self, message: Value) -> Result<(), SessionError> {
        WorkspaceSession::send_message(self, message)
    }
}

impl<K: Connector> Drop for WorkspaceSession<K> {
    fn drop(&mut self) {
        self.disconnect();
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

/// Rolls an unfinished `connect` back to `Unauthenticated`.
///
/// Fires when the negotiation fails and when the `connect` future is
/// dropped mid-handshake. [`disarm`](Self::disarm) once authenticated.
struct ConnectGuard<Ch: Channel> {
    shared: Arc<Shared<Ch>>,
    channel: Option<Arc<Ch>>,
}

impl<Ch: Channel> ConnectGuard<Ch> {
    /// Moves the session to `Authenticating` on `channel`.
    fn open(shared: Arc<Shared<Ch>>, channel: Arc<Ch>) -> Self {
        {
            let mut inner = shared.lock();
            inner.core.channel_opened();
            inner.channel = Some(Arc::clone(&channel));
        }
        Self {
            shared,
            channel: Some(channel),
        }
    }

    fn disarm(mut self) {
        self.channel = None;
    }
}

impl<Ch: Channel> Drop for ConnectGuard<Ch> {
    fn drop(&mut self) {
        let Some(channel) = self.channel.take() else {
            return;
        };
        {
            let mut inner = self.shared.lock();
            inner.core.authentication_failed();
            if inner
                .channel
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, &channel))
            {
                inner.channel = None;
            }
        }
        channel.disconnect();
        tracing::debug!("unfinished connect rolled back");
    }
}

impl<Ch: Channel> Shared<Ch> {
    fn lock(&self) -> MutexGuard<'_, Inner<Ch>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_terminated(&self) -> bool {
        self.lock().core.is_terminated()
    }

    /// Applies a transition and publishes its event under the same lock.
    fn transition(&self, apply: impl FnOnce(&mut SessionCore) -> Option<SessionEvent>) {
        let mut inner = self.lock();
        if let Some(event) = apply(&mut inner.core) {
            tracing::debug!(?event, "session event");
            let _ = self.events.send(event);
        }
    }

    /// Sends a fresh authentication request after the transport came back.
    fn reauthenticate(&self, channel: &Ch, negotiator: &mut Negotiator, reconnect_attempt: u32) {
        let Some(attempt) = negotiator.begin() else {
            tracing::debug!(reconnect_attempt, "re-authentication already pending");
            return;
        };
        if !self.lock().core.reconnected() {
            negotiator.abandon();
            return;
        }

        let request = self.identity.auth_request();
        match auth::send_request(channel, &request, &JsonCodec) {
            Ok(()) => tracing::debug!(%attempt, reconnect_attempt, "re-authentication request sent"),
            Err(e) => {
                negotiator.abandon();
                tracing::warn!(%attempt, error = %e, "could not send re-authentication request");
            }
        }
    }

    fn reauthentication_settled(&self, channel: &Ch, attempt: Attempt, outcome: Outcome) {
        match outcome {
            Ok(()) => {
                let session_id = SessionId::from(channel.id());
                tracing::info!(%attempt, %session_id, "workspace session re-authenticated");
                self.transition(|core| core.authenticated(session_id));
            }
            Err(error) => {
                tracing::warn!(%attempt, %error, "workspace re-authentication rejected");
                self.transition(|core| core.reauthentication_failed(error));
            }
        }
    }
}

/// The driver task: consumes channel events until the session terminates
/// or the channel closes.
async fn drive<Ch: Channel, H: MessageHandler>(
    shared: Arc<Shared<Ch>>,
    channel: Arc<Ch>,
    mut events: ChannelEvents,
    handler: H,
    mut negotiator: Negotiator,
) {
    while let Some(channel_event) = events.recv().await {
        if shared.is_terminated() {
            break;
        }

        match channel_event {
            ChannelEvent::Data(bytes) => {
                let frame: Frame = match JsonCodec.decode(&bytes) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping undecodable frame");
                        continue;
                    }
                };

                if let Some((attempt, outcome)) = negotiator.settle(&frame) {
                    shared.reauthentication_settled(&channel, attempt, outcome);
                } else if frame.event == event::MESSAGE {
                    handler.handle_message(frame.data);
                } else if let Some(lifecycle) = LifecycleEvent::from_frame(&frame) {
                    tracing::info!(event = lifecycle.event_name(), "workspace lifecycle event");
                    shared.transition(|core| core.apply_lifecycle(lifecycle));
                } else {
                    tracing::trace!(event = %frame.event, "ignoring unknown event");
                }
            }
            ChannelEvent::Disconnect { reason } => {
                if let Some(attempt) = negotiator.abandon() {
                    tracing::debug!(%attempt, "re-authentication abandoned");
                }
                tracing::info!(%reason, "workspace connection lost");
                shared.transition(|core| core.connection_lost(reason));
            }
            ChannelEvent::ReconnectAttempt { attempt } => {
                shared.transition(|core| core.reconnecting(attempt));
            }
            ChannelEvent::ReconnectError { attempt, reason } => {
                tracing::warn!(attempt, %reason, "reconnection attempt failed");
            }
            ChannelEvent::Reconnect { attempt } => {
                shared.reauthenticate(&channel, &mut negotiator, attempt);
            }
            ChannelEvent::ReconnectFailed => {
                tracing::error!("workspace reconnection gave up");
                shared.transition(|core| core.terminate(TerminationReason::ReconnectExhausted));
            }
            ChannelEvent::Error(e) => {
                tracing::warn!(error = %e, "transport error");
            }
        }

        if shared.is_terminated() {
            break;
        }
    }

    // The stream also ends when reconnection is disabled and the link drops.
    shared.transition(|core| core.terminate(TerminationReason::ReconnectExhausted));
    shared.lock().channel = None;
    channel.disconnect();
    tracing::debug!("session driver stopped");
}
