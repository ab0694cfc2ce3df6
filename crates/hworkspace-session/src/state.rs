//! Session state: the connection state machine and the write gate.
//!
//! [`SessionCore`] holds the state and applies transitions. It does no I/O.
//! Every transition returns the [`SessionEvent`] to publish (if any). The
//! caller publishes it while still holding the lock that guards the core,
//! so subscribers see events in transition order.

use hworkspace_protocol::LifecycleEvent;

use crate::{
    AuthenticationError, SessionError, SessionEvent, SessionId, TerminationReason, UpdateOutcome,
};

// ---------------------------------------------------------------------------
// SessionConfig
// ---------------------------------------------------------------------------

/// Settings for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How many [`SessionEvent`]s a slow subscriber may fall behind before
    /// it starts missing events. Default: 64.
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { event_capacity: 64 }
    }
}

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// Where the session is in its lifecycle.
///
/// ```text
///  Unauthenticated ──(channel open)──→ Authenticating ──(success)──→ Active
///         ↑                                 │  ↑                     │  ↑
///         └────────(initial failure)────────┘  │       (update started│  │update ended)
///                                              │       or link down) ▼  │
///                                   (reconnect)└─────────────────── Degraded
///
///  any state ──(room destroyed | disconnect | reconnect gave up)──→ Terminated
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No authenticated session yet. `connect` may be called.
    Unauthenticated,
    /// A negotiation is in flight: the first one, or one after a reconnect.
    Authenticating,
    /// Authenticated. Writes are accepted.
    Active,
    /// Authenticated, but writes are paused.
    Degraded(DegradeCause),
    /// Final. Nothing leaves this state.
    Terminated,
}

/// Why writes are paused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DegradeCause {
    /// The server announced a workspace update.
    Maintenance,
    /// The transport dropped or re-authentication failed.
    ConnectionLost,
}

// ---------------------------------------------------------------------------
// SessionCore
// ---------------------------------------------------------------------------

/// The session's mutable state.
///
/// The write gate is open only in [`ConnectionState::Active`]. A workspace
/// update that is still running when the connection comes back keeps the
/// session degraded after re-authentication.
#[derive(Debug)]
pub struct SessionCore {
    state: ConnectionState,
    write_gate: bool,
    session_id: Option<SessionId>,
    maintenance: bool,
}

impl Default for SessionCore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionCore {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Unauthenticated,
            write_gate: false,
            session_id: None,
            maintenance: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The id from the latest successful authentication.
    pub fn session_id(&self) -> Option<&SessionId> {
        self.session_id.as_ref()
    }

    pub fn is_writable(&self) -> bool {
        self.write_gate && self.state == ConnectionState::Active
    }

    pub fn is_terminated(&self) -> bool {
        self.state == ConnectionState::Terminated
    }

    /// Checks that outbound traffic is allowed right now.
    ///
    /// # Errors
    /// Returns [`SessionError::NotConnected`] unless the session is active.
    pub fn ensure_writable(&self) -> Result<(), SessionError> {
        if self.is_writable() {
            Ok(())
        } else {
            Err(SessionError::NotConnected)
        }
    }

    /// Checks that `connect` may start.
    ///
    /// # Errors
    /// - [`SessionError::Terminated`] after termination
    /// - [`SessionError::AlreadyConnected`] in any state but `Unauthenticated`
    pub fn ensure_connectable(&self) -> Result<(), SessionError> {
        match self.state {
            ConnectionState::Unauthenticated => Ok(()),
            ConnectionState::Terminated => Err(SessionError::Terminated),
            _ => Err(SessionError::AlreadyConnected),
        }
    }

    /// The channel opened and the first request is about to go out.
    pub fn channel_opened(&mut self) {
        if self.state == ConnectionState::Unauthenticated {
            self.state = ConnectionState::Authenticating;
            self.write_gate = false;
        }
    }

    /// A negotiation succeeded with the transport id `session_id`.
    ///
    /// Returns [`SessionEvent::Ready`] the first time and
    /// [`SessionEvent::Reauthenticated`] after a reconnect.
    pub fn authenticated(&mut self, session_id: SessionId) -> Option<SessionEvent> {
        if self.state != ConnectionState::Authenticating {
            return None;
        }
        let first = self.session_id.is_none();
        self.session_id = Some(session_id.clone());
        if self.maintenance {
            self.state = ConnectionState::Degraded(DegradeCause::Maintenance);
            self.write_gate = false;
        } else {
            self.state = ConnectionState::Active;
            self.write_gate = true;
        }

        Some(if first {
            SessionEvent::Ready { session_id }
        } else {
            SessionEvent::Reauthenticated { session_id }
        })
    }

    /// The first negotiation failed. The session may try `connect` again.
    pub fn authentication_failed(&mut self) {
        if self.state == ConnectionState::Authenticating && self.session_id.is_none() {
            self.state = ConnectionState::Unauthenticated;
            self.write_gate = false;
        }
    }

    /// A negotiation after a reconnect was rejected.
    pub fn reauthentication_failed(&mut self, error: AuthenticationError) -> Option<SessionEvent> {
        if self.state != ConnectionState::Authenticating {
            return None;
        }
        self.state = ConnectionState::Degraded(DegradeCause::ConnectionLost);
        self.write_gate = false;
        Some(SessionEvent::ReauthenticationFailed { error })
    }

    /// The transport dropped.
    pub fn connection_lost(&mut self, reason: String) -> Option<SessionEvent> {
        match self.state {
            ConnectionState::Unauthenticated | ConnectionState::Terminated => None,
            _ => {
                self.state = ConnectionState::Degraded(DegradeCause::ConnectionLost);
                self.write_gate = false;
                Some(SessionEvent::Disconnected { reason })
            }
        }
    }

    /// The transport is making reconnection attempt `attempt`.
    pub fn reconnecting(&mut self, attempt: u32) -> Option<SessionEvent> {
        match self.state {
            ConnectionState::Unauthenticated | ConnectionState::Terminated => None,
            _ => {
                self.state = ConnectionState::Degraded(DegradeCause::ConnectionLost);
                self.write_gate = false;
                Some(SessionEvent::Reconnecting { attempt })
            }
        }
    }

    /// The transport came back. Returns `true` if the session should
    /// re-authenticate.
    pub fn reconnected(&mut self) -> bool {
        if self.session_id.is_none() || self.is_terminated() {
            return false;
        }
        self.state = ConnectionState::Authenticating;
        self.write_gate = false;
        true
    }

    /// Applies a server-pushed lifecycle event.
    ///
    /// Returns the event to publish. Nothing is published after
    /// termination.
    pub fn apply_lifecycle(&mut self, event: LifecycleEvent) -> Option<SessionEvent> {
        if self.is_terminated() {
            return None;
        }
        match event {
            LifecycleEvent::RoomDestroyed { payload } => {
                self.terminate(TerminationReason::RoomDestroyed { payload })
            }
            LifecycleEvent::UpdateStarted { payload } => {
                self.maintenance = true;
                if self.state == ConnectionState::Active {
                    self.state = ConnectionState::Degraded(DegradeCause::Maintenance);
                }
                self.write_gate = false;
                Some(SessionEvent::DegradedStarted { payload })
            }
            LifecycleEvent::UpdateFinished { payload } => {
                Some(self.end_maintenance(UpdateOutcome::Finished, payload))
            }
            LifecycleEvent::UpdateFailed { payload } => {
                Some(self.end_maintenance(UpdateOutcome::Failed, payload))
            }
        }
    }

    fn end_maintenance(
        &mut self,
        outcome: UpdateOutcome,
        payload: Option<serde_json::Value>,
    ) -> SessionEvent {
        self.maintenance = false;
        if self.state == ConnectionState::Degraded(DegradeCause::Maintenance) {
            self.state = ConnectionState::Active;
            self.write_gate = true;
        }
        SessionEvent::DegradedEnded { outcome, payload }
    }

    /// Moves to `Terminated`.
    ///
    /// Returns the [`SessionEvent::Terminated`] to publish, or `None` if
    /// the session was already terminated.
    pub fn terminate(&mut self, reason: TerminationReason) -> Option<SessionEvent> {
        if self.is_terminated() {
            return None;
        }
        self.state = ConnectionState::Terminated;
        self.write_gate = false;
        self.maintenance = false;
        Some(SessionEvent::Terminated { reason })
    }
}
