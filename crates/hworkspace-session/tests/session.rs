//! End-to-end tests for `WorkspaceSession` over an in-memory channel.
//!
//! The test plays the server: it reads the frames the session emits and
//! feeds channel events (frames, drops, reconnects) back in.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hworkspace_protocol::{Frame, event};
use hworkspace_session::{
    AuthenticationError, ConnectionState, DegradeCause, Identity, SessionConfig, SessionError,
    SessionEvent, SessionId, TerminationReason, UpdateOutcome, WorkspaceSession,
};
use hworkspace_transport::{
    Channel, ChannelEvent, ChannelEvents, ChannelId, Connector, ServerAddress, TransportError,
};
use serde_json::{Value, json};
use tokio::sync::{broadcast, mpsc};

// =========================================================================
// In-memory transport
// =========================================================================

struct Link {
    id: Mutex<String>,
    live: AtomicBool,
    closed: AtomicBool,
}

struct MockChannel {
    link: Arc<Link>,
    sent: mpsc::UnboundedSender<Vec<u8>>,
}

impl Channel for MockChannel {
    fn id(&self) -> ChannelId {
        ChannelId::new(self.link.id.lock().unwrap().clone())
    }

    fn emit(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        if !self.link.live.load(Ordering::SeqCst) {
            return Err(TransportError::Closed);
        }
        self.sent.send(frame).map_err(|_| TransportError::Closed)
    }

    fn disconnect(&self) {
        self.link.closed.store(true, Ordering::SeqCst);
        self.link.live.store(false, Ordering::SeqCst);
    }
}

type Opened = Result<(MockChannel, ChannelEvents), TransportError>;

struct MockConnector {
    next: Mutex<Option<Opened>>,
}

impl Connector for MockConnector {
    type Channel = MockChannel;

    fn connect(
        &self,
        _address: &ServerAddress,
    ) -> impl Future<Output = Result<(MockChannel, ChannelEvents), TransportError>> + Send {
        let next = self.next.lock().unwrap().take();
        async move { next.unwrap_or_else(|| Err(TransportError::Connection("refused".into()))) }
    }
}

/// The server's end of the in-memory channel.
struct Server {
    link: Arc<Link>,
    sent: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl Server {
    async fn next_frame(&mut self) -> Frame {
        let bytes = tokio::time::timeout(Duration::from_secs(2), self.sent.recv())
            .await
            .expect("frame within deadline")
            .expect("channel open");
        serde_json::from_slice(&bytes).expect("valid frame")
    }

    fn push(&self, frame: Frame) {
        let bytes = serde_json::to_vec(&frame).unwrap();
        self.events.send(ChannelEvent::Data(bytes)).unwrap();
    }

    fn accept_auth(&self) {
        self.push(Frame::new(event::AUTH_SUCCESS));
    }

    fn reject_auth(&self, name: &str) {
        self.push(Frame::with_data(
            event::AUTH_ERROR,
            json!({ "name": name, "message": "rejected" }),
        ));
    }

    fn drop_transport(&self) {
        self.link.live.store(false, Ordering::SeqCst);
        self.events
            .send(ChannelEvent::Disconnect {
                reason: "transport close".into(),
            })
            .unwrap();
    }

    fn reconnect(&self, attempt: u32, new_id: &str) {
        self.events
            .send(ChannelEvent::ReconnectAttempt { attempt })
            .unwrap();
        *self.link.id.lock().unwrap() = new_id.to_string();
        self.link.live.store(true, Ordering::SeqCst);
        self.events.send(ChannelEvent::Reconnect { attempt }).unwrap();
    }

    fn is_closed(&self) -> bool {
        self.link.closed.load(Ordering::SeqCst)
    }

    /// Waits for the session to close the channel from its driver task.
    async fn wait_closed(&self) {
        for _ in 0..100 {
            if self.is_closed() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("channel was not closed");
    }
}

fn mock(id: &str) -> (MockConnector, Server) {
    let link = Arc::new(Link {
        id: Mutex::new(id.to_string()),
        live: AtomicBool::new(true),
        closed: AtomicBool::new(false),
    });
    let (sent_tx, sent_rx) = mpsc::unbounded_channel();
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let channel = MockChannel {
        link: Arc::clone(&link),
        sent: sent_tx,
    };
    let connector = MockConnector {
        next: Mutex::new(Some(Ok((channel, events_rx)))),
    };
    let server = Server {
        link,
        sent: sent_rx,
        events: events_tx,
    };
    (connector, server)
}

fn new_session(connector: MockConnector, identity: Identity) -> WorkspaceSession<MockConnector> {
    let address = ServerAddress::parse("http://localhost:3000").unwrap();
    WorkspaceSession::new(connector, address, identity, SessionConfig::default())
}

fn inbox() -> (
    impl Fn(Value) + Send + Sync + 'static,
    mpsc::UnboundedReceiver<Value>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        move |message: Value| {
            let _ = tx.send(message);
        },
        rx,
    )
}

async fn next_event(events: &mut broadcast::Receiver<SessionEvent>) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .expect("event within deadline")
        .expect("event stream open")
}

async fn assert_no_event(events: &mut broadcast::Receiver<SessionEvent>) {
    let result = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
    assert!(result.is_err(), "unexpected event: {result:?}");
}

/// Connects a session as `identity` and drains its
/// `Ready` event and the auth request.
async fn active_session(
    identity: Identity,
) -> (
    WorkspaceSession<MockConnector>,
    Server,
    broadcast::Receiver<SessionEvent>,
    mpsc::UnboundedReceiver<Value>,
) {
    let (connector, mut server) = mock("sid-1");
    let mut session = new_session(connector, identity);
    let mut events = session.subscribe();
    let (handler, inbox) = inbox();

    server.accept_auth();
    session.connect(handler).await.expect("connect");
    let request = server.next_frame().await;
    assert_eq!(request.event, event::AUTH_REQUEST);
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Ready { .. }
    ));

    (session, server, events, inbox)
}

// =========================================================================
// Initial authentication
// =========================================================================

#[tokio::test]
async fn test_connect_anonymous_becomes_active_and_sends_messages() {
    let (connector, mut server) = mock("sid-1");
    let mut session = new_session(connector, Identity::anonymous("ABC123"));
    let mut events = session.subscribe();
    let (handler, _inbox) = inbox();

    // Answer the request only after seeing it.
    let server_task = tokio::spawn(async move {
        let request = server.next_frame().await;
        server.accept_auth();
        (server, request)
    });
    session.connect(handler).await.expect("connect");
    let (mut server, request) = server_task.await.unwrap();

    assert_eq!(request.event, event::AUTH_REQUEST);
    assert_eq!(
        request.data,
        json!({ "code": "ABC123", "role": "anonymous-client" })
    );
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Ready {
            session_id: SessionId::new("sid-1")
        }
    );
    assert_eq!(session.state(), ConnectionState::Active);
    assert_eq!(session.id(), Some(SessionId::new("sid-1")));

    session.send_message(json!({ "type": "ping" })).unwrap();
    let frame = server.next_frame().await;
    assert_eq!(frame.event, event::MESSAGE);
    assert_eq!(frame.data, json!({ "type": "ping" }));
}

#[tokio::test]
async fn test_connect_authenticated_sends_credential() {
    let (connector, mut server) = mock("sid-1");
    let mut session = new_session(connector, Identity::authenticated("tok", "ABC123"));
    let (handler, _inbox) = inbox();

    server.accept_auth();
    session.connect(handler).await.unwrap();

    let request = server.next_frame().await;
    assert_eq!(
        request.data,
        json!({ "code": "ABC123", "authToken": "tok", "role": "authenticated-client" })
    );
}

#[tokio::test]
async fn test_connect_invalid_code_stays_unauthenticated() {
    let (connector, server) = mock("sid-1");
    let mut session = new_session(connector, Identity::anonymous("WRONG"));
    let mut events = session.subscribe();
    let (handler, _inbox) = inbox();

    server.reject_auth("InvalidCode");
    let result = session.connect(handler).await;

    assert!(matches!(
        result,
        Err(SessionError::Authentication(AuthenticationError::InvalidCode))
    ));
    assert_eq!(session.state(), ConnectionState::Unauthenticated);
    assert_eq!(session.id(), None);
    assert!(matches!(
        session.send_message(json!({})),
        Err(SessionError::NotConnected)
    ));
    assert!(server.is_closed());
    assert_no_event(&mut events).await;
}

#[tokio::test]
async fn test_connect_unknown_rejection_keeps_server_detail() {
    let (connector, server) = mock("sid-1");
    let mut session = new_session(connector, Identity::anonymous("ABC123"));
    let (handler, _inbox) = inbox();

    server.reject_auth("Banned");
    let result = session.connect(handler).await;

    assert!(matches!(
        result,
        Err(SessionError::Authentication(AuthenticationError::Rejected { name: Some(ref name), .. }))
            if name == "Banned"
    ));
}

#[tokio::test]
async fn test_connect_transport_failure_returns_connection_error() {
    let connector = MockConnector {
        next: Mutex::new(Some(Err(TransportError::ConnectTimeout))),
    };
    let mut session = new_session(connector, Identity::anonymous("ABC123"));
    let (handler, _inbox) = inbox();

    let result = session.connect(handler).await;

    assert!(matches!(
        result,
        Err(SessionError::Connection(TransportError::ConnectTimeout))
    ));
    assert_eq!(session.state(), ConnectionState::Unauthenticated);
}

#[tokio::test]
async fn test_connect_drop_before_answer_returns_connection_error() {
    let (connector, server) = mock("sid-1");
    let mut session = new_session(connector, Identity::anonymous("ABC123"));
    let (handler, _inbox) = inbox();

    server
        .events
        .send(ChannelEvent::Disconnect {
            reason: "transport close".into(),
        })
        .unwrap();
    let result = session.connect(handler).await;

    assert!(matches!(
        result,
        Err(SessionError::Connection(TransportError::Connection(_)))
    ));
    assert_eq!(session.state(), ConnectionState::Unauthenticated);
}

#[tokio::test]
async fn test_connect_skips_frames_before_answer() {
    let (connector, server) = mock("sid-1");
    let mut session = new_session(connector, Identity::anonymous("ABC123"));
    let (handler, mut inbox) = inbox();

    server.push(Frame::with_data(event::MESSAGE, json!({ "early": true })));
    server.push(Frame::new(event::UPDATE_STARTED));
    server.accept_auth();
    session.connect(handler).await.unwrap();

    assert!(session.is_writable());
    server.push(Frame::with_data(event::MESSAGE, json!({ "late": true })));
    let delivered = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(delivered, json!({ "late": true }));
}

#[tokio::test]
async fn test_connect_cancelled_mid_handshake_rolls_back() {
    let (connector, server) = mock("sid-1");
    let mut session = new_session(connector, Identity::anonymous("ABC123"));
    let mut events = session.subscribe();
    let (handler, _inbox) = inbox();

    // The server never answers, so the caller's deadline fires first.
    let result = tokio::time::timeout(Duration::from_millis(50), session.connect(handler)).await;

    assert!(result.is_err(), "connect should still be pending");
    assert_eq!(session.state(), ConnectionState::Unauthenticated);
    assert!(server.is_closed());
    assert_no_event(&mut events).await;

    // A retry runs the connector again instead of failing as a duplicate.
    let (handler, _inbox) = inbox();
    assert!(matches!(
        session.connect(handler).await,
        Err(SessionError::Connection(TransportError::Connection(_)))
    ));
    assert_eq!(session.state(), ConnectionState::Unauthenticated);
}

#[tokio::test]
async fn test_connect_blank_access_code_fails_before_opening_channel() {
    let (connector, mut server) = mock("sid-1");
    let mut session = new_session(connector, Identity::anonymous("  "));
    let (handler, _inbox) = inbox();

    let result = session.connect(handler).await;

    assert!(matches!(result, Err(SessionError::MissingAccessCode)));
    assert_eq!(session.state(), ConnectionState::Unauthenticated);
    assert!(server.sent.try_recv().is_err(), "nothing reached the server");
}

#[tokio::test]
async fn test_connect_twice_returns_already_connected() {
    let (mut session, _server, _events, _inbox) =
        active_session(Identity::anonymous("ABC123")).await;
    let (handler, _inbox) = inbox();

    assert!(matches!(
        session.connect(handler).await,
        Err(SessionError::AlreadyConnected)
    ));
}

// =========================================================================
// Messaging
// =========================================================================

#[tokio::test]
async fn test_inbound_messages_reach_handler_in_order() {
    let (_session, server, _events, mut inbox) =
        active_session(Identity::anonymous("ABC123")).await;

    for n in 0..3 {
        server.push(Frame::with_data(event::MESSAGE, json!({ "n": n })));
    }

    for n in 0..3 {
        let message = tokio::time::timeout(Duration::from_secs(2), inbox.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(message, json!({ "n": n }));
    }
}

#[tokio::test]
async fn test_send_message_before_connect_returns_not_connected() {
    let (connector, _server) = mock("sid-1");
    let session = new_session(connector, Identity::anonymous("ABC123"));

    assert!(matches!(
        session.send_message(json!({ "type": "ping" })),
        Err(SessionError::NotConnected)
    ));
}

// =========================================================================
// Workspace lifecycle
// =========================================================================

#[tokio::test]
async fn test_workspace_update_pauses_writes_until_finished() {
    let (session, mut server, mut events, _inbox) =
        active_session(Identity::anonymous("ABC123")).await;

    server.push(Frame::with_data(event::UPDATE_STARTED, json!({ "eta": 30 })));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::DegradedStarted {
            payload: Some(json!({ "eta": 30 }))
        }
    );
    assert_eq!(
        session.state(),
        ConnectionState::Degraded(DegradeCause::Maintenance)
    );
    assert!(matches!(
        session.send_message(json!({ "type": "edit" })),
        Err(SessionError::NotConnected)
    ));

    server.push(Frame::new(event::UPDATE_FINISHED));
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::DegradedEnded {
            outcome: UpdateOutcome::Finished,
            payload: None,
        }
    );
    session.send_message(json!({ "type": "edit" })).unwrap();
    assert_eq!(server.next_frame().await.data, json!({ "type": "edit" }));
}

#[tokio::test]
async fn test_workspace_update_failed_also_resumes_writes() {
    let (session, server, mut events, _inbox) =
        active_session(Identity::anonymous("ABC123")).await;

    server.push(Frame::new(event::UPDATE_STARTED));
    next_event(&mut events).await;
    server.push(Frame::new(event::UPDATE_FAILED));

    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::DegradedEnded {
            outcome: UpdateOutcome::Failed,
            ..
        }
    ));
    assert!(session.is_writable());
}

#[tokio::test]
async fn test_lifecycle_burst_publishes_events_in_transition_order() {
    let (session, server, mut events, _inbox) =
        active_session(Identity::anonymous("ABC123")).await;

    server.push(Frame::with_data(event::UPDATE_STARTED, json!({ "n": 1 })));
    server.push(Frame::new(event::UPDATE_FINISHED));
    server.push(Frame::with_data(event::UPDATE_STARTED, json!({ "n": 2 })));
    server.push(Frame::new(event::UPDATE_FAILED));

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::DegradedStarted {
            payload: Some(json!({ "n": 1 }))
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::DegradedEnded {
            outcome: UpdateOutcome::Finished,
            payload: None,
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::DegradedStarted {
            payload: Some(json!({ "n": 2 }))
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::DegradedEnded {
            outcome: UpdateOutcome::Failed,
            payload: None,
        }
    );
    assert_no_event(&mut events).await;
    assert_eq!(session.state(), ConnectionState::Active);
}

#[tokio::test]
async fn test_room_destroyed_terminates_exactly_once() {
    let (mut session, server, mut events, _inbox) =
        active_session(Identity::anonymous("ABC123")).await;

    server.push(Frame::with_data(event::ROOM_DESTROYED, json!({ "by": "owner" })));
    server.push(Frame::new(event::ROOM_DESTROYED));

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Terminated {
            reason: TerminationReason::RoomDestroyed {
                payload: Some(json!({ "by": "owner" }))
            }
        }
    );
    assert_no_event(&mut events).await;
    assert_eq!(session.state(), ConnectionState::Terminated);
    server.wait_closed().await;

    session.disconnect();
    assert_no_event(&mut events).await;
    let (handler, _inbox) = inbox();
    assert!(matches!(
        session.connect(handler).await,
        Err(SessionError::Terminated)
    ));
}

// =========================================================================
// Reconnection
// =========================================================================

#[tokio::test]
async fn test_reconnect_reauthenticates_with_stored_identity() {
    let (session, mut server, mut events, _inbox) =
        active_session(Identity::authenticated("tok", "ABC123")).await;

    server.drop_transport();
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Disconnected {
            reason: "transport close".into()
        }
    );
    assert!(!session.is_writable());

    server.reconnect(1, "sid-2");
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Reconnecting { attempt: 1 }
    );

    let request = server.next_frame().await;
    assert_eq!(request.event, event::AUTH_REQUEST);
    assert_eq!(request.data["code"], "ABC123");
    assert_eq!(request.data["authToken"], "tok");

    server.accept_auth();
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Reauthenticated {
            session_id: SessionId::new("sid-2")
        }
    );
    assert_eq!(session.id(), Some(SessionId::new("sid-2")));
    assert!(session.is_writable());
}

#[tokio::test]
async fn test_reauthentication_rejected_stays_degraded() {
    let (session, mut server, mut events, _inbox) =
        active_session(Identity::anonymous("ABC123")).await;

    server.drop_transport();
    server.reconnect(1, "sid-2");
    server.next_frame().await;
    server.reject_auth("WorkspaceNotFound");

    next_event(&mut events).await; // Disconnected
    next_event(&mut events).await; // Reconnecting
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::ReauthenticationFailed {
            error: AuthenticationError::WorkspaceNotFound
        }
    );
    assert_eq!(
        session.state(),
        ConnectionState::Degraded(DegradeCause::ConnectionLost)
    );
    assert!(matches!(
        session.send_message(json!({})),
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn test_overlapping_reconnects_negotiate_once() {
    let (_session, mut server, mut events, _inbox) =
        active_session(Identity::anonymous("ABC123")).await;

    server.drop_transport();
    server.reconnect(1, "sid-2");
    server
        .events
        .send(ChannelEvent::Reconnect { attempt: 1 })
        .unwrap();

    server.next_frame().await;
    server.accept_auth();
    server.accept_auth();

    next_event(&mut events).await; // Disconnected
    next_event(&mut events).await; // Reconnecting
    assert!(matches!(
        next_event(&mut events).await,
        SessionEvent::Reauthenticated { .. }
    ));
    assert_no_event(&mut events).await;
    assert!(server.sent.try_recv().is_err(), "only one request sent");
}

#[tokio::test]
async fn test_reconnect_gave_up_terminates_session() {
    let (session, server, mut events, _inbox) =
        active_session(Identity::anonymous("ABC123")).await;

    server.drop_transport();
    server.events.send(ChannelEvent::ReconnectFailed).unwrap();

    next_event(&mut events).await; // Disconnected
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Terminated {
            reason: TerminationReason::ReconnectExhausted
        }
    );
    assert_eq!(session.state(), ConnectionState::Terminated);
}

// =========================================================================
// Disconnect
// =========================================================================

#[tokio::test]
async fn test_disconnect_terminates_and_closes_channel() {
    let (session, server, mut events, _inbox) =
        active_session(Identity::anonymous("ABC123")).await;

    session.disconnect();
    session.disconnect();

    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Terminated {
            reason: TerminationReason::Disconnected
        }
    );
    assert_no_event(&mut events).await;
    assert!(server.is_closed());
    assert!(matches!(
        session.send_message(json!({})),
        Err(SessionError::NotConnected)
    ));
}

#[tokio::test]
async fn test_drop_closes_channel_and_publishes_termination() {
    let (session, server, mut events, _inbox) =
        active_session(Identity::anonymous("ABC123")).await;

    drop(session);

    assert!(server.is_closed());
    assert_eq!(
        next_event(&mut events).await,
        SessionEvent::Terminated {
            reason: TerminationReason::Disconnected
        }
    );
}

#[tokio::test]
async fn test_control_plane_carries_base_uri_and_credential() {
    let (connector, _server) = mock("sid-1");
    let address = ServerAddress::parse("https://example.com/workspace/").unwrap();
    let session = WorkspaceSession::new(
        connector,
        address,
        Identity::authenticated("tok", "ABC123"),
        SessionConfig::default(),
    );

    let context = session.control_plane();

    assert_eq!(context.base_uri, "https://example.com/workspace");
    assert_eq!(context.credential.as_deref(), Some("tok"));
}
