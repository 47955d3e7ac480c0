//! End-to-end scenario tests spanning the full component stack: Dispatcher,
//! Connection Registry, Room/Presence Engine, and Circuit Breaker wired
//! together the way `app::App::init` wires them, rather than any one
//! component in isolation.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::watch;

use crate::auth::{Principal, Role};
use crate::breaker::{BreakerConfig, CircuitBreaker};
use crate::broadcast::Broadcaster;
use crate::bus::EventBus;
use crate::envelope::InboundMessage;
use crate::registry::connection::Connection;
use crate::registry::ConnectionRegistry;
use crate::rooms::room::Visibility;
use crate::rooms::{NoParticipants, RoomEngine};
use crate::router::handlers::{self, HandlerContext, HandlerTable};
use crate::router::Dispatcher;
use crate::supervisor::Supervisor;

struct Harness {
    dispatcher: Dispatcher,
    registry: Arc<ConnectionRegistry>,
    rooms: Arc<RoomEngine>,
    breaker: Arc<CircuitBreaker>,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), 20));
        let rooms = Arc::new(RoomEngine::new(broadcaster, Arc::new(NoParticipants), 200, 500, 3, 60));
        let breaker = Arc::new(CircuitBreaker::init(dir.path(), bus).await.unwrap());
        breaker
            .register(
                "wallet",
                BreakerConfig {
                    failure_threshold: 2,
                    recovery_timeout_secs: 3600,
                    request_limit: 1,
                    monitoring_window_secs: 3600,
                    minimum_requests: 1,
                },
            )
            .await;

        let handlers = Arc::new(
            HandlerTable::builder()
                .register("terminal", "getTerminalData", Arc::new(handlers::terminal::GetTerminalData))
                .register("ai", "stream", Arc::new(handlers::ai::StreamChat))
                .register("contest", "sendChatMessage", Arc::new(handlers::contest::SendChatMessage))
                .register("contest", "SET_ADMIN_PRESENCE", Arc::new(handlers::contest::SetAdminPresence))
                .register("wallet", "getBalance", Arc::new(handlers::wallet::GetBalance))
                .build(),
        );
        let dispatcher = Dispatcher::new(registry.clone(), handlers, Duration::from_secs(5), rooms.clone());

        Self {
            dispatcher,
            registry,
            rooms,
            breaker,
        }
    }

    fn connect(&self, principal: Principal) -> (Arc<Connection>, tokio::sync::mpsc::Receiver<crate::envelope::Envelope>) {
        let (conn, rx) = Connection::new(principal, 100, 100.0);
        self.registry.register(conn.clone());
        (conn, rx)
    }

    fn ctx(&self, principal: Principal, connection_id: crate::registry::ConnectionId) -> HandlerContext {
        let (_tx, rx) = watch::channel(false);
        HandlerContext {
            principal,
            connection_id,
            request_id: "unused".to_string(),
            rooms: self.rooms.clone(),
            breaker: self.breaker.clone(),
            supervisor: Arc::new(Supervisor::new(Arc::new(EventBus::new()), Duration::from_secs(3600))),
            cancel: rx,
        }
    }
}

/// A guest asks for public terminal data and gets a response.
#[tokio::test]
async fn happy_request_returns_response() {
    let harness = Harness::new().await;
    let (conn, mut rx) = harness.connect(Principal::guest());
    let ctx = harness.ctx(Principal::guest(), conn.id);

    harness
        .dispatcher
        .dispatch(
            &conn,
            InboundMessage::Request {
                topic: "terminal".into(),
                action: "getTerminalData".into(),
                request_id: "r1".into(),
                data: None,
            },
            move |_| ctx,
        )
        .await;

    let envelope = rx.try_recv().unwrap();
    assert_eq!(envelope.request_id.as_deref(), Some("r1"));
    assert!(envelope.error.is_none());
}

/// An authenticated caller gets a streamed reply terminated by
/// a stream-complete marker sharing the same request id.
#[tokio::test]
async fn streamed_reply_completes() {
    let harness = Harness::new().await;
    let principal = Principal { id: "u1".into(), role: Role::User };
    let (conn, mut rx) = harness.connect(principal.clone());
    let ctx = harness.ctx(principal, conn.id);

    harness
        .dispatcher
        .dispatch(
            &conn,
            InboundMessage::Request {
                topic: "ai".into(),
                action: "stream".into(),
                request_id: "r2".into(),
                data: Some(json!({"messages": [{"role": "user", "content": "hi"}]})),
            },
            move |_| ctx,
        )
        .await;

    let mut saw_chunk = false;
    let mut saw_complete = false;
    while let Ok(envelope) = rx.try_recv() {
        match envelope.action.as_deref() {
            Some("stream-chunk") => saw_chunk = true,
            Some("stream-complete") => saw_complete = true,
            _ => {}
        }
        assert_eq!(envelope.request_id.as_deref(), Some("r2"));
    }
    assert!(saw_chunk);
    assert!(saw_complete);
}

/// A guest subscribing to an admin-only topic is denied.
#[tokio::test]
async fn forbidden_subscribe_is_denied() {
    let harness = Harness::new().await;
    let (conn, mut rx) = harness.connect(Principal::guest());

    harness
        .dispatcher
        .dispatch(&conn, InboundMessage::Subscribe { topic: "admin".into() }, |_| unreachable!())
        .await;

    let envelope = rx.try_recv().unwrap();
    assert_eq!(envelope.error.unwrap().code, "auth_required");
    assert_eq!(harness.registry.subscriber_count("admin"), 0);
}

/// Subscribing to a contest's channel is the wire path into its room: no
/// separate join action exists, and a message sent without first
/// subscribing is rejected as a non-member.
#[tokio::test]
async fn subscribing_to_contest_channel_joins_the_room() {
    let harness = Harness::new().await;
    let principal = Principal { id: "p2".into(), role: Role::User };
    let (conn, mut rx) = harness.connect(principal.clone());

    harness
        .dispatcher
        .dispatch(&conn, InboundMessage::Subscribe { topic: "contest.11".into() }, |_| unreachable!())
        .await;
    rx.try_recv().unwrap();
    assert!(conn.rooms_snapshot().contains(&11));

    let ctx = harness.ctx(principal, conn.id);
    harness
        .dispatcher
        .dispatch(
            &conn,
            InboundMessage::Request {
                topic: "contest".into(),
                action: "sendChatMessage".into(),
                request_id: "r5".into(),
                data: Some(json!({"contestId": 11, "text": "hello"})),
            },
            move |_| ctx,
        )
        .await;
    let envelope = rx.try_recv().unwrap();
    assert!(envelope.error.is_none());
}

/// A chat participant who exceeds the rate window gets
/// `rate_limit` once the window's message budget (3 per minute here) is
/// spent, without the earlier messages being rejected.
#[tokio::test]
async fn chat_overflow_rate_limited() {
    let harness = Harness::new().await;
    let principal = Principal { id: "p1".into(), role: Role::User };
    let (conn, mut rx) = harness.connect(principal.clone());
    harness.rooms.join(7, conn.id, &principal, Visibility::Hidden).unwrap();

    for i in 0..3 {
        let ctx = harness.ctx(principal.clone(), conn.id);
        harness
            .dispatcher
            .dispatch(
                &conn,
                InboundMessage::Request {
                    topic: "contest".into(),
                    action: "sendChatMessage".into(),
                    request_id: format!("c{i}"),
                    data: Some(json!({"contestId": 7, "text": format!("message {i}")})),
                },
                move |_| ctx,
            )
            .await;
        let envelope = rx.try_recv().unwrap();
        assert!(envelope.error.is_none(), "message {i} should be accepted");
    }

    let ctx = harness.ctx(principal.clone(), conn.id);
    harness
        .dispatcher
        .dispatch(
            &conn,
            InboundMessage::Request {
                topic: "contest".into(),
                action: "sendChatMessage".into(),
                request_id: "overflow".into(),
                data: Some(json!({"contestId": 7, "text": "one too many"})),
            },
            move |_| ctx,
        )
        .await;
    let envelope = rx.try_recv().unwrap();
    assert_eq!(envelope.error.unwrap().code, "rate_limit");
}

/// Repeated backend failures trip the breaker, after which the
/// wallet read path surfaces `service_unavailable` instead of hanging.
#[tokio::test]
async fn breaker_trip_surfaces_service_unavailable() {
    let harness = Harness::new().await;
    harness.breaker.record_failure("wallet", "upstream timeout").await;
    harness.breaker.record_failure("wallet", "upstream timeout").await;
    assert_eq!(harness.breaker.state("wallet"), Some(crate::breaker::CircuitState::Open));

    let principal = Principal { id: "u2".into(), role: Role::User };
    let (conn, mut rx) = harness.connect(principal.clone());
    let ctx = harness.ctx(principal, conn.id);

    harness
        .dispatcher
        .dispatch(
            &conn,
            InboundMessage::Request {
                topic: "wallet".into(),
                action: "getBalance".into(),
                request_id: "r3".into(),
                data: None,
            },
            move |_| ctx,
        )
        .await;

    let envelope = rx.try_recv().unwrap();
    let error = envelope.error.unwrap();
    assert_eq!(error.code, "service_unavailable");
    assert_eq!(error.retry_after, Some(30));
}

/// An admin flipping from hidden to visible presence triggers
/// an `ADMIN_PRESENCE` broadcast to the room's other subscribers.
#[tokio::test]
async fn admin_visibility_flip_broadcasts() {
    let harness = Harness::new().await;
    let admin = Principal { id: "a1".into(), role: Role::Admin };
    let (admin_conn, _admin_rx) = harness.connect(admin.clone());
    harness.rooms.join(9, admin_conn.id, &admin, Visibility::Hidden).unwrap();

    let spectator = Principal { id: "s1".into(), role: Role::Guest };
    let (spectator_conn, mut spectator_rx) = harness.connect(spectator.clone());
    harness.registry.subscribe(spectator_conn.id, "contest.9").unwrap();
    harness.rooms.join(9, spectator_conn.id, &spectator, Visibility::Hidden).unwrap();
    while spectator_rx.try_recv().is_ok() {}

    let ctx = harness.ctx(admin.clone(), admin_conn.id);
    harness
        .dispatcher
        .dispatch(
            &admin_conn,
            InboundMessage::Request {
                topic: "contest".into(),
                action: "SET_ADMIN_PRESENCE".into(),
                request_id: "r4".into(),
                data: Some(json!({"contestId": 9, "visibility": "visible"})),
            },
            move |_| ctx,
        )
        .await;

    let mut saw_admin_presence = false;
    while let Ok(envelope) = spectator_rx.try_recv() {
        if envelope.action.as_deref() == Some("ADMIN_PRESENCE") {
            saw_admin_presence = true;
            assert_eq!(envelope.data.unwrap()["active"], json!(true));
        }
    }
    assert!(saw_admin_presence);
}
