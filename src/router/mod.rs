//! Topic Router & Request Dispatcher (C5)
//!
//! Maps inbound `SUBSCRIBE`/`UNSUBSCRIBE`/`REQUEST`/`PING` messages to the
//! Connection Registry or a looked-up `(topic, action)` handler. Replaces
//! "dynamic handler registration via loose objects" with the typed
//! `HandlerTable`.

pub mod handlers;

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;

use crate::envelope::{Envelope, InboundMessage};
use crate::registry::ConnectionRegistry;
use crate::registry::connection::Connection;
use crate::rooms::room::Visibility;
use crate::rooms::{JoinError, RoomEngine};

pub use handlers::{CancelToken, Handler, HandlerContext, HandlerOutcome, HandlerTable};

pub struct Dispatcher {
    registry: Arc<ConnectionRegistry>,
    handlers: Arc<HandlerTable>,
    request_deadline: Duration,
    rooms: Arc<RoomEngine>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<ConnectionRegistry>,
        handlers: Arc<HandlerTable>,
        request_deadline: Duration,
        rooms: Arc<RoomEngine>,
    ) -> Self {
        Self {
            registry,
            handlers,
            request_deadline,
            rooms,
        }
    }

    /// Parse and dispatch one inbound frame. Malformed JSON produces a
    /// `protocol` error with no state change rather than propagating a
    /// parse error up to the transport layer.
    pub async fn dispatch_raw(&self, conn: &Arc<Connection>, raw: &str, ctx_factory: impl FnOnce(String) -> HandlerContext) {
        conn.touch();
        let msg: InboundMessage = match serde_json::from_str(raw) {
            Ok(msg) => msg,
            Err(_) => {
                conn.enqueue(Envelope::error("protocol", "malformed frame"));
                return;
            }
        };
        self.dispatch(conn, msg, ctx_factory).await;
    }

    pub async fn dispatch(
        &self,
        conn: &Arc<Connection>,
        msg: InboundMessage,
        ctx_factory: impl FnOnce(String) -> HandlerContext,
    ) {
        match msg {
            InboundMessage::Subscribe { topic } => self.handle_subscribe(conn, topic),
            InboundMessage::Unsubscribe { topic } => self.handle_unsubscribe(conn, topic),
            InboundMessage::Ping => {
                conn.enqueue(Envelope::pong());
            }
            InboundMessage::Request {
                topic,
                action,
                request_id,
                data,
            } => {
                self.handle_request(conn, topic, action, request_id, data, ctx_factory).await;
            }
        }
    }

    fn handle_subscribe(&self, conn: &Arc<Connection>, topic: String) {
        match self.registry.subscribe(conn.id, &topic) {
            Ok(()) => {
                self.join_room_for_channel(conn, &topic);
                conn.enqueue(Envelope::ack(topic));
            }
            Err(reason) => {
                conn.enqueue(Envelope::error(reason.code(), format!("cannot subscribe to {topic}")));
            }
        };
    }

    /// Subscribing to a `contest.<id>` channel is the wire-level trigger for
    /// joining that contest's room: there is no separate join action.
    /// `AlreadyMember` is not an error here, since re-subscribing to a
    /// channel you're already subscribed to is itself a no-op.
    fn join_room_for_channel(&self, conn: &Arc<Connection>, channel: &str) {
        if crate::registry::topic_table::parent_topic(channel) != "contest" {
            return;
        }
        let Some((_, scope)) = channel.split_once('.') else {
            return;
        };
        let Ok(contest_id) = scope.parse::<u64>() else {
            return;
        };

        let principal = conn.principal_snapshot();
        match self.rooms.join(contest_id, conn.id, &principal, Visibility::Hidden) {
            Ok(_) | Err(JoinError::AlreadyMember) => conn.join_room(contest_id),
        }
    }

    fn handle_unsubscribe(&self, conn: &Arc<Connection>, topic: String) {
        self.registry.unsubscribe(conn.id, &topic);
        conn.enqueue(Envelope::ack(topic));
    }

    async fn handle_request(
        &self,
        conn: &Arc<Connection>,
        topic: String,
        action: String,
        request_id: String,
        data: Option<serde_json::Value>,
        ctx_factory: impl FnOnce(String) -> HandlerContext,
    ) {
        if !crate::registry::topic_table::is_known_topic(&topic) {
            conn.enqueue(Envelope::error_with_request("unknown_topic", format!("unknown topic {topic}"), request_id));
            return;
        }

        let Some(handler) = self.handlers.lookup(&topic, &action) else {
            conn.enqueue(Envelope::error_with_request(
                "unknown_action",
                format!("unknown action {action} on topic {topic}"),
                request_id,
            ));
            return;
        };

        let ctx = ctx_factory(request_id.clone());
        let outcome = tokio::time::timeout(self.request_deadline, handler.handle(&ctx, data)).await;

        match outcome {
            Err(_) => {
                conn.enqueue(Envelope::error_with_request("timeout", "request deadline exceeded", request_id));
            }
            Ok(Err(err)) => {
                let mut envelope = Envelope::error_with_request(err.code(), err.message.clone(), request_id);
                if let Some(secs) = err.retry_after_secs {
                    envelope = envelope.with_retry_after(secs);
                }
                conn.enqueue(envelope);
            }
            Ok(Ok(HandlerOutcome::Response(value))) => {
                conn.enqueue(Envelope::response(topic, request_id, value));
            }
            Ok(Ok(HandlerOutcome::Stream(mut stream))) => {
                while let Some(chunk) = stream.next().await {
                    if handlers::is_cancelled(&ctx.cancel) {
                        return;
                    }
                    conn.enqueue(Envelope::stream_chunk(topic.clone(), request_id.clone(), chunk));
                }
                conn.enqueue(Envelope::stream_complete(topic, request_id));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{Principal, Role};
    use crate::breaker::CircuitBreaker;
    use crate::bus::EventBus;
    use crate::registry::connection::Connection;
    use crate::rooms::{NoParticipants, RoomEngine};
    use crate::broadcast::Broadcaster;
    use crate::supervisor::Supervisor;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::watch;

    fn test_rooms(registry: Arc<ConnectionRegistry>) -> Arc<RoomEngine> {
        let broadcaster = Arc::new(Broadcaster::new(registry, 20));
        Arc::new(RoomEngine::new(broadcaster, Arc::new(NoParticipants), 200, 500, 10, 30))
    }

    fn dispatcher() -> (Dispatcher, Arc<ConnectionRegistry>) {
        let registry = Arc::new(ConnectionRegistry::new());
        let handlers = Arc::new(
            HandlerTable::builder()
                .register("terminal", "getTerminalData", Arc::new(handlers::terminal::GetTerminalData))
                .build(),
        );
        let rooms = test_rooms(registry.clone());
        (Dispatcher::new(registry.clone(), handlers, Duration::from_secs(5), rooms), registry)
    }

    async fn ctx(principal: Principal, connection_id: crate::registry::ConnectionId) -> (HandlerContext, watch::Sender<bool>) {
        let (tx, rx) = watch::channel(false);
        let dir = tempfile::tempdir().unwrap();
        let bus = Arc::new(EventBus::new());
        let breaker = Arc::new(CircuitBreaker::init(dir.path(), bus.clone()).await.unwrap());
        let registry = Arc::new(ConnectionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry, 20));
        let rooms = Arc::new(RoomEngine::new(broadcaster, Arc::new(NoParticipants), 200, 500, 10, 30));
        let supervisor = Arc::new(Supervisor::new(bus, Duration::from_secs(3600)));
        (
            HandlerContext {
                principal,
                connection_id,
                request_id: "r1".to_string(),
                rooms,
                breaker,
                supervisor,
                cancel: rx,
            },
            tx,
        )
    }

    #[tokio::test]
    async fn test_happy_request_returns_response() {
        let (dispatcher, registry) = dispatcher();
        let (conn, mut rx) = Connection::new(Principal::guest(), 10, 1.0);
        registry.register(conn.clone());

        let (handler_ctx, _tx) = ctx(Principal::guest(), conn.id).await;
        dispatcher
            .dispatch(
                &conn,
                crate::envelope::InboundMessage::Request {
                    topic: "terminal".to_string(),
                    action: "getTerminalData".to_string(),
                    request_id: "r1".to_string(),
                    data: None,
                },
                move |_| handler_ctx,
            )
            .await;

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.request_id, Some("r1".to_string()));
    }

    #[tokio::test]
    async fn test_unknown_topic_errors() {
        let (dispatcher, registry) = dispatcher();
        let (conn, mut rx) = Connection::new(Principal::guest(), 10, 1.0);
        registry.register(conn.clone());
        let (handler_ctx, _tx) = ctx(Principal::guest(), conn.id).await;

        dispatcher
            .dispatch(
                &conn,
                crate::envelope::InboundMessage::Request {
                    topic: "bogus".to_string(),
                    action: "x".to_string(),
                    request_id: "r1".to_string(),
                    data: None,
                },
                move |_| handler_ctx,
            )
            .await;

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.error.unwrap().code, "unknown_topic");
    }

    #[tokio::test]
    async fn test_unknown_action_errors() {
        let (dispatcher, registry) = dispatcher();
        let (conn, mut rx) = Connection::new(Principal::guest(), 10, 1.0);
        registry.register(conn.clone());
        let (handler_ctx, _tx) = ctx(Principal::guest(), conn.id).await;

        dispatcher
            .dispatch(
                &conn,
                crate::envelope::InboundMessage::Request {
                    topic: "terminal".to_string(),
                    action: "bogus".to_string(),
                    request_id: "r1".to_string(),
                    data: None,
                },
                move |_| handler_ctx,
            )
            .await;

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.error.unwrap().code, "unknown_action");
    }

    #[tokio::test]
    async fn test_subscribe_then_unsubscribe_is_clean() {
        let (dispatcher, registry) = dispatcher();
        let (conn, mut rx) = Connection::new(Principal::guest(), 10, 1.0);
        registry.register(conn.clone());

        dispatcher
            .dispatch(&conn, crate::envelope::InboundMessage::Subscribe { topic: "market-data".into() }, |_| {
                unreachable!()
            })
            .await;
        assert_eq!(registry.subscriber_count("market-data"), 1);
        rx.try_recv().unwrap();

        dispatcher
            .dispatch(&conn, crate::envelope::InboundMessage::Unsubscribe { topic: "market-data".into() }, |_| {
                unreachable!()
            })
            .await;
        assert_eq!(registry.subscriber_count("market-data"), 0);
    }

    #[tokio::test]
    async fn test_subscribe_to_contest_channel_joins_room() {
        let (dispatcher, registry) = dispatcher();
        let (conn, mut rx) = Connection::new(Principal::guest(), 10, 1.0);
        registry.register(conn.clone());

        dispatcher
            .dispatch(&conn, crate::envelope::InboundMessage::Subscribe { topic: "contest.5".into() }, |_| unreachable!())
            .await;

        assert!(conn.rooms_snapshot().contains(&5));
        rx.try_recv().unwrap();
    }

    #[tokio::test]
    async fn test_forbidden_subscribe_denied() {
        let (dispatcher, registry) = dispatcher();
        let (conn, mut rx) = Connection::new(Principal::guest(), 10, 1.0);
        registry.register(conn.clone());

        dispatcher
            .dispatch(&conn, crate::envelope::InboundMessage::Subscribe { topic: "admin".into() }, |_| unreachable!())
            .await;

        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.error.unwrap().code, "auth_required");
    }

    #[tokio::test]
    async fn test_malformed_frame_is_protocol_error() {
        let (dispatcher, registry) = dispatcher();
        let (conn, mut rx) = Connection::new(Principal::guest(), 10, 1.0);
        registry.register(conn.clone());

        dispatcher.dispatch_raw(&conn, "not json", |_| unreachable!()).await;
        let envelope = rx.try_recv().unwrap();
        assert_eq!(envelope.error.unwrap().code, "protocol");
    }

    #[tokio::test]
    async fn test_streamed_reply_terminates_with_complete() {
        let registry = Arc::new(ConnectionRegistry::new());
        let handlers = Arc::new(
            HandlerTable::builder()
                .register("ai", "stream", Arc::new(handlers::ai::StreamChat))
                .build(),
        );
        let rooms = test_rooms(registry.clone());
        let dispatcher = Dispatcher::new(registry.clone(), handlers, Duration::from_secs(5), rooms);

        let (conn, mut rx) = Connection::new(
            Principal {
                id: "u1".into(),
                role: Role::User,
            },
            10,
            1.0,
        );
        registry.register(conn.clone());
        let (handler_ctx, _tx) = ctx(Principal {
            id: "u1".into(),
            role: Role::User,
        }, conn.id)
        .await;

        dispatcher
            .dispatch(
                &conn,
                crate::envelope::InboundMessage::Request {
                    topic: "ai".to_string(),
                    action: "stream".to_string(),
                    request_id: "r2".to_string(),
                    data: Some(json!({"messages": [{"role": "user", "content": "hi"}]})),
                },
                move |_| handler_ctx,
            )
            .await;

        let mut chunks = 0;
        let mut saw_complete = false;
        while let Ok(envelope) = rx.try_recv() {
            if envelope.action.as_deref() == Some("stream-chunk") {
                chunks += 1;
            }
            if envelope.action.as_deref() == Some("stream-complete") {
                saw_complete = true;
            }
        }
        assert!(chunks >= 1);
        assert!(saw_complete);
    }
}
