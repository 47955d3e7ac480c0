//! WebSocket upgrade handler and the per-connection session loop
//!
//! Uses the split-socket pattern common to axum WebSocket servers: a
//! `SplitSink`/`SplitStream` pair driven from a single `tokio::select!`
//! loop rather than two independently spawned tasks, since nothing here
//! needs to write to the socket from more than one place.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum_extra::extract::cookie::CookieJar;
use futures::{SinkExt, StreamExt};
use serde_json::json;

use crate::auth::{Credential, Principal};
use crate::core::constants::{
    CLOSE_CODE_AUTH_FAILED, CLOSE_CODE_NORMAL, CLOSE_CODE_PAYLOAD_TOO_LARGE, CLOSE_CODE_SERVER_SHUTDOWN,
    CLOSE_CODE_SLOW_CONSUMER, SESSION_COOKIE_NAME,
};
use crate::envelope::Envelope;
use crate::registry::connection::Connection;
use crate::router::HandlerContext;

use super::server::HubState;

fn extract_credential(headers: &HeaderMap, jar: &CookieJar, query: &HashMap<String, String>) -> Option<Credential> {
    if let Some(value) = headers.get(crate::auth::AuthVerifier::service_auth_header_name()) {
        if let Ok(value) = value.to_str() {
            return Some(Credential::ServiceHeader(value.to_string()));
        }
    }
    if let Some(value) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(value) = value.to_str() {
            if let Some(token) = value.strip_prefix("Bearer ") {
                return Some(Credential::SessionToken(token.to_string()));
            }
        }
    }
    if let Some(cookie) = jar.get(SESSION_COOKIE_NAME) {
        return Some(Credential::SessionToken(cookie.value().to_string()));
    }
    if let Some(token) = query.get("token") {
        return Some(Credential::SessionToken(token.clone()));
    }
    None
}

pub async fn ws_handler(
    State(state): State<HubState>,
    headers: HeaderMap,
    jar: CookieJar,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let credential = extract_credential(&headers, &jar, &query);
    let outcome = state.auth.verify(credential);

    ws.on_upgrade(move |socket| session(socket, state, outcome))
}

/// A credential was presented but rejected (bad signature, expired, replayed
/// HMAC window). Rather than refuse the HTTP upgrade, we complete it and
/// close immediately with `AuthFailed` so every rejection, pre- or
/// mid-connection, speaks the same close-code vocabulary. A
/// missing credential is never an error here: `AuthVerifier::verify` already
/// resolves that to the guest principal.
async fn session(socket: WebSocket, state: HubState, auth_outcome: Result<Principal, crate::auth::AuthError>) {
    let (mut ws_tx, ws_rx) = socket.split();
    let principal = match auth_outcome {
        Ok(principal) => principal,
        Err(_) => {
            let _ = ws_tx
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_CODE_AUTH_FAILED,
                    reason: "invalid credential".into(),
                })))
                .await;
            return;
        }
    };
    run_session(ws_tx, ws_rx, state, principal).await;
}

async fn run_session(
    mut ws_tx: futures::stream::SplitSink<WebSocket, Message>,
    mut ws_rx: futures::stream::SplitStream<WebSocket>,
    state: HubState,
    principal: Principal,
) {
    let capabilities = principal.capabilities();
    let (conn, mut outbound_rx) = Connection::new(principal, state.bucket_capacity, state.bucket_refill_per_sec);
    state.registry.register(conn.clone());

    if send(&mut ws_tx, Envelope::data(
        "_system",
        "welcome",
        json!({ "connectionId": conn.id, "capabilities": capabilities }),
    ))
    .await
    .is_err()
    {
        state.registry.unregister(conn.id);
        return;
    }

    let mut shutdown_rx = state.shutdown.subscribe();
    let mut idle_ticker = tokio::time::interval(state.idle_timeout / 4);
    idle_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let close_reason = loop {
        tokio::select! {
            outgoing = outbound_rx.recv() => {
                match outgoing {
                    Some(envelope) => {
                        if send(&mut ws_tx, envelope).await.is_err() {
                            break None;
                        }
                    }
                    None => break None,
                }
            }
            incoming = ws_rx.next() => {
                match incoming {
                    Some(Ok(Message::Text(text))) => {
                        let raw = text.to_string();
                        if raw.len() > state.max_payload_bytes {
                            break Some((CLOSE_CODE_PAYLOAD_TOO_LARGE, "payload too large"));
                        }
                        conn.touch();
                        if !conn.bucket.try_acquire() {
                            conn.enqueue(Envelope::error("rate_limit", "connection rate limit exceeded"));
                            continue;
                        }
                        let ctx = build_context(&state, &conn, &mut shutdown_rx);
                        state.dispatcher.dispatch_raw(&conn, &raw, move |request_id| ctx.with_request_id(request_id)).await;
                    }
                    Some(Ok(Message::Binary(_))) => {
                        conn.enqueue(Envelope::error("protocol", "binary frames are not supported"));
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => {
                        conn.touch();
                    }
                    Some(Ok(Message::Close(_))) | None => break None,
                    Some(Err(_)) => break None,
                }
            }
            _ = idle_ticker.tick() => {
                if conn.take_slow_consumer_flag() {
                    break Some((CLOSE_CODE_SLOW_CONSUMER, "slow consumer"));
                }
                if conn.idle_for_ms() >= state.idle_timeout.as_millis() as u64 {
                    break Some((CLOSE_CODE_NORMAL, "idle timeout"));
                }
            }
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    let _ = send(&mut ws_tx, Envelope::data("_system", "server_shutdown", json!({}))).await;
                    tokio::time::sleep(state.shutdown_grace).await;
                    break Some((CLOSE_CODE_SERVER_SHUTDOWN, "server shutting down"));
                }
            }
        }
    };

    if let Some((code, reason)) = close_reason {
        let _ = ws_tx
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: reason.into(),
            })))
            .await;
    }

    let principal = conn.principal_snapshot();
    for contest_id in conn.rooms_snapshot() {
        state.rooms.leave(contest_id, conn.id, &principal);
    }
    state.registry.unregister(conn.id);
}

struct PartialContext {
    principal: Principal,
    connection_id: uuid::Uuid,
    rooms: Arc<crate::rooms::RoomEngine>,
    breaker: Arc<crate::breaker::CircuitBreaker>,
    supervisor: Arc<crate::supervisor::Supervisor>,
    cancel: crate::router::CancelToken,
}

impl PartialContext {
    fn with_request_id(self, request_id: String) -> HandlerContext {
        HandlerContext {
            principal: self.principal,
            connection_id: self.connection_id,
            request_id,
            rooms: self.rooms,
            breaker: self.breaker,
            supervisor: self.supervisor,
            cancel: self.cancel,
        }
    }
}

fn build_context(state: &HubState, conn: &Connection, shutdown_rx: &mut tokio::sync::watch::Receiver<bool>) -> PartialContext {
    PartialContext {
        principal: conn.principal_snapshot(),
        connection_id: conn.id,
        rooms: state.rooms.clone(),
        breaker: state.breaker.clone(),
        supervisor: state.supervisor.clone(),
        cancel: shutdown_rx.clone(),
    }
}

async fn send(
    ws_tx: &mut futures::stream::SplitSink<WebSocket, Message>,
    envelope: Envelope,
) -> Result<(), axum::Error> {
    let text = serde_json::to_string(&envelope).unwrap_or_else(|_| "{}".to_string());
    ws_tx.send(Message::Text(text.into())).await
}
