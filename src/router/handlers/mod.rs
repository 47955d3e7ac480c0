//! Request handlers and the typed table that replaces "dynamic
//! handler registration via loose objects".

pub mod admin;
pub mod ai;
pub mod contest;
pub mod market_data;
pub mod monitor;
pub mod terminal;
pub mod wallet;

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::Stream;
use serde_json::Value;
use tokio::sync::watch;

use crate::auth::Principal;
use crate::breaker::CircuitBreaker;
use crate::registry::ConnectionId;
use crate::rooms::RoomEngine;
use crate::supervisor::Supervisor;

/// Signalled when the owning connection closes; handlers must stop any
/// in-flight work promptly once this flips.
pub type CancelToken = watch::Receiver<bool>;

pub fn is_cancelled(token: &CancelToken) -> bool {
    *token.borrow()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerErrorKind {
    NotFound,
    BadRequest,
    RateLimited,
    ServiceUnavailable,
    Internal,
}

#[derive(Debug, Clone)]
pub struct HandlerError {
    pub kind: HandlerErrorKind,
    pub message: String,
    pub retry_after_secs: Option<u64>,
}

impl HandlerError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::BadRequest,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::NotFound,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn service_unavailable(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self {
            kind: HandlerErrorKind::ServiceUnavailable,
            message: message.into(),
            retry_after_secs: Some(retry_after_secs),
        }
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::RateLimited,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::Internal,
            message: message.into(),
            retry_after_secs: None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.kind {
            HandlerErrorKind::NotFound => "unknown_action",
            HandlerErrorKind::BadRequest => "protocol",
            HandlerErrorKind::RateLimited => "rate_limit",
            HandlerErrorKind::ServiceUnavailable => "service_unavailable",
            HandlerErrorKind::Internal => "internal",
        }
    }
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Value> + Send>>;

/// Either a single reply or a finite lazy sequence of chunks followed by a
/// terminal marker the dispatcher supplies itself.
pub enum HandlerOutcome {
    Response(Value),
    Stream(ChunkStream),
}

/// Everything a handler needs besides its own request payload. Shared
/// components are injected here rather than reached for through module-level
/// statics.
#[derive(Clone)]
pub struct HandlerContext {
    pub principal: Principal,
    pub connection_id: ConnectionId,
    pub request_id: String,
    pub rooms: Arc<RoomEngine>,
    pub breaker: Arc<CircuitBreaker>,
    pub supervisor: Arc<Supervisor>,
    pub cancel: CancelToken,
}

#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, ctx: &HandlerContext, data: Option<Value>) -> Result<HandlerOutcome, HandlerError>;
}

/// Handler table keyed by `(topic, action)`. Built once at
/// startup by the wiring module; the router only ever reads it.
pub struct HandlerTable {
    handlers: std::collections::HashMap<(String, String), Arc<dyn Handler>>,
}

impl HandlerTable {
    pub fn builder() -> HandlerTableBuilder {
        HandlerTableBuilder::default()
    }

    pub fn lookup(&self, topic: &str, action: &str) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&(topic.to_string(), action.to_string())).cloned()
    }
}

#[derive(Default)]
pub struct HandlerTableBuilder {
    handlers: std::collections::HashMap<(String, String), Arc<dyn Handler>>,
}

impl HandlerTableBuilder {
    pub fn register(mut self, topic: &str, action: &str, handler: Arc<dyn Handler>) -> Self {
        self.handlers.insert((topic.to_string(), action.to_string()), handler);
        self
    }

    pub fn build(self) -> HandlerTable {
        HandlerTable { handlers: self.handlers }
    }
}
