//! Outbound Envelope — the canonical JSON shape crossing the wire

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::utils::time::now_timestamp;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvelopeType {
    Data,
    Error,
    Ack,
    Request,
    Response,
    Subscribe,
    Unsubscribe,
    Ping,
    Pong,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EnvelopeType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
    pub timestamp: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(rename = "requestId", skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(rename = "retryAfter", skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl Envelope {
    fn base(kind: EnvelopeType) -> Self {
        Self {
            kind,
            topic: None,
            subtype: None,
            action: None,
            request_id: None,
            data: None,
            error: None,
            timestamp: now_timestamp(),
        }
    }

    pub fn ack(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Self::base(EnvelopeType::Ack)
        }
    }

    pub fn response(topic: impl Into<String>, request_id: impl Into<String>, data: Value) -> Self {
        Self {
            topic: Some(topic.into()),
            request_id: Some(request_id.into()),
            data: Some(data),
            ..Self::base(EnvelopeType::Response)
        }
    }

    pub fn data(topic: impl Into<String>, action: impl Into<String>, data: Value) -> Self {
        Self {
            topic: Some(topic.into()),
            action: Some(action.into()),
            data: Some(data),
            ..Self::base(EnvelopeType::Data)
        }
    }

    pub fn stream_chunk(topic: impl Into<String>, request_id: impl Into<String>, data: Value) -> Self {
        Self {
            topic: Some(topic.into()),
            action: Some("stream-chunk".to_string()),
            request_id: Some(request_id.into()),
            data: Some(data),
            ..Self::base(EnvelopeType::Data)
        }
    }

    pub fn stream_complete(topic: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            action: Some("stream-complete".to_string()),
            request_id: Some(request_id.into()),
            ..Self::base(EnvelopeType::Data)
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
                request_id: None,
                retry_after: None,
            }),
            ..Self::base(EnvelopeType::Error)
        }
    }

    pub fn error_with_request(
        code: impl Into<String>,
        message: impl Into<String>,
        request_id: impl Into<String>,
    ) -> Self {
        let request_id = request_id.into();
        Self {
            error: Some(ErrorBody {
                code: code.into(),
                message: message.into(),
                request_id: Some(request_id.clone()),
                retry_after: None,
            }),
            request_id: Some(request_id),
            ..Self::base(EnvelopeType::Error)
        }
    }

    pub fn pong() -> Self {
        Self::base(EnvelopeType::Pong)
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        if let Some(err) = self.error.as_mut() {
            err.retry_after = Some(secs);
        }
        self
    }
}

/// Inbound message shapes the router must handle.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "UPPERCASE", tag = "type")]
pub enum InboundMessage {
    Subscribe {
        topic: String,
    },
    Unsubscribe {
        topic: String,
    },
    Request {
        topic: String,
        action: String,
        #[serde(rename = "requestId")]
        request_id: String,
        #[serde(default)]
        data: Option<Value>,
    },
    Ping,
}
