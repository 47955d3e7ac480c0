//! `ai` topic handlers — authenticated; streamed assistant replies

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Handler, HandlerContext, HandlerError, HandlerOutcome};

/// Stub collaborator standing in for the external model-serving backend
///. Splits a canned reply into chunks to exercise the streaming
/// contract end to end.
pub struct StreamChat;

#[async_trait]
impl Handler for StreamChat {
    async fn handle(&self, _ctx: &HandlerContext, data: Option<Value>) -> Result<HandlerOutcome, HandlerError> {
        let messages = data
            .as_ref()
            .and_then(|d| d.get("messages"))
            .and_then(|m| m.as_array())
            .cloned()
            .unwrap_or_default();

        if messages.is_empty() {
            return Err(HandlerError::bad_request("messages must be a non-empty array"));
        }

        let reply = "Here is a streamed reply.".to_string();
        let words: Vec<String> = reply.split_whitespace().map(str::to_string).collect();

        let stream = async_stream::stream! {
            for word in words {
                yield json!({ "text": word });
            }
        };

        Ok(HandlerOutcome::Stream(Box::pin(stream)))
    }
}
