//! `terminal` topic handlers — public, read-only terminal data

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Handler, HandlerContext, HandlerError, HandlerOutcome};

pub struct GetTerminalData;

#[async_trait]
impl Handler for GetTerminalData {
    async fn handle(&self, _ctx: &HandlerContext, _data: Option<Value>) -> Result<HandlerOutcome, HandlerError> {
        Ok(HandlerOutcome::Response(json!({
            "lines": [],
            "cursor": 0,
        })))
    }
}
