//! `monitor` topic handlers — admin-only supervisor/service state reads

use async_trait::async_trait;
use serde_json::Value;

use super::{Handler, HandlerContext, HandlerError, HandlerOutcome};

pub struct GetSnapshot;

#[async_trait]
impl Handler for GetSnapshot {
    async fn handle(&self, ctx: &HandlerContext, _data: Option<Value>) -> Result<HandlerOutcome, HandlerError> {
        Ok(HandlerOutcome::Response(ctx.supervisor.snapshot().await))
    }
}
