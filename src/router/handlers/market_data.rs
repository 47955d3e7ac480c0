//! `market-data` topic handlers
//!
//! The market-data feed itself is an external collaborator; the
//! hub only exposes a snapshot read, with live updates delivered over the
//! `market-data.<symbol>` broadcast channel rather than through requests.

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{Handler, HandlerContext, HandlerError, HandlerOutcome};

pub struct GetSnapshot;

#[async_trait]
impl Handler for GetSnapshot {
    async fn handle(&self, _ctx: &HandlerContext, data: Option<Value>) -> Result<HandlerOutcome, HandlerError> {
        let symbol = data
            .as_ref()
            .and_then(|d| d.get("symbol"))
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::bad_request("symbol is required"))?;

        Ok(HandlerOutcome::Response(json!({ "symbol": symbol, "price": null })))
    }
}
