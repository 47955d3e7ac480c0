//! `contest` topic handlers — room presence and chat actions

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::rooms::room::Visibility;

use super::{Handler, HandlerContext, HandlerError, HandlerOutcome};

fn contest_id(data: &Option<Value>) -> Result<u64, HandlerError> {
    data.as_ref()
        .and_then(|d| d.get("contestId"))
        .and_then(Value::as_u64)
        .ok_or_else(|| HandlerError::bad_request("contestId is required"))
}

/// `SET_ADMIN_PRESENCE`: flips the caller's visibility in a room they admin.
pub struct SetAdminPresence;

#[async_trait]
impl Handler for SetAdminPresence {
    async fn handle(&self, ctx: &HandlerContext, data: Option<Value>) -> Result<HandlerOutcome, HandlerError> {
        let contest_id = contest_id(&data)?;
        let visibility = match data.as_ref().and_then(|d| d.get("visibility")).and_then(Value::as_str) {
            Some("visible") => Visibility::Visible,
            Some("hidden") => Visibility::Hidden,
            _ => return Err(HandlerError::bad_request("visibility must be \"visible\" or \"hidden\"")),
        };

        let changed = ctx.rooms.set_admin_presence(contest_id, &ctx.principal.id, visibility);
        Ok(HandlerOutcome::Response(json!({ "contestId": contest_id, "changed": changed })))
    }
}

/// `sendChatMessage`: runs the chat acceptance pipeline for the caller's
/// connection.
pub struct SendChatMessage;

#[async_trait]
impl Handler for SendChatMessage {
    async fn handle(&self, ctx: &HandlerContext, data: Option<Value>) -> Result<HandlerOutcome, HandlerError> {
        let contest_id = contest_id(&data)?;
        let text = data
            .as_ref()
            .and_then(|d| d.get("text"))
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::bad_request("text is required"))?
            .to_string();

        let message = ctx
            .rooms
            .accept_chat(contest_id, ctx.connection_id, &ctx.principal, text)
            .map_err(|e| match e {
                crate::rooms::ChatError::NotAMember => HandlerError::bad_request("not a member of this room"),
                crate::rooms::ChatError::TooLong => HandlerError::bad_request("message exceeds the length limit"),
                crate::rooms::ChatError::RateLimited => HandlerError::rate_limited("chat rate limit exceeded"),
            })?;

        Ok(HandlerOutcome::Response(serde_json::to_value(&message).unwrap()))
    }
}
