//! `admin` topic handlers — admin-only breaker control and incident queries

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::breaker::{IncidentFilter, IncidentStatus, Pagination, Severity};

use super::{Handler, HandlerContext, HandlerError, HandlerOutcome};

/// `manualReset`: forces a named service's breaker closed.
pub struct ManualReset;

#[async_trait]
impl Handler for ManualReset {
    async fn handle(&self, ctx: &HandlerContext, data: Option<Value>) -> Result<HandlerOutcome, HandlerError> {
        let service = data
            .as_ref()
            .and_then(|d| d.get("service"))
            .and_then(Value::as_str)
            .ok_or_else(|| HandlerError::bad_request("service is required"))?;
        let reason = data
            .as_ref()
            .and_then(|d| d.get("reason"))
            .and_then(Value::as_str)
            .unwrap_or("manual reset requested");
        let force = data.as_ref().and_then(|d| d.get("force")).and_then(Value::as_bool).unwrap_or(false);

        ctx.breaker
            .manual_reset(service, reason, force)
            .await
            .map_err(|e| HandlerError::not_found(e.to_string()))?;

        Ok(HandlerOutcome::Response(json!({ "service": service, "state": "closed" })))
    }
}

/// `queryIncidents`: filtered, paginated reads over the incident log.
pub struct QueryIncidents;

#[async_trait]
impl Handler for QueryIncidents {
    async fn handle(&self, ctx: &HandlerContext, data: Option<Value>) -> Result<HandlerOutcome, HandlerError> {
        let obj = data.unwrap_or(Value::Null);
        let filter = IncidentFilter {
            service: obj.get("service").and_then(Value::as_str).map(str::to_string),
            severity: obj.get("severity").and_then(Value::as_str).and_then(parse_severity),
            status: obj.get("status").and_then(Value::as_str).and_then(parse_status),
            since: obj.get("since").and_then(Value::as_str).map(str::to_string),
            until: obj.get("until").and_then(Value::as_str).map(str::to_string),
        };
        let page = Pagination {
            limit: obj.get("limit").and_then(Value::as_i64).unwrap_or(50),
            offset: obj.get("offset").and_then(Value::as_i64).unwrap_or(0),
        };

        let incidents = ctx
            .breaker
            .query_incidents(&filter, page)
            .await
            .map_err(|e| HandlerError::internal(e.to_string()))?;

        Ok(HandlerOutcome::Response(serde_json::to_value(incidents).unwrap()))
    }
}

fn parse_severity(s: &str) -> Option<Severity> {
    match s {
        "info" => Some(Severity::Info),
        "warning" => Some(Severity::Warning),
        "critical" => Some(Severity::Critical),
        _ => None,
    }
}

fn parse_status(s: &str) -> Option<IncidentStatus> {
    match s {
        "active" => Some(IncidentStatus::Active),
        "resolved" => Some(IncidentStatus::Resolved),
        _ => None,
    }
}
