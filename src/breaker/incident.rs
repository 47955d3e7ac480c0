//! Append-only incident log records

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncidentStatus {
    Active,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncidentType {
    Tripped,
    ManualReset,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: i64,
    pub service: String,
    #[serde(rename = "type")]
    pub kind: IncidentType,
    pub severity: Severity,
    pub status: IncidentStatus,
    pub started_at: String,
    pub ended_at: Option<String>,
    pub message: String,
    pub metrics: serde_json::Value,
}

#[derive(Debug, Clone, Default)]
pub struct IncidentFilter {
    pub service: Option<String>,
    pub severity: Option<Severity>,
    pub status: Option<IncidentStatus>,
    pub since: Option<String>,
    pub until: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Pagination {
    pub limit: i64,
    pub offset: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { limit: 50, offset: 0 }
    }
}
