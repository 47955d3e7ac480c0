//! Domain events carried on the Event Bus (C1) between services, the
//! Supervisor, the Circuit Breaker, and the Hub's own forwarding logic.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::breaker::CircuitState;
use crate::supervisor::ServiceState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLifecycleEvent {
    pub service: String,
    pub state: ServiceState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerEvent {
    pub service: String,
    pub state: CircuitState,
    pub incident_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceUnavailableEvent {
    pub service: String,
    pub retry_after_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub services: Value,
    pub timestamp: String,
}
