//! The `Service` trait and its lifecycle states

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Registered,
    Initializing,
    Started,
    Stopping,
    Stopped,
    Failed,
}

/// A managed, dependency-ordered unit of background work.
///
/// Implementors are the "services" the Supervisor brings up in dependency
/// order and tears down in reverse. All hooks besides `name`/`dependencies`
/// have default no-op bodies so a leaf service only needs to implement the
/// ones it cares about.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &str;

    /// Names of services that must reach `Started` before this one inits.
    fn dependencies(&self) -> &[String] {
        &[]
    }

    async fn init(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn health_check(&self) -> bool {
        true
    }

    /// Arbitrary JSON blob merged into the periodic metrics snapshot under
    /// this service's name.
    async fn metrics(&self) -> Value {
        Value::Null
    }
}
