//! Event Bus (C1) → Broadcaster (C7) bridge
//!
//! The Service Supervisor and Circuit Breaker only know how to publish to
//! the Event Bus; they never touch a connection. This task is the other
//! half of the data flow: it subscribes to every topic those two
//! components publish on and re-broadcasts each event to the WS channel
//! admins are expected to be watching, so a periodic metrics snapshot or a
//! breaker trip actually reaches a subscribed connection instead of only
//! being retrievable on demand.

use std::sync::Arc;

use serde_json::json;
use tokio::task::JoinHandle;

use crate::broadcast::Broadcaster;
use crate::bus::{BusError, EventBus};
use crate::envelope::Envelope;
use crate::events::{BreakerEvent, MetricsSnapshot, ServiceLifecycleEvent, ServiceUnavailableEvent};

/// Subscribes to the bus before any publisher has run, which is what locks
/// each topic name to its event type; the `expect`s below hold as long as
/// nothing else claims these names for a different type first.
pub fn spawn(bus: Arc<EventBus>, broadcaster: Arc<Broadcaster>) -> JoinHandle<()> {
    let mut metrics = bus
        .subscribe::<MetricsSnapshot>("monitor")
        .expect("monitor topic is MetricsSnapshot-typed");
    let mut lifecycle = bus
        .subscribe::<ServiceLifecycleEvent>("service-lifecycle")
        .expect("service-lifecycle topic is ServiceLifecycleEvent-typed");
    let mut breaker = bus
        .subscribe::<BreakerEvent>("circuit-breaker")
        .expect("circuit-breaker topic is BreakerEvent-typed");
    let mut unavailable = bus
        .subscribe::<ServiceUnavailableEvent>("service-unavailable")
        .expect("service-unavailable topic is ServiceUnavailableEvent-typed");

    tokio::spawn(async move {
        loop {
            tokio::select! {
                msg = metrics.recv() => {
                    match msg {
                        Ok(snapshot) => {
                            broadcaster.broadcast(
                                "monitor",
                                Envelope::data("monitor", "METRICS_SNAPSHOT", serde_json::to_value(&snapshot).unwrap_or(json!({}))),
                            );
                        }
                        Err(BusError::Closed) => break,
                        Err(BusError::Lagged(n)) => tracing::warn!(n, topic = "monitor", "event bridge lagged"),
                        Err(BusError::TypeMismatch(_)) => unreachable!("subscribed once at a fixed type"),
                    }
                }
                msg = lifecycle.recv() => {
                    match msg {
                        Ok(event) => {
                            broadcaster.broadcast(
                                "monitor",
                                Envelope::data("monitor", "SERVICE_STATE", serde_json::to_value(&event).unwrap_or(json!({}))),
                            );
                        }
                        Err(BusError::Closed) => break,
                        Err(BusError::Lagged(n)) => tracing::warn!(n, topic = "service-lifecycle", "event bridge lagged"),
                        Err(BusError::TypeMismatch(_)) => unreachable!("subscribed once at a fixed type"),
                    }
                }
                msg = breaker.recv() => {
                    match msg {
                        Ok(event) => {
                            broadcaster.broadcast(
                                "circuit-breaker",
                                Envelope::data("circuit-breaker", "BREAKER_STATE", serde_json::to_value(&event).unwrap_or(json!({}))),
                            );
                        }
                        Err(BusError::Closed) => break,
                        Err(BusError::Lagged(n)) => tracing::warn!(n, topic = "circuit-breaker", "event bridge lagged"),
                        Err(BusError::TypeMismatch(_)) => unreachable!("subscribed once at a fixed type"),
                    }
                }
                msg = unavailable.recv() => {
                    match msg {
                        Ok(event) => {
                            broadcaster.broadcast(
                                "circuit-breaker",
                                Envelope::data("circuit-breaker", "SERVICE_UNAVAILABLE", serde_json::to_value(&event).unwrap_or(json!({}))),
                            );
                        }
                        Err(BusError::Closed) => break,
                        Err(BusError::Lagged(n)) => tracing::warn!(n, topic = "service-unavailable", "event bridge lagged"),
                        Err(BusError::TypeMismatch(_)) => unreachable!("subscribed once at a fixed type"),
                    }
                }
            }
        }
        tracing::debug!("event bridge shutting down");
    })
}
