//! Service Lifecycle & Supervisor (C8)
//!
//! Brings up registered services in dependency order, fans a periodic
//! metrics snapshot out over the Event Bus, and tears everything down in
//! reverse order with a bounded deadline per service.

mod graph;
mod service;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::sync::watch;
use tokio::task::JoinHandle;

pub use service::{Service, ServiceState};

use crate::bus::EventBus;
use crate::events::{MetricsSnapshot, ServiceLifecycleEvent};
use crate::utils::time::now_timestamp;

struct Registration {
    service: Arc<dyn Service>,
    dependencies: Vec<String>,
}

/// Orchestrates the registered services' init → start → (periodic metrics)
/// → stop lifecycle. Registration happens before `start_all`; the graph is
/// frozen once startup begins.
pub struct Supervisor {
    registrations: Vec<Registration>,
    states: RwLock<HashMap<String, ServiceState>>,
    bus: Arc<EventBus>,
    metrics_interval: Duration,
    metrics_task: RwLock<Option<JoinHandle<()>>>,
    metrics_stop: watch::Sender<bool>,
}

impl Supervisor {
    pub fn new(bus: Arc<EventBus>, metrics_interval: Duration) -> Self {
        let (metrics_stop, _) = watch::channel(false);
        Self {
            registrations: Vec::new(),
            states: RwLock::new(HashMap::new()),
            bus,
            metrics_interval,
            metrics_task: RwLock::new(None),
            metrics_stop,
        }
    }

    pub fn register(&mut self, service: Arc<dyn Service>) {
        let dependencies = service.dependencies().to_vec();
        let name = service.name().to_string();
        self.states.write().insert(name, ServiceState::Registered);
        self.registrations.push(Registration { service, dependencies });
    }

    pub fn state(&self, name: &str) -> Option<ServiceState> {
        self.states.read().get(name).copied()
    }

    fn names(&self) -> Vec<String> {
        self.registrations.iter().map(|r| r.service.name().to_string()).collect()
    }

    fn deps_map(&self) -> HashMap<String, Vec<String>> {
        self.registrations
            .iter()
            .map(|r| (r.service.name().to_string(), r.dependencies.clone()))
            .collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Service>> {
        self.registrations.iter().find(|r| r.service.name() == name).map(|r| &r.service)
    }

    fn set_state(&self, name: &str, state: ServiceState) {
        self.states.write().insert(name.to_string(), state);
        let _ = self.bus.publish(
            "service-lifecycle",
            ServiceLifecycleEvent {
                service: name.to_string(),
                state,
            },
        );
    }

    /// Resolve the dependency graph and run `init` then `start` for every
    /// registered service, parallelizing within each topological layer. A
    /// cycle or unresolved dependency is a fatal startup error.
    pub async fn start_all(&self) -> anyhow::Result<()> {
        let layers = graph::topological_layers(&self.names(), &self.deps_map())?;

        for layer in &layers {
            let mut inits = Vec::new();
            for name in layer {
                let svc = self.find(name).expect("registered service").clone();
                self.set_state(name, ServiceState::Initializing);
                let name = name.clone();
                inits.push(async move { (name, svc.init().await) });
            }
            let results = futures::future::join_all(inits).await;
            for (name, result) in results {
                if let Err(e) = result {
                    self.set_state(&name, ServiceState::Failed);
                    anyhow::bail!("service {name} failed to initialize: {e}");
                }
            }

            let mut starts = Vec::new();
            for name in layer {
                let svc = self.find(name).expect("registered service").clone();
                let name = name.clone();
                starts.push(async move { (name, svc.start().await) });
            }
            let results = futures::future::join_all(starts).await;
            for (name, result) in results {
                match result {
                    Ok(()) => self.set_state(&name, ServiceState::Started),
                    Err(e) => {
                        self.set_state(&name, ServiceState::Failed);
                        anyhow::bail!("service {name} failed to start: {e}");
                    }
                }
            }
        }

        Ok(())
    }

    /// Spawn the periodic "monitor" topic metrics broadcast.
    pub fn start_metrics_task(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut stop_rx = this.metrics_stop.subscribe();
        let interval = this.metrics_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        this.publish_metrics_snapshot().await;
                    }
                    _ = stop_rx.changed() => {
                        if *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }

    /// Current per-service `{state, metrics}` snapshot, used both for the
    /// periodic broadcast and for the `monitor` topic's on-demand request.
    pub async fn snapshot(&self) -> serde_json::Value {
        let mut services = serde_json::Map::new();
        for registration in &self.registrations {
            let name = registration.service.name().to_string();
            let metrics = registration.service.metrics().await;
            let state = self.state(&name);
            services.insert(
                name,
                serde_json::json!({
                    "state": state,
                    "metrics": metrics,
                }),
            );
        }
        serde_json::Value::Object(services)
    }

    async fn publish_metrics_snapshot(&self) {
        let _ = self.bus.publish(
            "monitor",
            MetricsSnapshot {
                services: self.snapshot().await,
                timestamp: now_timestamp(),
            },
        );
    }

    /// Stop every service in reverse topological order, giving each one
    /// `per_service_timeout` before moving on regardless.
    pub async fn stop_all(&self, per_service_timeout: Duration) {
        let _ = self.metrics_stop.send(true);

        let layers = match graph::topological_layers(&self.names(), &self.deps_map()) {
            Ok(layers) => layers,
            // Should be unreachable: the same graph was already validated in start_all.
            Err(_) => self.names().into_iter().map(|n| vec![n]).collect(),
        };

        for name in graph::reverse_order(&layers) {
            let Some(svc) = self.find(&name).cloned() else {
                continue;
            };
            self.set_state(&name, ServiceState::Stopping);
            match tokio::time::timeout(per_service_timeout, svc.stop()).await {
                Ok(Ok(())) => self.set_state(&name, ServiceState::Stopped),
                Ok(Err(e)) => {
                    tracing::warn!(service = %name, error = %e, "service stop returned an error");
                    self.set_state(&name, ServiceState::Stopped);
                }
                Err(_) => {
                    tracing::warn!(service = %name, "service stop timed out");
                    self.set_state(&name, ServiceState::Stopped);
                }
            }
        }
    }
}
