//! Circuit Breaker (C9)
//!
//! Per-service failure accounting and state machine, backed by the
//! persisted Incident Log. Transitions are serialized per
//! service via a sharded map of mutexes, mirroring the Connection Registry's
//! concurrency model.

pub mod error;
pub mod incident;
pub mod state;
mod store;

use std::path::Path;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

pub use error::BreakerError;
pub use incident::{Incident, IncidentFilter, IncidentStatus, IncidentType, Pagination, Severity};
pub use state::{BreakerConfig, CircuitState, Transition};
pub use store::IncidentStore;

use crate::bus::EventBus;
use crate::events::{BreakerEvent, ServiceUnavailableEvent};

struct Entry {
    record: Mutex<state::BreakerRecord>,
    incident_id: Mutex<Option<i64>>,
}

pub struct CircuitBreaker {
    services: DashMap<String, Entry>,
    store: Arc<IncidentStore>,
    bus: Arc<EventBus>,
}

impl CircuitBreaker {
    pub async fn init(data_dir: &Path, bus: Arc<EventBus>) -> Result<Self, BreakerError> {
        let store = Arc::new(IncidentStore::init(&data_dir.join("incidents.sqlite")).await?);
        Ok(Self {
            services: DashMap::new(),
            store,
            bus,
        })
    }

    #[cfg(test)]
    pub fn with_store(store: Arc<IncidentStore>, bus: Arc<EventBus>) -> Self {
        Self {
            services: DashMap::new(),
            store,
            bus,
        }
    }

    pub async fn register(&self, service: &str, config: BreakerConfig) {
        let config = self
            .store
            .load_config(service)
            .await
            .ok()
            .flatten()
            .unwrap_or(config);
        self.store.save_config(service, &config).await.ok();
        self.services.insert(
            service.to_string(),
            Entry {
                record: Mutex::new(state::BreakerRecord::new(config)),
                incident_id: Mutex::new(None),
            },
        );
    }

    /// Denying a request also announces `ServiceUnavailableEvent` on the bus
    /// so connections watching this service's breaker are told why, with the
    /// configured recovery timeout as the retry hint.
    pub fn allow_request(&self, service: &str) -> bool {
        let Some(entry) = self.services.get(service) else {
            return true;
        };
        let (allowed, retry_after_secs) = {
            let mut record = entry.record.lock();
            (record.allow_request(), record.config.recovery_timeout_secs)
        };
        drop(entry);

        if !allowed {
            let _ = self.bus.publish(
                "service-unavailable",
                ServiceUnavailableEvent {
                    service: service.to_string(),
                    retry_after_secs,
                },
            );
        }
        allowed
    }

    pub fn state(&self, service: &str) -> Option<CircuitState> {
        self.services.get(service).map(|e| e.record.lock().state)
    }

    #[allow(dead_code)]
    pub async fn record_success(&self, service: &str) {
        let Some(entry) = self.services.get(service) else {
            return;
        };
        let transition = entry.record.lock().record_success();
        if transition == Transition::Recovered {
            let incident_id = entry.incident_id.lock().take();
            drop(entry);
            if let Some(id) = incident_id {
                let _ = self.store.resolve_incident(id).await;
            }
            self.publish(service, CircuitState::Closed, None);
        }
    }

    #[allow(dead_code)]
    pub async fn record_failure(&self, service: &str, message: &str) {
        let Some(entry) = self.services.get(service) else {
            return;
        };
        let transition = entry.record.lock().record_failure();
        match transition {
            Transition::Tripped => {
                drop(entry);
                let incident_id = self
                    .store
                    .open_incident(service, IncidentType::Tripped, Severity::Critical, message, serde_json::json!({}))
                    .await
                    .ok();
                if let Some(entry) = self.services.get(service) {
                    *entry.incident_id.lock() = incident_id;
                }
                self.publish(service, CircuitState::Open, incident_id);
            }
            Transition::Reopened => {
                drop(entry);
                let incident_id = self
                    .store
                    .open_incident(
                        service,
                        IncidentType::Tripped,
                        Severity::Critical,
                        &format!("probe failed during recovery: {message}"),
                        serde_json::json!({}),
                    )
                    .await
                    .ok();
                if let Some(entry) = self.services.get(service) {
                    *entry.incident_id.lock() = incident_id;
                }
                self.publish(service, CircuitState::Open, incident_id);
            }
            Transition::None | Transition::Recovered => {}
        }
    }

    /// `manualReset(service, {reason, force})`. `force` is accepted for API
    /// symmetry but has no additional effect here: resetting an
    /// already-closed breaker is already a no-op.
    pub async fn manual_reset(&self, service: &str, reason: &str, _force: bool) -> Result<(), BreakerError> {
        let Some(entry) = self.services.get(service) else {
            return Err(BreakerError::UnknownService(service.to_string()));
        };
        entry.record.lock().manual_reset();
        let incident_id = entry.incident_id.lock().take();
        drop(entry);

        if let Some(id) = incident_id {
            let _ = self.store.resolve_incident(id).await;
        }
        self.store
            .open_incident(service, IncidentType::ManualReset, Severity::Info, reason, serde_json::json!({}))
            .await
            .ok();
        self.publish(service, CircuitState::Closed, None);
        Ok(())
    }

    pub async fn query_incidents(
        &self,
        filter: &IncidentFilter,
        page: Pagination,
    ) -> Result<Vec<Incident>, BreakerError> {
        self.store.query(filter, page).await
    }

    fn publish(&self, service: &str, state: CircuitState, incident_id: Option<i64>) {
        let _ = self.bus.publish(
            "circuit-breaker",
            BreakerEvent {
                service: service.to_string(),
                state,
                incident_id,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn breaker() -> CircuitBreaker {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(IncidentStore::init(&dir.path().join("i.sqlite")).await.unwrap());
        let bus = Arc::new(EventBus::new());
        CircuitBreaker::with_store(store, bus)
    }

    fn fast_config() -> BreakerConfig {
        BreakerConfig {
            failure_threshold: 2,
            recovery_timeout_secs: 0,
            request_limit: 1,
            monitoring_window_secs: 60,
            minimum_requests: 2,
        }
    }

    #[tokio::test]
    async fn test_trip_opens_incident() {
        let breaker = breaker().await;
        breaker.register("tokenSync", fast_config()).await;
        breaker.record_failure("tokenSync", "boom").await;
        breaker.record_failure("tokenSync", "boom").await;
        assert_eq!(breaker.state("tokenSync"), Some(CircuitState::Open));

        let incidents = breaker
            .query_incidents(&IncidentFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0].status, IncidentStatus::Active);
        assert_eq!(incidents[0].severity, Severity::Critical);
    }

    #[tokio::test]
    async fn test_recovery_resolves_incident() {
        let breaker = breaker().await;
        breaker.register("tokenSync", fast_config()).await;
        breaker.record_failure("tokenSync", "boom").await;
        breaker.record_failure("tokenSync", "boom").await;
        assert!(breaker.allow_request("tokenSync")); // drives Open -> HalfOpen
        breaker.record_success("tokenSync").await;
        assert_eq!(breaker.state("tokenSync"), Some(CircuitState::Closed));

        let incidents = breaker
            .query_incidents(&IncidentFilter::default(), Pagination::default())
            .await
            .unwrap();
        assert_eq!(incidents[0].status, IncidentStatus::Resolved);
    }

    #[tokio::test]
    async fn test_denied_request_publishes_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(IncidentStore::init(&dir.path().join("i.sqlite")).await.unwrap());
        let bus = Arc::new(EventBus::new());
        let breaker = CircuitBreaker::with_store(store, bus.clone());
        let mut sub = bus.subscribe::<ServiceUnavailableEvent>("service-unavailable").unwrap();

        let config = BreakerConfig {
            failure_threshold: 2,
            recovery_timeout_secs: 3600,
            request_limit: 1,
            monitoring_window_secs: 60,
            minimum_requests: 2,
        };
        breaker.register("tokenSync", config).await;
        breaker.record_failure("tokenSync", "boom").await;
        breaker.record_failure("tokenSync", "boom").await;
        assert!(!breaker.allow_request("tokenSync"));

        let event = sub.recv().await.unwrap();
        assert_eq!(event.service, "tokenSync");
        assert_eq!(event.retry_after_secs, 3600);
    }

    #[tokio::test]
    async fn test_unregistered_service_allows_requests() {
        let breaker = breaker().await;
        assert!(breaker.allow_request("unknown"));
    }

    #[tokio::test]
    async fn test_manual_reset_twice_is_idempotent() {
        let breaker = breaker().await;
        breaker.register("tokenSync", fast_config()).await;
        breaker.record_failure("tokenSync", "boom").await;
        breaker.record_failure("tokenSync", "boom").await;

        breaker.manual_reset("tokenSync", "operator override", false).await.unwrap();
        let state_after_first = breaker.state("tokenSync");
        breaker.manual_reset("tokenSync", "operator override", false).await.unwrap();
        assert_eq!(breaker.state("tokenSync"), state_after_first);
        assert_eq!(breaker.state("tokenSync"), Some(CircuitState::Closed));
    }
}
