//! SQLite-backed persistence for the Incident Log and Circuit Breaker Config
//!
//! This is the only persisted state the hub owns; everything else
//! resets on restart. Backed by `sqlite` rather than a server-backed store
//! since there is no multi-node deployment to justify one here.

use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool};
use sqlx::Row;

use super::error::BreakerError;
use super::incident::{Incident, IncidentFilter, IncidentType, Pagination, Severity};
use super::state::BreakerConfig;
use crate::utils::time::now_timestamp;

pub struct IncidentStore {
    pool: SqlitePool,
}

impl IncidentStore {
    pub async fn init(path: &Path) -> Result<Self, BreakerError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
            .map_err(BreakerError::Storage)?
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options).await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS incidents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                service TEXT NOT NULL,
                type TEXT NOT NULL,
                severity TEXT NOT NULL,
                status TEXT NOT NULL,
                started_at TEXT NOT NULL,
                ended_at TEXT,
                message TEXT NOT NULL,
                metrics TEXT NOT NULL
            )"#,
        )
        .execute(&pool)
        .await?;

        sqlx::query(
            r#"CREATE TABLE IF NOT EXISTS breaker_configs (
                service TEXT PRIMARY KEY,
                failure_threshold INTEGER NOT NULL,
                recovery_timeout_secs INTEGER NOT NULL,
                request_limit INTEGER NOT NULL,
                monitoring_window_secs INTEGER NOT NULL,
                minimum_requests INTEGER NOT NULL
            )"#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub async fn open_incident(
        &self,
        service: &str,
        kind: IncidentType,
        severity: Severity,
        message: &str,
        metrics: serde_json::Value,
    ) -> Result<i64, BreakerError> {
        let kind_str = serde_json::to_value(&kind).unwrap().as_str().unwrap().to_string();
        let severity_str = serde_json::to_value(severity).unwrap().as_str().unwrap().to_string();
        let row = sqlx::query(
            r#"INSERT INTO incidents (service, type, severity, status, started_at, message, metrics)
               VALUES (?1, ?2, ?3, 'active', ?4, ?5, ?6)
               RETURNING id"#,
        )
        .bind(service)
        .bind(kind_str)
        .bind(severity_str)
        .bind(now_timestamp())
        .bind(message)
        .bind(metrics.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get::<i64, _>("id"))
    }

    pub async fn resolve_incident(&self, id: i64) -> Result<(), BreakerError> {
        sqlx::query("UPDATE incidents SET status = 'resolved', ended_at = ?1 WHERE id = ?2")
            .bind(now_timestamp())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Most recent still-`active` incident for a service, if any — used to
    /// resolve the incident a Half-open → Closed transition closes out.
    #[allow(dead_code)]
    pub async fn active_incident_id(&self, service: &str) -> Result<Option<i64>, BreakerError> {
        let row = sqlx::query(
            "SELECT id FROM incidents WHERE service = ?1 AND status = 'active' ORDER BY id DESC LIMIT 1",
        )
        .bind(service)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<i64, _>("id")))
    }

    pub async fn query(
        &self,
        filter: &IncidentFilter,
        page: Pagination,
    ) -> Result<Vec<Incident>, BreakerError> {
        let mut sql = String::from(
            "SELECT id, service, type, severity, status, started_at, ended_at, message, metrics FROM incidents WHERE 1=1",
        );
        if filter.service.is_some() {
            sql.push_str(" AND service = ?");
        }
        if filter.severity.is_some() {
            sql.push_str(" AND severity = ?");
        }
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.since.is_some() {
            sql.push_str(" AND started_at >= ?");
        }
        if filter.until.is_some() {
            sql.push_str(" AND started_at <= ?");
        }
        sql.push_str(" ORDER BY id DESC LIMIT ? OFFSET ?");

        let mut query = sqlx::query(&sql);
        if let Some(service) = &filter.service {
            query = query.bind(service);
        }
        if let Some(severity) = filter.severity {
            query = query.bind(serde_json::to_value(severity).unwrap().as_str().unwrap().to_string());
        }
        if let Some(status) = filter.status {
            query = query.bind(serde_json::to_value(status).unwrap().as_str().unwrap().to_string());
        }
        if let Some(since) = &filter.since {
            query = query.bind(since);
        }
        if let Some(until) = &filter.until {
            query = query.bind(until);
        }
        query = query.bind(page.limit).bind(page.offset);

        let rows = query.fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|row| Incident {
                id: row.get("id"),
                service: row.get("service"),
                kind: serde_json::from_value(serde_json::Value::String(row.get("type"))).unwrap(),
                severity: serde_json::from_value(serde_json::Value::String(row.get("severity"))).unwrap(),
                status: serde_json::from_value(serde_json::Value::String(row.get("status"))).unwrap(),
                started_at: row.get("started_at"),
                ended_at: row.get("ended_at"),
                message: row.get("message"),
                metrics: serde_json::from_str(&row.get::<String, _>("metrics")).unwrap_or(serde_json::Value::Null),
            })
            .collect())
    }

    pub async fn save_config(&self, service: &str, config: &BreakerConfig) -> Result<(), BreakerError> {
        sqlx::query(
            r#"INSERT INTO breaker_configs
                 (service, failure_threshold, recovery_timeout_secs, request_limit, monitoring_window_secs, minimum_requests)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)
               ON CONFLICT(service) DO UPDATE SET
                 failure_threshold = excluded.failure_threshold,
                 recovery_timeout_secs = excluded.recovery_timeout_secs,
                 request_limit = excluded.request_limit,
                 monitoring_window_secs = excluded.monitoring_window_secs,
                 minimum_requests = excluded.minimum_requests"#,
        )
        .bind(service)
        .bind(config.failure_threshold)
        .bind(config.recovery_timeout_secs as i64)
        .bind(config.request_limit)
        .bind(config.monitoring_window_secs as i64)
        .bind(config.minimum_requests)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_config(&self, service: &str) -> Result<Option<BreakerConfig>, BreakerError> {
        let row = sqlx::query(
            "SELECT failure_threshold, recovery_timeout_secs, request_limit, monitoring_window_secs, minimum_requests
             FROM breaker_configs WHERE service = ?1",
        )
        .bind(service)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| BreakerConfig {
            failure_threshold: r.get::<i64, _>("failure_threshold") as u32,
            recovery_timeout_secs: r.get::<i64, _>("recovery_timeout_secs") as u64,
            request_limit: r.get::<i64, _>("request_limit") as u32,
            monitoring_window_secs: r.get::<i64, _>("monitoring_window_secs") as u64,
            minimum_requests: r.get::<i64, _>("minimum_requests") as u32,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> IncidentStore {
        let dir = tempfile::tempdir().unwrap();
        IncidentStore::init(&dir.path().join("incidents.sqlite")).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_and_resolve_incident() {
        let store = store().await;
        let id = store
            .open_incident("tokenSync", IncidentType::Tripped, Severity::Critical, "tripped", serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(store.active_incident_id("tokenSync").await.unwrap(), Some(id));
        store.resolve_incident(id).await.unwrap();
        assert_eq!(store.active_incident_id("tokenSync").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_query_filters_by_service() {
        let store = store().await;
        store
            .open_incident("a", IncidentType::Tripped, Severity::Critical, "x", serde_json::json!({}))
            .await
            .unwrap();
        store
            .open_incident("b", IncidentType::Tripped, Severity::Critical, "x", serde_json::json!({}))
            .await
            .unwrap();

        let filter = IncidentFilter {
            service: Some("a".to_string()),
            ..Default::default()
        };
        let results = store.query(&filter, Pagination::default()).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].service, "a");
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let store = store().await;
        let config = BreakerConfig {
            failure_threshold: 9,
            recovery_timeout_secs: 30,
            request_limit: 1,
            monitoring_window_secs: 60,
            minimum_requests: 5,
        };
        store.save_config("tokenSync", &config).await.unwrap();
        let loaded = store.load_config("tokenSync").await.unwrap().unwrap();
        assert_eq!(loaded.failure_threshold, 9);
    }
}
