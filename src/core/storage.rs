//! Local data directory resolution
//!
//! The hub persists only the incident log and breaker config.
//! Both live in a single SQLite file under this resolved directory.

use std::path::PathBuf;

use anyhow::Result;
use directories::ProjectDirs;

use super::config::AppConfig;
use super::constants::{APP_DOT_FOLDER, APP_NAME_LOWER, ENV_DATA_DIR};

#[derive(Debug, Clone)]
pub struct AppStorage {
    data_dir: PathBuf,
}

impl AppStorage {
    pub async fn init(config: &AppConfig) -> Result<Self> {
        let data_dir = config
            .data_dir
            .clone()
            .unwrap_or_else(Self::resolve_data_dir);
        tokio::fs::create_dir_all(&data_dir).await?;
        Ok(Self { data_dir })
    }

    pub fn init_for_test(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn resolve_data_dir() -> PathBuf {
        if let Ok(dir) = std::env::var(ENV_DATA_DIR) {
            return PathBuf::from(dir);
        }
        ProjectDirs::from("dev", APP_NAME_LOWER, APP_NAME_LOWER)
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(APP_DOT_FOLDER))
    }

    pub fn data_dir(&self) -> &PathBuf {
        &self.data_dir
    }

    pub fn incident_db_path(&self) -> PathBuf {
        self.data_dir.join("incidents.sqlite")
    }
}
