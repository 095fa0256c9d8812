//! Persistence for the source registry.
//!
//! The registry holds every named source plus an optional legacy
//! single-source entry kept for older installs.

use crate::config::{DatabaseConfig, SourceConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceRegistry {
    #[serde(default)]
    pub databases: Vec<DatabaseConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub legacy: Option<SourceConfig>,
}

impl SourceRegistry {
    /// The source for `db_id`, falling back to the legacy entry.
    pub fn select(&self, db_id: Option<&str>) -> Option<&SourceConfig> {
        db_id
            .and_then(|id| self.database(id))
            .map(|db| &db.source)
            .or(self.legacy.as_ref())
    }

    pub fn database(&self, db_id: &str) -> Option<&DatabaseConfig> {
        self.databases.iter().find(|db| db.id == db_id)
    }

    /// Replace the database with the same id, or append it.
    pub fn upsert(&mut self, database: DatabaseConfig) {
        match self.databases.iter_mut().find(|db| db.id == database.id) {
            Some(existing) => *existing = database,
            None => self.databases.push(database),
        }
    }

    pub fn remove(&mut self, db_id: &str) -> Option<DatabaseConfig> {
        let index = self.databases.iter().position(|db| db.id == db_id)?;
        Some(self.databases.remove(index))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub fn load(path: &Path) -> Result<Option<SourceRegistry>, PersistenceError> {
    if !path.exists() {
        return Ok(None);
    }
    let contents = std::fs::read_to_string(path)?;
    let registry = serde_json::from_str::<SourceRegistry>(&contents)?;
    Ok(Some(registry))
}

pub fn save(path: &Path, registry: &SourceRegistry) -> Result<(), PersistenceError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = serde_json::to_string_pretty(registry)?;
    std::fs::write(path, contents)?;
    Ok(())
}
