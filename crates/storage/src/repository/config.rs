use async_trait::async_trait;
use sqlx::PgPool;

use crate::error::{Result, StorageError};
use crate::models::{ConfigEntry, ConfigValue};
use crate::services::config_store::ConfigStore;

/// Reads the `config` table
pub struct ConfigRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ConfigRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<ConfigEntry>> {
        let entries = sqlx::query_as::<_, ConfigEntry>(
            "SELECT name, value, type, description FROM config ORDER BY name",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(entries)
    }

    pub async fn find(&self, name: &str) -> Result<ConfigEntry> {
        sqlx::query_as::<_, ConfigEntry>(
            "SELECT name, value, type, description FROM config WHERE name = $1",
        )
        .bind(name)
        .fetch_optional(self.pool)
        .await?
        .ok_or(StorageError::NotFound)
    }
}

#[async_trait]
impl ConfigStore for ConfigRepository<'_> {
    async fn get(&self, name: &str) -> Result<ConfigValue> {
        match self.find(name).await {
            Ok(entry) => entry.typed(),
            Err(StorageError::NotFound) => Err(StorageError::InvalidConfig(format!(
                "missing config value {name}"
            ))),
            Err(e) => Err(e),
        }
    }
}
