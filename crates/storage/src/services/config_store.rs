use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{Result, StorageError};
use crate::models::ConfigValue;

/// Query contract of the configuration store: named, typed scalars.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    async fn get(&self, name: &str) -> Result<ConfigValue>;
}

/// In-memory configuration, for tests and one-off overrides.
#[derive(Debug, Clone, Default)]
pub struct StaticConfig {
    values: HashMap<String, ConfigValue>,
}

impl StaticConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: ConfigValue) -> Self {
        self.values.insert(name.to_string(), value);
        self
    }
}

#[async_trait]
impl ConfigStore for StaticConfig {
    async fn get(&self, name: &str) -> Result<ConfigValue> {
        self.values
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::InvalidConfig(format!("missing config value {name}")))
    }
}
