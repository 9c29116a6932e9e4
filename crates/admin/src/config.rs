use anyhow::{Context, Result};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub max_connections: u32,
    pub lock_timeout_ms: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .context("Cannot load DATABASE_URL env variable")?,
            max_connections: match std::env::var("DB_MAX_CONNECTIONS") {
                Ok(value) => value
                    .parse()
                    .context("DB_MAX_CONNECTIONS must be a number")?,
                Err(_) => 5,
            },
            lock_timeout_ms: match std::env::var("DB_LOCK_TIMEOUT_MS") {
                Ok(value) => value
                    .parse()
                    .context("DB_LOCK_TIMEOUT_MS must be a number")?,
                Err(_) => 5000,
            },
        })
    }
}
