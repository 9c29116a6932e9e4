pub mod dto;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod versioning;

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Executor;

use crate::error::Result;

pub struct Database {
    pool: PgPool,
}

impl Database {
    /// Connect with default pool settings
    pub async fn new(database_url: &str) -> Result<Self> {
        Self::connect(database_url, 5, 5000).await
    }

    /// Connect with an explicit pool size and a `lock_timeout` applied to
    /// every connection, so lock waits surface as retryable conflicts.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        lock_timeout_ms: u64,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .after_connect(move |conn, _meta| {
                Box::pin(async move {
                    conn.execute(format!("SET lock_timeout = {lock_timeout_ms}").as_str())
                        .await?;
                    Ok(())
                })
            })
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
