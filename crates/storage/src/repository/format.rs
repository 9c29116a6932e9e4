use sqlx::PgPool;

use crate::error::{Result, StorageError};
use crate::models::{Format, FormatId};

/// Repository for formats
pub struct FormatRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> FormatRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    pub async fn list(&self) -> Result<Vec<Format>> {
        let formats = sqlx::query_as::<_, Format>(
            "SELECT id, name, parent, hidden FROM formats ORDER BY id",
        )
        .fetch_all(self.pool)
        .await?;

        Ok(formats)
    }

    pub async fn find(&self, id: FormatId) -> Result<Format> {
        sqlx::query_as::<_, Format>("SELECT id, name, parent, hidden FROM formats WHERE id = $1")
            .bind(id)
            .fetch_optional(self.pool)
            .await?
            .ok_or(StorageError::NotFound)
    }

    /// The format itself and every format whose completions also count for
    /// it, following `parent` links downwards.
    pub async fn with_descendants(&self, id: FormatId) -> Result<Vec<FormatId>> {
        let formats = sqlx::query_scalar(
            r#"
            WITH RECURSIVE tree AS (
                SELECT id FROM formats WHERE id = $1
                UNION
                SELECT f.id FROM formats f INNER JOIN tree t ON f.parent = t.id
            )
            SELECT id FROM tree ORDER BY id
            "#,
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(formats)
    }
}
