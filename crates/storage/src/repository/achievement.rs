use sqlx::PgPool;

use crate::dto::leaderboard::LeaderboardMetric;
use crate::error::Result;
use crate::models::{AchievementRole, FormatId};

/// Repository for achievement roles
pub struct AchievementRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AchievementRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Roles awarded on the `(format, metric)` leaderboard
    pub async fn list_for(
        &self,
        format: FormatId,
        metric: LeaderboardMetric,
    ) -> Result<Vec<AchievementRole>> {
        let roles = sqlx::query_as::<_, AchievementRole>(
            r#"
            SELECT id, lb_format, lb_type, threshold, for_first, name, tooltip,
                   clr_border, clr_inner, discord_role
            FROM achievement_roles
            WHERE lb_format = $1 AND lb_type = $2
            ORDER BY for_first DESC, threshold DESC
            "#,
        )
        .bind(format)
        .bind(metric.as_str())
        .fetch_all(self.pool)
        .await?;

        Ok(roles)
    }
}
