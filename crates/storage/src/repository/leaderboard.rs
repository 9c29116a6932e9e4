use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::versioned;
use crate::error::Result;
use crate::models::{FormatId, MapMeta};
use crate::services::scoring::RunRecord;
use crate::versioning::Version;

/// Loads the inputs of a leaderboard as of a reference time
pub struct LeaderboardRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LeaderboardRepository<'a> {
    pub fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Every map version live at `at`
    pub async fn active_maps(&self, at: DateTime<Utc>) -> Result<Vec<MapMeta>> {
        let versions = versioned::all_as_of::<MapMeta>(self.pool, at).await?;
        Ok(versions
            .into_iter()
            .filter_map(Version::into_active)
            .collect())
    }

    /// The version of every completion in effect at `at` whose format is one
    /// of `formats`, with its players.
    pub async fn runs(&self, at: DateTime<Utc>, formats: &[FormatId]) -> Result<Vec<RunRecord>> {
        let runs = sqlx::query_as::<_, RunRecord>(
            r#"
            WITH current AS (
                SELECT DISTINCT ON (cm.completion) cm.*
                FROM completions_meta cm
                WHERE cm.created_at <= $1
                ORDER BY cm.completion, cm.created_at DESC, cm.id DESC
            )
            SELECT
                c.id AS completion,
                c.map,
                c.submitted_at,
                cur.format,
                cur.black_border,
                cur.no_geraldo,
                l.leftover AS lcc_leftover,
                cur.accepted_by IS NOT NULL AS accepted,
                COALESCE(cur.deleted_at <= $1, FALSE) AS deleted,
                COALESCE(
                    ARRAY_AGG(p.user_id ORDER BY p.user_id) FILTER (WHERE p.user_id IS NOT NULL),
                    '{}'
                ) AS players
            FROM current cur
            INNER JOIN completions c ON c.id = cur.completion
            LEFT JOIN least_cost_chimps l ON l.id = cur.lcc
            LEFT JOIN comp_players p ON p.run = cur.id
            WHERE cur.format = ANY($2)
            GROUP BY c.id, c.map, c.submitted_at, cur.format, cur.black_border,
                     cur.no_geraldo, l.leftover, cur.accepted_by, cur.deleted_at
            ORDER BY c.id
            "#,
        )
        .bind(at)
        .bind(formats)
        .fetch_all(self.pool)
        .await?;

        tracing::debug!(runs = runs.len(), "Loaded completions for leaderboard");
        Ok(runs)
    }
}
