use std::collections::HashSet;

use chrono::Utc;
use sqlx::PgPool;

use super::achievements::{assign_all, best_role};
use super::config_store::ConfigStore;
use super::scoring::{ScoringConfig, compute_leaderboard};
use crate::dto::leaderboard::{LeaderboardEntry, LeaderboardQuery, RoleAssignment};
use crate::error::{Result, StorageError};
use crate::models::{AchievementRole, ListField, UserId};
use crate::repository::achievement::AchievementRepository;
use crate::repository::format::FormatRepository;
use crate::repository::leaderboard::LeaderboardRepository;

/// Standings of a format for one metric, as of the query's reference time
pub async fn get_leaderboard(
    pool: &PgPool,
    config: &dyn ConfigStore,
    query: &LeaderboardQuery,
) -> Result<Vec<LeaderboardEntry>> {
    let format = FormatRepository::new(pool).find(query.format).await?;
    let field = ListField::for_format(format.id).ok_or_else(|| {
        StorageError::Validation(format!("{} has no leaderboard", format.name))
    })?;
    let formats = FormatRepository::new(pool)
        .with_descendants(format.id)
        .await?;

    let scoring = ScoringConfig::load(config, field).await?;
    let at = query.as_of.unwrap_or_else(Utc::now);

    let repo = LeaderboardRepository::new(pool);
    let maps = repo.active_maps(at).await?;
    let runs = repo.runs(at, &formats).await?;

    let formats: HashSet<_> = formats.into_iter().collect();
    let entries = compute_leaderboard(&scoring, &formats, &maps, &runs, query.metric);

    tracing::debug!(
        format = format.id,
        metric = %query.metric,
        %at,
        entries = entries.len(),
        "Computed leaderboard"
    );
    Ok(entries)
}

/// A single user's entry, or `None` when they have no score
pub async fn user_standing(
    pool: &PgPool,
    config: &dyn ConfigStore,
    query: &LeaderboardQuery,
    user: UserId,
) -> Result<Option<LeaderboardEntry>> {
    let entries = get_leaderboard(pool, config, query).await?;
    Ok(entries.into_iter().find(|entry| entry.user_id == user))
}

/// The best role `user` currently earns on the query's leaderboard
pub async fn achievement_for_user(
    pool: &PgPool,
    config: &dyn ConfigStore,
    query: &LeaderboardQuery,
    user: UserId,
) -> Result<Option<AchievementRole>> {
    let roles = AchievementRepository::new(pool)
        .list_for(query.format, query.metric)
        .await?;
    let standing = user_standing(pool, config, query, user).await?;

    Ok(best_role(&roles, standing.as_ref()).cloned())
}

/// The best role of every user on the query's leaderboard
pub async fn achievement_assignments(
    pool: &PgPool,
    config: &dyn ConfigStore,
    query: &LeaderboardQuery,
) -> Result<Vec<RoleAssignment>> {
    let roles = AchievementRepository::new(pool)
        .list_for(query.format, query.metric)
        .await?;
    let entries = get_leaderboard(pool, config, query).await?;

    Ok(assign_all(&entries, &roles))
}
