use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::format::FormatId;

/// A reward tier on a `(format, metric)` leaderboard.
///
/// `for_first` roles go to whoever is ranked first; the others to anyone
/// whose score reaches `threshold`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AchievementRole {
    pub id: i32,
    pub lb_format: FormatId,
    pub lb_type: String,
    pub threshold: i32,
    pub for_first: bool,
    pub name: String,
    pub tooltip: Option<String>,
    pub clr_border: i32,
    pub clr_inner: i32,
    pub discord_role: Option<i64>,
}
