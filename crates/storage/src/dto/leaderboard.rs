use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::error::StorageError;
use crate::models::{AchievementRole, FormatId, UserId};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardMetric {
    #[default]
    Points,
    BlackBorder,
    NoGeraldo,
    Lcc,
}

impl LeaderboardMetric {
    pub const ALL: [LeaderboardMetric; 4] = [
        LeaderboardMetric::Points,
        LeaderboardMetric::BlackBorder,
        LeaderboardMetric::NoGeraldo,
        LeaderboardMetric::Lcc,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Points => "points",
            Self::BlackBorder => "black_border",
            Self::NoGeraldo => "no_geraldo",
            Self::Lcc => "lcc",
        }
    }
}

impl FromStr for LeaderboardMetric {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|metric| metric.as_str() == s)
            .ok_or_else(|| StorageError::Validation(format!("unknown leaderboard metric '{s}'")))
    }
}

impl std::fmt::Display for LeaderboardMetric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct LeaderboardQuery {
    pub format: FormatId,
    #[serde(default)]
    pub metric: LeaderboardMetric,
    /// Reference time for the standings; defaults to now.
    pub as_of: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub score: Decimal,
    pub rank: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RoleAssignment {
    pub user_id: UserId,
    pub role: AchievementRole,
}
