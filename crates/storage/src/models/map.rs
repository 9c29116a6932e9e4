use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use super::format::ListField;
use crate::versioning::Versioned;

/// Immutable identity of a map. Everything that changes over time lives in
/// [`MapMeta`] versions.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Map {
    pub code: String,
    pub name: String,
    pub preview_url: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One historical state of a map's list membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct MapMeta {
    pub id: i64,
    pub code: String,
    pub placement_curver: Option<i32>,
    pub placement_allver: Option<i32>,
    pub difficulty: Option<i32>,
    pub botb_difficulty: Option<i32>,
    pub remake_of: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl MapMeta {
    pub fn field(&self, field: ListField) -> Option<i32> {
        match field {
            ListField::PlacementCurver => self.placement_curver,
            ListField::PlacementAllver => self.placement_allver,
            ListField::Difficulty => self.difficulty,
            ListField::BotbDifficulty => self.botb_difficulty,
            ListField::RemakeOf => self.remake_of,
        }
    }

    /// Whether the map is listed under at least one field.
    pub fn is_listed(&self) -> bool {
        ListField::ALL.iter().any(|f| self.field(*f).is_some())
    }
}

impl Versioned for MapMeta {
    fn version_id(&self) -> i64 {
        self.id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn deleted_at(&self) -> Option<DateTime<Utc>> {
        self.deleted_at
    }
}

/// The field values of a map version about to be appended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewMapMeta {
    pub code: String,
    pub placement_curver: Option<i32>,
    pub placement_allver: Option<i32>,
    pub difficulty: Option<i32>,
    pub botb_difficulty: Option<i32>,
    pub remake_of: Option<i32>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl NewMapMeta {
    /// Starts a draft from the map's current version, or from an unlisted
    /// state when it has none.
    pub fn from_current(code: &str, current: Option<&MapMeta>) -> Self {
        match current {
            Some(meta) => Self {
                code: meta.code.clone(),
                placement_curver: meta.placement_curver,
                placement_allver: meta.placement_allver,
                difficulty: meta.difficulty,
                botb_difficulty: meta.botb_difficulty,
                remake_of: meta.remake_of,
                deleted_at: meta.deleted_at,
            },
            None => Self {
                code: code.to_string(),
                ..Self::default()
            },
        }
    }

    pub fn field(&self, field: ListField) -> Option<i32> {
        match field {
            ListField::PlacementCurver => self.placement_curver,
            ListField::PlacementAllver => self.placement_allver,
            ListField::Difficulty => self.difficulty,
            ListField::BotbDifficulty => self.botb_difficulty,
            ListField::RemakeOf => self.remake_of,
        }
    }

    pub fn set_field(&mut self, field: ListField, value: Option<i32>) {
        let slot = match field {
            ListField::PlacementCurver => &mut self.placement_curver,
            ListField::PlacementAllver => &mut self.placement_allver,
            ListField::Difficulty => &mut self.difficulty,
            ListField::BotbDifficulty => &mut self.botb_difficulty,
            ListField::RemakeOf => &mut self.remake_of,
        };
        *slot = value;
    }

    pub fn is_listed(&self) -> bool {
        ListField::ALL.iter().any(|f| self.field(*f).is_some())
    }
}

/// Catalogue entry for a map from an older game, target of `remake_of`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RetroMap {
    pub id: i32,
    pub name: String,
    pub game: String,
}
