use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

pub type FormatId = i32;

pub const MAPLIST: FormatId = 1;
pub const MAPLIST_ALL_VERSIONS: FormatId = 2;
pub const NOSTALGIA_PACK: FormatId = 11;
pub const EXPERT_LIST: FormatId = 51;
pub const BEST_OF_THE_BEST: FormatId = 52;

/// A ruleset completions are judged under.
///
/// A format with a `parent` is a rule subset of it: completions accepted
/// under the child also count toward the parent's leaderboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Format {
    pub id: FormatId,
    pub name: String,
    pub parent: Option<FormatId>,
    pub hidden: bool,
}

/// How a list field orders the maps that hold it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Contiguous positions `1..=N`, shifted on every insert/move/clear.
    Dense,
    /// A difficulty tier in `0..TIER_COUNT`, with no ordering between maps.
    Tier,
    /// A reference that at most one live map may hold at a time.
    Singleton,
}

/// Number of tiers on the Expert and Best of the Best lists.
pub const TIER_COUNT: i32 = 5;

/// The list-membership columns of a map's metadata. Each belongs to exactly
/// one format, and edits to it are authorized against that format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ListField {
    PlacementCurver,
    PlacementAllver,
    Difficulty,
    BotbDifficulty,
    RemakeOf,
}

impl ListField {
    pub const ALL: [ListField; 5] = [
        ListField::PlacementCurver,
        ListField::PlacementAllver,
        ListField::Difficulty,
        ListField::BotbDifficulty,
        ListField::RemakeOf,
    ];

    pub fn column(&self) -> &'static str {
        match self {
            Self::PlacementCurver => "placement_curver",
            Self::PlacementAllver => "placement_allver",
            Self::Difficulty => "difficulty",
            Self::BotbDifficulty => "botb_difficulty",
            Self::RemakeOf => "remake_of",
        }
    }

    pub fn format(&self) -> FormatId {
        match self {
            Self::PlacementCurver => MAPLIST,
            Self::PlacementAllver => MAPLIST_ALL_VERSIONS,
            Self::Difficulty => EXPERT_LIST,
            Self::BotbDifficulty => BEST_OF_THE_BEST,
            Self::RemakeOf => NOSTALGIA_PACK,
        }
    }

    pub fn kind(&self) -> FieldKind {
        match self {
            Self::PlacementCurver | Self::PlacementAllver => FieldKind::Dense,
            Self::Difficulty | Self::BotbDifficulty => FieldKind::Tier,
            Self::RemakeOf => FieldKind::Singleton,
        }
    }

    /// The list field whose membership defines a format's map pool.
    pub fn for_format(format: FormatId) -> Option<ListField> {
        Self::ALL.into_iter().find(|field| field.format() == format)
    }
}

impl std::fmt::Display for ListField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.column())
    }
}
