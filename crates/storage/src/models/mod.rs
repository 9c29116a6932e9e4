mod achievement_role;
mod completion;
mod config;
pub mod format;
mod map;

pub use achievement_role::AchievementRole;
pub use completion::{Completion, CompletionMeta, CompletionState, NewCompletionMeta, UserId};
pub use config::{ConfigEntry, ConfigValue};
pub use format::{FieldKind, Format, FormatId, ListField};
pub use map::{Map, MapMeta, NewMapMeta, RetroMap};
