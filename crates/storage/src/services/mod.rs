pub mod achievements;
pub mod config_store;
pub mod leaderboard;
pub mod map_edits;
pub mod permissions;
pub mod placement;
pub mod scoring;
