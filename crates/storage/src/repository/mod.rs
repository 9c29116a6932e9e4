pub mod achievement;
pub mod completion;
pub mod config;
pub mod format;
pub mod leaderboard;
pub mod map;
pub mod versioned;
