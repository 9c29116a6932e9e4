pub mod completion;
pub mod leaderboard;
pub mod map;
