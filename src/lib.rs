pub mod background;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod leaderboard;
pub mod metrics;
pub mod nicknames;
pub mod players;
pub mod ranking;
pub mod scoring;
pub mod war;
