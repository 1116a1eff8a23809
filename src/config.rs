//! Runtime configuration for the warboard server.

use once_cell::sync::Lazy;
use std::env;

#[derive(Debug)]
pub struct Settings {
    /// Players per chunk when replaying performances into the ranking cache.
    pub cache_chunk_size: usize,
    /// Pause between cache chunks (milliseconds).
    pub cache_chunk_pause_ms: u64,
    /// Capacity of the background task queue.
    pub task_queue_depth: usize,
    /// Hard cap on leaderboard / search page size.
    pub max_page_size: u32,
}

impl Settings {
    fn from_env() -> Self {
        let cache_chunk_size = env::var("CACHE_CHUNK_SIZE")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(20);

        let cache_chunk_pause_ms = env::var("CACHE_CHUNK_PAUSE_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5);

        let task_queue_depth = env::var("TASK_QUEUE_DEPTH")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or(64);

        let max_page_size = env::var("MAX_PAGE_SIZE")
            .ok()
            .and_then(|v| v.parse::<u32>().ok())
            .unwrap_or(100);

        Settings {
            cache_chunk_size,
            cache_chunk_pause_ms,
            task_queue_depth,
            max_page_size,
        }
    }
}

static SETTINGS: Lazy<Settings> = Lazy::new(Settings::from_env);

pub fn settings() -> &'static Settings {
    &SETTINGS
}
