//! Ranked reads over the cache, enriched with authoritative display data.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::config::settings;
use crate::db::WarStore;
use crate::error::Result;
use crate::ranking::{Metric, PlayerStats, RankingCache};

/// Rank reported when a player has no record in the scanned class.
pub const UNRANKED: u64 = 999;

/// Paginated result envelope shared by leaderboard and search reads.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, total: u64, page: u32, limit: u32) -> Self {
        Page {
            data,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit.max(1) as u64),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LeaderboardRow {
    pub rank: u64,
    pub player_id: Uuid,
    pub class: String,
    /// Current nickname, fetched from the store at read time; the cache
    /// never holds display names.
    pub nickname: Option<String>,
    pub world: Option<String>,
    pub value: f64,
}

#[derive(Clone)]
pub struct LeaderboardService {
    cache: Arc<RankingCache>,
    store: Arc<dyn WarStore>,
}

impl LeaderboardService {
    pub fn new(cache: Arc<RankingCache>, store: Arc<dyn WarStore>) -> Self {
        LeaderboardService { cache, store }
    }

    /// One page of a board, highest score first, with display data joined
    /// in from the relational store.
    pub async fn get_leaderboard(
        &self,
        metric: Metric,
        page: u32,
        limit: u32,
        world: Option<&str>,
        class: Option<&str>,
    ) -> Result<Page<LeaderboardRow>> {
        let page = page.max(1);
        let limit = limit.clamp(1, settings().max_page_size);
        let start = (page as u64 - 1) * limit as u64;
        let stop = start + limit as u64 - 1;

        let (total, entries) = self
            .cache
            .board_page(metric, world, class, start, stop)
            .await?;

        let mut ids: Vec<Uuid> = entries.iter().map(|(p, _)| p.player_id).collect();
        ids.sort();
        ids.dedup();
        let display: HashMap<Uuid, _> = self
            .store
            .find_players_by_ids(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let data = entries
            .into_iter()
            .enumerate()
            .map(|(i, (pair, score))| {
                let player = display.get(&pair.player_id);
                LeaderboardRow {
                    rank: start + i as u64 + 1,
                    player_id: pair.player_id,
                    class: pair.class,
                    nickname: player.map(|p| p.nickname.clone()),
                    world: player.and_then(|p| p.world.clone()),
                    value: if metric.display_negated() { -score } else { score },
                }
            })
            .collect();

        Ok(Page::new(data, total, page, limit))
    }

    pub async fn get_player_stats(
        &self,
        player_id: Uuid,
        class: &str,
    ) -> Result<Option<PlayerStats>> {
        self.cache.get_stats(player_id, class).await
    }

    /// 1-based position of a player within a class, by average score over
    /// every record in that class. Deliberately a full scan per call.
    pub async fn get_overall_rank(&self, player_id: Uuid, class: &str) -> Result<u64> {
        let mut stats = self.cache.stats_for_class(class).await?;
        stats.retain(|(_, s)| s.avg_score > 0.0);
        stats.sort_by(|a, b| {
            b.1.avg_score
                .partial_cmp(&a.1.avg_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        Ok(stats
            .iter()
            .position(|(id, _)| *id == player_id)
            .map(|i| i as u64 + 1)
            .unwrap_or(UNRANKED))
    }
}
