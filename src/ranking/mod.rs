//! Ranking cache: per-(player, class) counters plus six sorted-set boards.
//!
//! The cache is a derived projection over the relational store, never the
//! record of truth. Updates are two-phase: counters are incremented in one
//! pipelined shot, then the full record is read back and every average is
//! recomputed from the totals. Averages are never adjusted incrementally,
//! so concurrent writers can interleave without drifting — the last write
//! always reflects some serialization of the increments.
//!
//! Key layout (inherited by every backend):
//!   player:{id}:class:{class}:stats          counter hash
//!   leaderboard:{metric}[:world:{w}][:class:{c}]  sorted set, member "{id}:{class}"

pub mod memory;
pub mod redis;

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;
use tokio::time::sleep;
use uuid::Uuid;

use crate::config::settings;
use crate::db::WarStore;
use crate::error::{Error, Result};

/// Minimal hash/sorted-set surface the cache needs from its backend.
#[async_trait]
pub trait RankingBackend: Send + Sync {
    /// Increment several hash fields in one pipelined round trip.
    async fn hash_incr(&self, key: &str, deltas: &[(&str, f64)]) -> Result<()>;
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>>;
    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> Result<()>;
    async fn zadd(&self, key: &str, member: &str, score: f64) -> Result<()>;
    /// Highest-score-first range, inclusive on both ends.
    async fn zrevrange_withscores(&self, key: &str, start: isize, stop: isize)
        -> Result<Vec<(String, f64)>>;
    async fn zcard(&self, key: &str) -> Result<u64>;
    async fn zrem(&self, key: &str, member: &str) -> Result<()>;
    async fn keys(&self, pattern: &str) -> Result<Vec<String>>;
    async fn del(&self, key: &str) -> Result<()>;
}

/// One ranked metric, also the key fragment of its board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    WinRate,
    MostWins,
    LeastDeaths,
    MostKills,
    MostAssists,
    AverageScore,
}

impl Metric {
    pub fn all() -> [Metric; 6] {
        [
            Metric::WinRate,
            Metric::MostWins,
            Metric::LeastDeaths,
            Metric::MostKills,
            Metric::MostAssists,
            Metric::AverageScore,
        ]
    }

    pub fn key_part(self) -> &'static str {
        match self {
            Metric::WinRate => "winrate",
            Metric::MostWins => "mostwins",
            Metric::LeastDeaths => "leastdeaths",
            Metric::MostKills => "mostkills",
            Metric::MostAssists => "mostassists",
            Metric::AverageScore => "averagescore",
        }
    }

    /// Score stored in the board. Least-deaths is negated so that fewer
    /// deaths sorts first in a descending set.
    fn board_score(self, stats: &PlayerStats) -> f64 {
        match self {
            Metric::WinRate => stats.win_rate,
            Metric::MostWins => stats.wins as f64,
            Metric::LeastDeaths => -stats.avg_deaths,
            Metric::MostKills => stats.avg_kills,
            Metric::MostAssists => stats.avg_assists,
            Metric::AverageScore => stats.avg_score,
        }
    }

    /// Whether the stored score must be negated back for display.
    pub fn display_negated(self) -> bool {
        matches!(self, Metric::LeastDeaths)
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Metric> {
        match s {
            "winrate" => Ok(Metric::WinRate),
            "mostwins" => Ok(Metric::MostWins),
            "leastdeaths" => Ok(Metric::LeastDeaths),
            "mostkills" => Ok(Metric::MostKills),
            "mostassists" => Ok(Metric::MostAssists),
            "averagescore" => Ok(Metric::AverageScore),
            other => Err(Error::Validation(format!("unknown metric '{other}'"))),
        }
    }
}

/// Board member: one player in one class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct PlayerClassRef {
    pub player_id: Uuid,
    pub class: String,
}

impl PlayerClassRef {
    pub fn member(&self) -> String {
        format!("{}:{}", self.player_id, self.class)
    }

    /// Inverse of [`member`](Self::member). UUIDs never contain ':'.
    pub fn parse(member: &str) -> Option<PlayerClassRef> {
        let (id, class) = member.split_once(':')?;
        Some(PlayerClassRef {
            player_id: Uuid::parse_str(id).ok()?,
            class: class.to_string(),
        })
    }
}

/// One performance as the cache sees it, detached from any store row.
#[derive(Debug, Clone)]
pub struct RawPerformance {
    pub player_id: Uuid,
    pub class: String,
    pub world: Option<String>,
    pub score: f64,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub win: bool,
}

/// Counter deltas applied in phase one of an update.
#[derive(Debug, Clone, Default)]
struct CounterDelta {
    games: u64,
    score: f64,
    kills: u64,
    deaths: u64,
    assists: u64,
    wins: u64,
}

/// Full counters record with all derived averages.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerStats {
    pub games_played: u64,
    pub total_score: f64,
    pub total_kills: u64,
    pub total_deaths: u64,
    pub total_assists: u64,
    pub wins: u64,
    pub avg_score: f64,
    pub avg_kills: f64,
    pub avg_deaths: f64,
    pub avg_assists: f64,
    pub win_rate: f64,
}

impl PlayerStats {
    /// Rebuild from a counter hash; `None` when no games are on record.
    fn from_hash(raw: &HashMap<String, String>) -> Option<PlayerStats> {
        let num = |field: &str| -> f64 {
            raw.get(field).and_then(|v| v.parse::<f64>().ok()).unwrap_or(0.0)
        };

        let games = num("games_played");
        if games < 1.0 {
            return None;
        }
        let total_score = num("total_score");
        let total_kills = num("total_kills");
        let total_deaths = num("total_deaths");
        let total_assists = num("total_assists");
        let wins = num("wins");

        Some(PlayerStats {
            games_played: games as u64,
            total_score,
            total_kills: total_kills as u64,
            total_deaths: total_deaths as u64,
            total_assists: total_assists as u64,
            wins: wins as u64,
            avg_score: total_score / games,
            avg_kills: total_kills / games,
            avg_deaths: total_deaths / games,
            avg_assists: total_assists / games,
            win_rate: wins / games * 100.0,
        })
    }
}

fn stats_key(pair: &PlayerClassRef) -> String {
    format!("player:{}:class:{}:stats", pair.player_id, pair.class)
}

fn board_key(metric: Metric, world: Option<&str>, class: Option<&str>) -> String {
    let mut key = format!("leaderboard:{}", metric.key_part());
    if let Some(w) = world {
        key.push_str(":world:");
        key.push_str(w);
    }
    if let Some(c) = class {
        key.push_str(":class:");
        key.push_str(c);
    }
    key
}

/// The ranking cache proper. Holds no entity of record; fully rebuildable
/// from the relational store via [`recover_if_empty`](Self::recover_if_empty).
pub struct RankingCache {
    backend: Arc<dyn RankingBackend>,
}

impl RankingCache {
    pub fn new(backend: Arc<dyn RankingBackend>) -> Self {
        RankingCache { backend }
    }

    /// Fold one performance into the counters and boards.
    pub async fn update_one(&self, perf: &RawPerformance) -> Result<()> {
        let pair = PlayerClassRef {
            player_id: perf.player_id,
            class: perf.class.clone(),
        };
        let delta = CounterDelta {
            games: 1,
            score: perf.score,
            kills: perf.kills as u64,
            deaths: perf.deaths as u64,
            assists: perf.assists as u64,
            wins: perf.win as u64,
        };
        self.apply_delta(&pair, perf.world.as_deref(), &delta).await
    }

    /// Two-phase update: pipelined increments, then a full recompute of the
    /// averages from the read-back totals and a rewrite of every board the
    /// pair belongs to.
    async fn apply_delta(
        &self,
        pair: &PlayerClassRef,
        world: Option<&str>,
        delta: &CounterDelta,
    ) -> Result<()> {
        let key = stats_key(pair);

        let mut incrs: Vec<(&str, f64)> = vec![
            ("games_played", delta.games as f64),
            ("total_score", delta.score),
            ("total_kills", delta.kills as f64),
            ("total_deaths", delta.deaths as f64),
            ("total_assists", delta.assists as f64),
        ];
        if delta.wins > 0 {
            incrs.push(("wins", delta.wins as f64));
        }
        self.backend.hash_incr(&key, &incrs).await?;

        let raw = self.backend.hash_get_all(&key).await?;
        let stats = PlayerStats::from_hash(&raw)
            .ok_or_else(|| Error::Cache(format!("counters vanished under {key}")))?;

        self.backend
            .hash_set(
                &key,
                &[
                    ("avg_score", stats.avg_score.to_string()),
                    ("avg_kills", stats.avg_kills.to_string()),
                    ("avg_deaths", stats.avg_deaths.to_string()),
                    ("avg_assists", stats.avg_assists.to_string()),
                    ("win_rate", stats.win_rate.to_string()),
                    ("last_updated", Utc::now().to_rfc3339()),
                ],
            )
            .await?;

        let member = pair.member();
        for metric in Metric::all() {
            let score = metric.board_score(&stats);
            for board in self.boards_of(metric, world, &pair.class) {
                self.backend.zadd(&board, &member, score).await?;
            }
        }
        Ok(())
    }

    /// Every partition a pair's score lands in: the global board, the class
    /// board, and the world variants of both when the world is known.
    fn boards_of(&self, metric: Metric, world: Option<&str>, class: &str) -> Vec<String> {
        let mut keys = vec![
            board_key(metric, None, None),
            board_key(metric, None, Some(class)),
        ];
        if let Some(w) = world {
            keys.push(board_key(metric, Some(w), None));
            keys.push(board_key(metric, Some(w), Some(class)));
        }
        keys
    }

    /// Batch path: collapse repeated performances per (player, class) into
    /// one delta, then apply in bounded chunks with a short pause between
    /// them. A failing entry is logged and skipped, never aborts the batch.
    pub async fn update_batch(&self, perfs: Vec<RawPerformance>) {
        if perfs.is_empty() {
            return;
        }

        let mut aggregated: HashMap<PlayerClassRef, (Option<String>, CounterDelta)> =
            HashMap::new();
        for perf in perfs {
            let pair = PlayerClassRef {
                player_id: perf.player_id,
                class: perf.class.clone(),
            };
            let (world, delta) = aggregated.entry(pair).or_default();
            if world.is_none() {
                *world = perf.world.clone();
            }
            delta.games += 1;
            delta.score += perf.score;
            delta.kills += perf.kills as u64;
            delta.deaths += perf.deaths as u64;
            delta.assists += perf.assists as u64;
            delta.wins += perf.win as u64;
        }

        let entries: Vec<_> = aggregated.into_iter().collect();
        let chunk_size = settings().cache_chunk_size.max(1);

        for (i, chunk) in entries.chunks(chunk_size).enumerate() {
            if i > 0 {
                sleep(Duration::from_millis(settings().cache_chunk_pause_ms)).await;
            }
            let work = chunk.iter().map(|(pair, (world, delta))| async move {
                if let Err(e) = self.apply_delta(pair, world.as_deref(), delta).await {
                    log::error!(
                        "ranking update failed for {}:{}: {e}",
                        pair.player_id,
                        pair.class
                    );
                }
            });
            join_all(work).await;
        }
    }

    /// Remove the given pairs from every board and drop their counter
    /// hashes. Used after a war rollback.
    pub async fn reset_players(&self, pairs: &[PlayerClassRef]) -> Result<()> {
        if pairs.is_empty() {
            return Ok(());
        }
        let boards = self.backend.keys("leaderboard:*").await?;
        for pair in pairs {
            let member = pair.member();
            for board in &boards {
                self.backend.zrem(board, &member).await?;
            }
            self.backend.del(&stats_key(pair)).await?;
        }
        log::info!("reset ranking data for {} player-class pairs", pairs.len());
        Ok(())
    }

    pub async fn get_stats(&self, player_id: Uuid, class: &str) -> Result<Option<PlayerStats>> {
        let pair = PlayerClassRef {
            player_id,
            class: class.to_string(),
        };
        let raw = self.backend.hash_get_all(&stats_key(&pair)).await?;
        Ok(PlayerStats::from_hash(&raw))
    }

    /// All counter records for a class. A full key scan per call; fine at
    /// moderate cardinalities, revisit if class rosters grow past ~10k.
    pub async fn stats_for_class(&self, class: &str) -> Result<Vec<(Uuid, PlayerStats)>> {
        let pattern = format!("player:*:class:{class}:stats");
        let keys = self.backend.keys(&pattern).await?;

        let mut out = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(id) = key.split(':').nth(1).and_then(|s| Uuid::parse_str(s).ok()) else {
                continue;
            };
            let raw = self.backend.hash_get_all(&key).await?;
            if let Some(stats) = PlayerStats::from_hash(&raw) {
                out.push((id, stats));
            }
        }
        Ok(out)
    }

    /// Cardinality and one page of a board, highest score first.
    pub async fn board_page(
        &self,
        metric: Metric,
        world: Option<&str>,
        class: Option<&str>,
        start: u64,
        stop: u64,
    ) -> Result<(u64, Vec<(PlayerClassRef, f64)>)> {
        let key = board_key(metric, world, class);
        let total = self.backend.zcard(&key).await?;
        let rows = self
            .backend
            .zrevrange_withscores(&key, start as isize, stop as isize)
            .await?;

        let entries = rows
            .into_iter()
            .filter_map(|(member, score)| PlayerClassRef::parse(&member).map(|p| (p, score)))
            .collect();
        Ok((total, entries))
    }

    /// Startup repair: when no board exists but the relational store holds
    /// performances, replay them all through the live aggregation path.
    /// This is the sole reconciliation mechanism.
    pub async fn recover_if_empty(&self, store: &dyn WarStore) -> Result<()> {
        let boards = self.backend.keys("leaderboard:*").await?;
        if !boards.is_empty() {
            log::info!("ranking cache already warm ({} boards)", boards.len());
            return Ok(());
        }

        let count = store.count_performances().await?;
        if count == 0 {
            log::info!("no performances on record, ranking cache starts cold");
            return Ok(());
        }

        log::info!("rebuilding ranking cache from {count} performances");
        let perfs = store.all_performances().await?;
        self.update_batch(perfs).await;
        Ok(())
    }
}
