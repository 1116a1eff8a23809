//! Player identity resolution over the relational store.
//!
//! Nicknames arrive as free text from untrusted uploads; the directory is
//! the only component allowed to decide whether a nickname is a known
//! player, a typo of one, or someone new.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::db::models::{HistoryEntry, Player, PlayerProfile};
use crate::db::{NewPlayer, WarStore};
use crate::error::{Error, Result};
use crate::leaderboard::Page;
use crate::nicknames::{match_rank, normalize, same_identity};

/// Per-class breakdown served from the authoritative store.
#[derive(Debug, Clone, Serialize)]
pub struct ClassBreakdown {
    pub wars_played: usize,
    pub win_rate: f64,
    pub total: StatLine,
    pub per_war: StatLineF,
    pub war_history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatLine {
    pub kills: i64,
    pub deaths: i64,
    pub assists: i64,
    pub damage: i64,
    pub healing: i64,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StatLineF {
    pub kills: f64,
    pub deaths: f64,
    pub assists: f64,
    pub damage: f64,
    pub healing: f64,
}

/// Player plus profile counters, for the lookup endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct PlayerView {
    #[serde(flatten)]
    pub player: Player,
    pub profile: Option<PlayerProfile>,
}

#[derive(Clone)]
pub struct PlayerDirectory {
    store: Arc<dyn WarStore>,
}

impl PlayerDirectory {
    pub fn new(store: Arc<dyn WarStore>) -> Self {
        PlayerDirectory { store }
    }

    /// Resolve every nickname to a player row, creating the unknown ones.
    ///
    /// Matching compares the canonical form of each input against every
    /// existing player's key under the adaptive edit budget. Unmatched
    /// nicknames become creation candidates, deduplicated by exact key so
    /// one batch cannot insert the same identity twice. Returns one player
    /// per input (duplicates collapsed); a nickname that still resolves to
    /// nothing is an error, never silently dropped.
    pub async fn upsert_players(
        &self,
        nicknames: &[String],
        world: Option<&str>,
    ) -> Result<Vec<Player>> {
        let mut known = self.store.all_players().await?;

        let mut candidate_keys = HashSet::new();
        let mut to_create = Vec::new();
        for nick in nicknames {
            let key = normalize(nick);
            let matched = known.iter().any(|p| same_identity(&p.nick_key, &key, None));
            if !matched && candidate_keys.insert(key.clone()) {
                to_create.push(NewPlayer {
                    nickname: nick.clone(),
                    nick_key: key,
                    world: world.map(str::to_string),
                });
            }
        }

        if !to_create.is_empty() {
            let created = self.store.create_players(to_create).await?;
            known.extend(created);
        }

        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        for nick in nicknames {
            let key = normalize(nick);
            let player = known
                .iter()
                .find(|p| p.nick_key == key)
                .or_else(|| known.iter().find(|p| same_identity(&p.nick_key, &key, None)))
                .ok_or_else(|| Error::UnresolvedIdentity(nick.clone()))?;
            if seen.insert(player.id) {
                resolved.push(player.clone());
            }
        }
        Ok(resolved)
    }

    /// Exact lookup by canonical key.
    pub async fn find_by_nickname(&self, nickname: &str) -> Result<Option<PlayerView>> {
        let Some(player) = self.store.find_player_by_key(&normalize(nickname)).await? else {
            return Ok(None);
        };
        let profile = self.store.profile_of(player.id).await?;
        Ok(Some(PlayerView { player, profile }))
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Player>> {
        self.store.find_player_by_id(id).await
    }

    /// Ranked nickname search: exact key match first, then prefix,
    /// substring, and edit-distance matches; everything else is excluded.
    /// Without a query the whole directory pages through alphabetically.
    pub async fn search(
        &self,
        query: Option<&str>,
        page: u32,
        limit: u32,
    ) -> Result<Page<Player>> {
        let players = self.store.all_players().await?;

        let mut hits: Vec<(usize, Player)> = match query {
            Some(q) if !normalize(q).is_empty() => players
                .into_iter()
                .filter_map(|p| match_rank(q, &p.nickname).map(|rank| (rank, p)))
                .collect(),
            _ => players.into_iter().map(|p| (0, p)).collect(),
        };
        hits.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.nick_key.cmp(&b.1.nick_key)));

        let page = page.max(1);
        let limit = limit.clamp(1, crate::config::settings().max_page_size);
        let total = hits.len() as u64;
        let start = (page as u64 - 1) * limit as u64;
        let data: Vec<Player> = hits
            .into_iter()
            .skip(start.min(total) as usize)
            .take(limit as usize)
            .map(|(_, p)| p)
            .collect();

        Ok(Page::new(data, total, page, limit))
    }

    /// Authoritative per-class stats with full war history.
    pub async fn class_breakdown(&self, nickname: &str, class: &str) -> Result<ClassBreakdown> {
        let player = self
            .store
            .find_player_by_key(&normalize(nickname))
            .await?
            .ok_or_else(|| Error::NotFound(format!("player '{nickname}'")))?;

        let history = self.store.history_of_player_class(player.id, class).await?;
        let wars_played = history.len();
        if wars_played == 0 {
            return Ok(ClassBreakdown {
                wars_played: 0,
                win_rate: 0.0,
                total: StatLine::default(),
                per_war: StatLineF::default(),
                war_history: Vec::new(),
            });
        }

        let mut total = StatLine::default();
        let mut wins = 0usize;
        for entry in &history {
            total.kills += entry.kills as i64;
            total.deaths += entry.deaths as i64;
            total.assists += entry.assists as i64;
            total.damage += entry.damage;
            total.healing += entry.healing;
            wins += entry.win as usize;
        }

        let n = wars_played as f64;
        Ok(ClassBreakdown {
            wars_played,
            win_rate: wins as f64 / n * 100.0,
            per_war: StatLineF {
                kills: total.kills as f64 / n,
                deaths: total.deaths as f64 / n,
                assists: total.assists as f64 / n,
                damage: total.damage as f64 / n,
                healing: total.healing as f64 / n,
            },
            total,
            war_history: history,
        })
    }
}
