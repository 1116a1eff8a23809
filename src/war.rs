//! War ingestion pipeline and rollback engine.
//!
//! A submission either creates a new war with its first side or attaches
//! the missing side to an existing one. The relational write is one
//! transaction; the ranking-cache update is deliberately not part of it —
//! it is queued on the background runner after commit and the cache heals
//! itself through the recovery scan if that update is ever lost.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::background::TaskRunner;
use crate::db::models::{SideType, War, WarSummary};
use crate::db::{NewPerformance, NewWar, WarStore};
use crate::error::{Error, Result};
use crate::nicknames::{normalize, same_identity};
use crate::players::PlayerDirectory;
use crate::ranking::{RankingCache, RawPerformance};
use crate::scoring::ScoreFn;

/// One player line as uploaded.
#[derive(Debug, Clone, Deserialize)]
pub struct PlayerLine {
    pub nickname: String,
    pub class: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub damage: u64,
    pub healing: u64,
}

/// One named group of player lines (uploads arrive per war party).
#[derive(Debug, Clone, Deserialize)]
pub struct PartyStats {
    pub name: String,
    pub players: Vec<PlayerLine>,
}

/// A war submission: one company reporting its own side of a war.
#[derive(Debug, Clone, Deserialize)]
pub struct WarUpload {
    pub territory: String,
    pub start_time: DateTime<Utc>,
    pub company_id: Uuid,
    pub opponent_id: Uuid,
    pub side: SideType,
    pub is_winner: bool,
    pub world: Option<String>,
    pub stats: Vec<PartyStats>,
}

#[derive(Clone)]
pub struct WarService {
    store: Arc<dyn WarStore>,
    players: PlayerDirectory,
    cache: Arc<RankingCache>,
    tasks: TaskRunner,
    score: ScoreFn,
}

impl WarService {
    pub fn new(
        store: Arc<dyn WarStore>,
        players: PlayerDirectory,
        cache: Arc<RankingCache>,
        tasks: TaskRunner,
        score: ScoreFn,
    ) -> Self {
        WarService {
            store,
            players,
            cache,
            tasks,
            score,
        }
    }

    /// Validate and commit a submission, then queue the cache update.
    ///
    /// Validation order, first failure wins: self-war, conflicting war,
    /// role conflict, duplicate side. Racing submissions that slip past
    /// the duplicate-side read are stopped by the store's unique
    /// constraints and surface as the same conflict error.
    pub async fn upload_war(&self, upload: WarUpload) -> Result<War> {
        if upload.company_id == upload.opponent_id {
            return Err(Error::Validation(
                "attacker and defender cannot be the same company".into(),
            ));
        }
        if upload.stats.iter().all(|g| g.players.is_empty()) {
            return Err(Error::Validation("no player statistics provided".into()));
        }

        let existing = self
            .store
            .find_war(&upload.territory, upload.start_time)
            .await?;

        let war = match existing {
            Some(war) => {
                if upload.company_id != war.attacker_id && upload.company_id != war.defender_id {
                    return Err(Error::Conflict(
                        "a war for this territory and time already exists".into(),
                    ));
                }

                let holds_opponent_role = (upload.side == SideType::Attacker
                    && upload.company_id == war.defender_id)
                    || (upload.side == SideType::Defender
                        && upload.company_id == war.attacker_id);
                if holds_opponent_role {
                    return Err(Error::Conflict(
                        "a company cannot be both attacker and defender in the same war".into(),
                    ));
                }

                let sides = self.store.sides_of(war.id).await?;
                if sides
                    .iter()
                    .any(|s| s.company_id == upload.company_id && s.side == upload.side)
                {
                    return Err(Error::Conflict(format!(
                        "this company has already registered as {} for this war",
                        upload.side
                    )));
                }

                let perfs = self.resolve_performances(&upload).await?;
                self.store
                    .attach_side(war.id, upload.side, upload.company_id, perfs.clone())
                    .await?;
                self.queue_cache_update(&upload, perfs);
                war
            }
            None => {
                let perfs = self.resolve_performances(&upload).await?;

                let (attacker_id, defender_id) = match upload.side {
                    SideType::Attacker => (upload.company_id, upload.opponent_id),
                    SideType::Defender => (upload.opponent_id, upload.company_id),
                };
                let winner = if upload.is_winner {
                    upload.side
                } else {
                    upload.side.opposite()
                };

                let war = self
                    .store
                    .create_war(
                        NewWar {
                            territory: upload.territory.clone(),
                            start_time: upload.start_time,
                            attacker_id,
                            defender_id,
                            winner,
                            world: upload.world.clone(),
                        },
                        upload.side,
                        upload.company_id,
                        perfs.clone(),
                    )
                    .await?;
                self.queue_cache_update(&upload, perfs);
                war
            }
        };

        Ok(war)
    }

    /// Reverse a committed war, then queue a best-effort cache reset for
    /// the affected (player, class) pairs.
    pub async fn rollback_war(&self, war_id: Uuid) -> Result<()> {
        if self.store.find_war_by_id(war_id).await?.is_none() {
            return Err(Error::NotFound(format!("war {war_id}")));
        }

        let affected = self.store.rollback_war(war_id).await?;
        log::info!(
            "rolled back war {war_id}, {} player-class pairs affected",
            affected.len()
        );

        if !affected.is_empty() {
            let cache = self.cache.clone();
            self.tasks.dispatch("ranking-reset", async move {
                cache.reset_players(&affected).await
            });
        }
        Ok(())
    }

    /// Wars of the last week, newest first.
    pub async fn recent_wars(&self) -> Result<Vec<WarSummary>> {
        const WARS_LIMIT: i64 = 3;
        let since = Utc::now() - Duration::days(7);
        self.store.recent_wars(since, WARS_LIMIT).await
    }

    /// Flatten the upload's party groups, resolve every nickname through
    /// the directory, and score each line. A line whose nickname cannot be
    /// tied back to a resolved player aborts the whole submission.
    async fn resolve_performances(&self, upload: &WarUpload) -> Result<Vec<NewPerformance>> {
        let lines: Vec<&PlayerLine> =
            upload.stats.iter().flat_map(|g| g.players.iter()).collect();
        let nicknames: Vec<String> = lines.iter().map(|l| l.nickname.clone()).collect();

        let resolved = self
            .players
            .upsert_players(&nicknames, upload.world.as_deref())
            .await?;

        lines
            .iter()
            .map(|line| {
                let key = normalize(&line.nickname);
                let player = resolved
                    .iter()
                    .find(|p| p.nick_key == key)
                    .or_else(|| {
                        resolved
                            .iter()
                            .find(|p| same_identity(&p.nick_key, &key, None))
                    })
                    .ok_or_else(|| Error::UnresolvedIdentity(line.nickname.clone()))?;

                Ok(NewPerformance {
                    player_id: player.id,
                    class: line.class.clone(),
                    kills: line.kills,
                    deaths: line.deaths,
                    assists: line.assists,
                    damage: line.damage,
                    healing: line.healing,
                    score: (self.score)(
                        line.kills,
                        line.deaths,
                        line.assists,
                        line.damage,
                        line.healing,
                    ),
                    win: upload.is_winner,
                })
            })
            .collect()
    }

    fn queue_cache_update(&self, upload: &WarUpload, perfs: Vec<NewPerformance>) {
        let raw: Vec<RawPerformance> = perfs
            .into_iter()
            .map(|p| RawPerformance {
                player_id: p.player_id,
                class: p.class,
                world: upload.world.clone(),
                score: p.score,
                kills: p.kills,
                deaths: p.deaths,
                assists: p.assists,
                win: p.win,
            })
            .collect();

        let cache = self.cache.clone();
        self.tasks.dispatch("ranking-update", async move {
            cache.update_batch(raw).await;
            Ok(())
        });
    }
}
