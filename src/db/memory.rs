//! In-memory relational store for tests and single-process development.
//!
//! One mutex over the whole table set, so the multi-table writes stay as
//! atomic as the Postgres transactions they stand in for. Enforces the same
//! unique constraints: (territory, start_time) on wars, (war, company) and
//! (war, side) on war sides, nick_key on players.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::models::{
    Company, HistoryEntry, Player, PlayerPerformance, PlayerProfile, SideType, War, WarSide,
    WarSummary,
};
use super::{NewPerformance, NewPlayer, NewWar, WarStore};
use crate::error::{Error, Result};
use crate::ranking::{PlayerClassRef, RawPerformance};

#[derive(Default)]
struct Tables {
    players: HashMap<Uuid, Player>,
    profiles: HashMap<Uuid, PlayerProfile>,
    companies: HashMap<Uuid, Company>,
    wars: HashMap<Uuid, War>,
    sides: HashMap<Uuid, WarSide>,
    perfs: HashMap<Uuid, PlayerPerformance>,
    class_counts: HashMap<(Uuid, String), i32>,
}

impl Tables {
    fn insert_performances(
        &mut self,
        side_id: Uuid,
        perfs: Vec<NewPerformance>,
    ) -> Result<()> {
        for p in perfs {
            if !self.players.contains_key(&p.player_id) {
                return Err(Error::Store(format!("no such player {}", p.player_id)));
            }
            let perf_id = Uuid::new_v4();
            self.perfs.insert(
                perf_id,
                PlayerPerformance {
                    id: perf_id,
                    war_side_id: side_id,
                    player_id: p.player_id,
                    class: p.class.clone(),
                    kills: p.kills as i32,
                    deaths: p.deaths as i32,
                    assists: p.assists as i32,
                    damage: p.damage as i64,
                    healing: p.healing as i64,
                    score: p.score,
                    win: p.win,
                },
            );
            *self
                .class_counts
                .entry((p.player_id, p.class.clone()))
                .or_insert(0) += 1;
            self.recompute_main_class(p.player_id);
        }
        Ok(())
    }

    fn recompute_main_class(&mut self, player_id: Uuid) {
        let top = self
            .class_counts
            .iter()
            .filter(|((pid, _), _)| *pid == player_id)
            .max_by(|a, b| a.1.cmp(b.1).then_with(|| b.0 .1.cmp(&a.0 .1)))
            .map(|((_, class), _)| class.clone());
        if let Some(profile) = self.profiles.get_mut(&player_id) {
            profile.main_class = top;
        }
    }

    fn attach_side_checked(
        &mut self,
        war_id: Uuid,
        side: SideType,
        company_id: Uuid,
        perfs: Vec<NewPerformance>,
    ) -> Result<()> {
        let clash = self
            .sides
            .values()
            .any(|s| s.war_id == war_id && (s.company_id == company_id || s.side == side));
        if clash {
            return Err(Error::Conflict(format!(
                "war {war_id} already has a {side} side or this company"
            )));
        }
        let side_id = Uuid::new_v4();
        self.sides.insert(
            side_id,
            WarSide {
                id: side_id,
                war_id,
                company_id,
                side,
            },
        );
        self.insert_performances(side_id, perfs)
    }
}

#[derive(Default)]
pub struct MemStore {
    tables: Mutex<Tables>,
}

impl MemStore {
    pub fn new() -> Self {
        MemStore::default()
    }
}

#[async_trait]
impl WarStore for MemStore {
    async fn all_players(&self) -> Result<Vec<Player>> {
        let t = self.tables.lock().await;
        Ok(t.players.values().cloned().collect())
    }

    async fn create_players(&self, players: Vec<NewPlayer>) -> Result<Vec<Player>> {
        let mut t = self.tables.lock().await;
        let mut out = Vec::new();
        for p in players {
            let existing = t
                .players
                .values()
                .find(|e| e.nick_key == p.nick_key)
                .cloned();
            let row = match existing {
                Some(row) => row,
                None => {
                    let id = Uuid::new_v4();
                    let row = Player {
                        id,
                        nickname: p.nickname,
                        nick_key: p.nick_key,
                        world: p.world,
                        created_at: Utc::now(),
                    };
                    t.players.insert(id, row.clone());
                    t.profiles.insert(
                        id,
                        PlayerProfile {
                            player_id: id,
                            views: 0,
                            likes: 0,
                            main_class: None,
                        },
                    );
                    row
                }
            };
            out.push(row);
        }
        Ok(out)
    }

    async fn find_player_by_key(&self, key: &str) -> Result<Option<Player>> {
        let t = self.tables.lock().await;
        Ok(t.players.values().find(|p| p.nick_key == key).cloned())
    }

    async fn find_player_by_id(&self, id: Uuid) -> Result<Option<Player>> {
        let t = self.tables.lock().await;
        Ok(t.players.get(&id).cloned())
    }

    async fn find_players_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Player>> {
        let t = self.tables.lock().await;
        Ok(ids.iter().filter_map(|id| t.players.get(id).cloned()).collect())
    }

    async fn profile_of(&self, player_id: Uuid) -> Result<Option<PlayerProfile>> {
        let t = self.tables.lock().await;
        Ok(t.profiles.get(&player_id).cloned())
    }

    async fn create_company(&self, company: Company) -> Result<()> {
        let mut t = self.tables.lock().await;
        t.companies.insert(company.id, company);
        Ok(())
    }

    async fn find_war(&self, territory: &str, start_time: DateTime<Utc>) -> Result<Option<War>> {
        let t = self.tables.lock().await;
        Ok(t.wars
            .values()
            .find(|w| w.territory == territory && w.start_time == start_time)
            .cloned())
    }

    async fn find_war_by_id(&self, id: Uuid) -> Result<Option<War>> {
        let t = self.tables.lock().await;
        Ok(t.wars.get(&id).cloned())
    }

    async fn sides_of(&self, war_id: Uuid) -> Result<Vec<WarSide>> {
        let t = self.tables.lock().await;
        Ok(t.sides.values().filter(|s| s.war_id == war_id).cloned().collect())
    }

    async fn create_war(
        &self,
        war: NewWar,
        side: SideType,
        company_id: Uuid,
        perfs: Vec<NewPerformance>,
    ) -> Result<War> {
        let mut t = self.tables.lock().await;
        if t.wars
            .values()
            .any(|w| w.territory == war.territory && w.start_time == war.start_time)
        {
            return Err(Error::Conflict(format!(
                "war for {} at {} already exists",
                war.territory, war.start_time
            )));
        }
        let id = Uuid::new_v4();
        let row = War {
            id,
            territory: war.territory,
            start_time: war.start_time,
            attacker_id: war.attacker_id,
            defender_id: war.defender_id,
            winner: war.winner,
            world: war.world,
            created_at: Utc::now(),
        };
        t.wars.insert(id, row.clone());
        t.attach_side_checked(id, side, company_id, perfs)?;
        Ok(row)
    }

    async fn attach_side(
        &self,
        war_id: Uuid,
        side: SideType,
        company_id: Uuid,
        perfs: Vec<NewPerformance>,
    ) -> Result<War> {
        let mut t = self.tables.lock().await;
        let war = t
            .wars
            .get(&war_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("war {war_id}")))?;
        t.attach_side_checked(war_id, side, company_id, perfs)?;
        Ok(war)
    }

    async fn rollback_war(&self, war_id: Uuid) -> Result<Vec<PlayerClassRef>> {
        let mut t = self.tables.lock().await;
        if !t.wars.contains_key(&war_id) {
            return Err(Error::NotFound(format!("war {war_id}")));
        }

        let side_ids: Vec<Uuid> = t
            .sides
            .values()
            .filter(|s| s.war_id == war_id)
            .map(|s| s.id)
            .collect();

        // (player, class) -> games rolled back
        let mut rolled: HashMap<(Uuid, String), i32> = HashMap::new();
        let perf_ids: Vec<Uuid> = t
            .perfs
            .iter()
            .filter(|(_, p)| side_ids.contains(&p.war_side_id))
            .map(|(id, p)| {
                *rolled.entry((p.player_id, p.class.clone())).or_insert(0) += 1;
                *id
            })
            .collect();

        for id in perf_ids {
            t.perfs.remove(&id);
        }
        for id in side_ids {
            t.sides.remove(&id);
        }
        t.wars.remove(&war_id);

        let affected_players: Vec<Uuid> = {
            let mut ids: Vec<Uuid> = rolled.keys().map(|(pid, _)| *pid).collect();
            ids.sort();
            ids.dedup();
            ids
        };

        for ((player_id, class), games) in &rolled {
            if let Some(count) = t.class_counts.get_mut(&(*player_id, class.clone())) {
                *count -= games;
                if *count <= 0 {
                    t.class_counts.remove(&(*player_id, class.clone()));
                }
            }
        }

        for player_id in affected_players {
            let survives = t.perfs.values().any(|p| p.player_id == player_id);
            if survives {
                t.recompute_main_class(player_id);
            } else {
                t.players.remove(&player_id);
                t.profiles.remove(&player_id);
                t.class_counts.retain(|(pid, _), _| *pid != player_id);
            }
        }

        Ok(rolled
            .into_keys()
            .map(|(player_id, class)| PlayerClassRef { player_id, class })
            .collect())
    }

    async fn count_performances(&self) -> Result<i64> {
        let t = self.tables.lock().await;
        Ok(t.perfs.len() as i64)
    }

    async fn all_performances(&self) -> Result<Vec<RawPerformance>> {
        let t = self.tables.lock().await;
        Ok(t.perfs
            .values()
            .map(|p| RawPerformance {
                player_id: p.player_id,
                class: p.class.clone(),
                world: t.players.get(&p.player_id).and_then(|pl| pl.world.clone()),
                score: p.score,
                kills: p.kills as u32,
                deaths: p.deaths as u32,
                assists: p.assists as u32,
                win: p.win,
            })
            .collect())
    }

    async fn history_of_player_class(
        &self,
        player_id: Uuid,
        class: &str,
    ) -> Result<Vec<HistoryEntry>> {
        let t = self.tables.lock().await;
        let mut entries: Vec<HistoryEntry> = t
            .perfs
            .values()
            .filter(|p| p.player_id == player_id && p.class == class)
            .filter_map(|p| {
                let side = t.sides.get(&p.war_side_id)?;
                let war = t.wars.get(&side.war_id)?;
                let opponent_id = match side.side {
                    SideType::Attacker => war.defender_id,
                    SideType::Defender => war.attacker_id,
                };
                let opponent = t
                    .companies
                    .get(&opponent_id)
                    .map(|c| c.name.clone())
                    .unwrap_or_else(|| opponent_id.to_string());
                Some(HistoryEntry {
                    territory: war.territory.clone(),
                    start_time: war.start_time,
                    opponent,
                    class: p.class.clone(),
                    kills: p.kills,
                    deaths: p.deaths,
                    assists: p.assists,
                    damage: p.damage,
                    healing: p.healing,
                    win: p.win,
                })
            })
            .collect();
        entries.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(entries)
    }

    async fn recent_wars(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<WarSummary>> {
        let t = self.tables.lock().await;
        let mut wars: Vec<&War> = t.wars.values().filter(|w| w.start_time >= since).collect();
        wars.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(wars
            .into_iter()
            .take(limit.max(0) as usize)
            .map(|w| {
                let name = |id: Uuid| {
                    t.companies
                        .get(&id)
                        .map(|c| (c.name.clone(), c.faction.clone()))
                        .unwrap_or_else(|| (id.to_string(), String::new()))
                };
                let (attacker, attacker_faction) = name(w.attacker_id);
                let (defender, defender_faction) = name(w.defender_id);
                WarSummary {
                    id: w.id,
                    territory: w.territory.clone(),
                    start_time: w.start_time,
                    attacker,
                    attacker_faction,
                    defender,
                    defender_faction,
                    winner: w.winner,
                }
            })
            .collect())
    }
}
