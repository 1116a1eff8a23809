//! Relational persistence boundary.
//!
//! [`WarStore`] is the full contract the pipeline needs from the
//! authoritative store: entity lookups plus the three transactional
//! operations (create war, attach side, rollback). [`postgres::PgStore`] is
//! the production implementation; [`memory::MemStore`] backs the test suite
//! and local development.

pub mod memory;
pub mod models;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::ranking::{PlayerClassRef, RawPerformance};
use models::{
    Company, HistoryEntry, Player, PlayerProfile, SideType, War, WarSide, WarSummary,
};

/// Player row to be created (nickname as submitted, canonical key).
#[derive(Debug, Clone)]
pub struct NewPlayer {
    pub nickname: String,
    pub nick_key: String,
    pub world: Option<String>,
}

/// Performance row to be created under a new war side.
#[derive(Debug, Clone)]
pub struct NewPerformance {
    pub player_id: Uuid,
    pub class: String,
    pub kills: u32,
    pub deaths: u32,
    pub assists: u32,
    pub damage: u64,
    pub healing: u64,
    pub score: f64,
    pub win: bool,
}

/// War row to be created together with its first side.
#[derive(Debug, Clone)]
pub struct NewWar {
    pub territory: String,
    pub start_time: DateTime<Utc>,
    pub attacker_id: Uuid,
    pub defender_id: Uuid,
    pub winner: SideType,
    pub world: Option<String>,
}

#[async_trait]
pub trait WarStore: Send + Sync {
    // ── players ──────────────────────────────────────────────────────
    async fn all_players(&self) -> Result<Vec<Player>>;
    /// Insert players (deduplicated on the canonical key) together with
    /// empty profile rows. Returns the stored rows for the given keys,
    /// whether freshly created or pre-existing.
    async fn create_players(&self, players: Vec<NewPlayer>) -> Result<Vec<Player>>;
    async fn find_player_by_key(&self, key: &str) -> Result<Option<Player>>;
    async fn find_player_by_id(&self, id: Uuid) -> Result<Option<Player>>;
    async fn find_players_by_ids(&self, ids: &[Uuid]) -> Result<Vec<Player>>;
    async fn profile_of(&self, player_id: Uuid) -> Result<Option<PlayerProfile>>;

    // ── companies ────────────────────────────────────────────────────
    /// Upsert company display data. Wars reference companies by id only;
    /// a missing row just degrades the feeds to showing the raw id.
    async fn create_company(&self, company: Company) -> Result<()>;

    // ── wars ─────────────────────────────────────────────────────────
    async fn find_war(&self, territory: &str, start_time: DateTime<Utc>) -> Result<Option<War>>;
    async fn find_war_by_id(&self, id: Uuid) -> Result<Option<War>>;
    async fn sides_of(&self, war_id: Uuid) -> Result<Vec<WarSide>>;
    /// Create war + first side + performances + class counts + main-class
    /// recompute in one transaction.
    async fn create_war(
        &self,
        war: NewWar,
        side: SideType,
        company_id: Uuid,
        perfs: Vec<NewPerformance>,
    ) -> Result<War>;
    /// Attach the second side to an existing war; same atomic unit as
    /// [`create_war`](Self::create_war). The (war, company) and (war, side)
    /// unique constraints are the backstop for racing submissions.
    async fn attach_side(
        &self,
        war_id: Uuid,
        side: SideType,
        company_id: Uuid,
        perfs: Vec<NewPerformance>,
    ) -> Result<War>;
    /// Delete the war, its sides and performances atomically; returns the
    /// affected (player, class) pairs for the cache reset. Players still
    /// referenced by other wars survive with decremented class counts.
    async fn rollback_war(&self, war_id: Uuid) -> Result<Vec<PlayerClassRef>>;

    // ── read side ────────────────────────────────────────────────────
    async fn count_performances(&self) -> Result<i64>;
    /// Every performance on record, for the cache recovery scan.
    async fn all_performances(&self) -> Result<Vec<RawPerformance>>;
    async fn history_of_player_class(
        &self,
        player_id: Uuid,
        class: &str,
    ) -> Result<Vec<HistoryEntry>>;
    async fn recent_wars(&self, since: DateTime<Utc>, limit: i64) -> Result<Vec<WarSummary>>;
}
