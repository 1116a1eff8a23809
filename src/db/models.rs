use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Attacker / defender role of one company inside a war.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "side_type", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SideType {
    Attacker,
    Defender,
}

impl SideType {
    pub fn opposite(self) -> SideType {
        match self {
            SideType::Attacker => SideType::Defender,
            SideType::Defender => SideType::Attacker,
        }
    }
}

impl std::fmt::Display for SideType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SideType::Attacker => write!(f, "attacker"),
            SideType::Defender => write!(f, "defender"),
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Player {
    pub id: Uuid,
    /// Raw nickname as first submitted.
    pub nickname: String,
    /// Canonical lookup key ([`crate::nicknames::normalize`]).
    pub nick_key: String,
    /// Server/world tag, when the upload carried one.
    pub world: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PlayerProfile {
    pub player_id: Uuid,
    pub views: i32,
    pub likes: i32,
    /// Class with the most games played, recomputed on every ingest.
    pub main_class: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub faction: String,
    pub world: Option<String>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct War {
    pub id: Uuid,
    pub territory: String,
    pub start_time: DateTime<Utc>,
    pub attacker_id: Uuid,
    pub defender_id: Uuid,
    pub winner: SideType,
    pub world: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WarSide {
    pub id: Uuid,
    pub war_id: Uuid,
    pub company_id: Uuid,
    pub side: SideType,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct PlayerPerformance {
    pub id: Uuid,
    pub war_side_id: Uuid,
    pub player_id: Uuid,
    pub class: String,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub damage: i64,
    pub healing: i64,
    pub score: f64,
    /// Outcome of the side this performance belongs to.
    pub win: bool,
}

/// One line of a player's war history, joined with the war and both
/// companies for display.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct HistoryEntry {
    pub territory: String,
    pub start_time: DateTime<Utc>,
    pub opponent: String,
    pub class: String,
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub damage: i64,
    pub healing: i64,
    pub win: bool,
}

/// Recent-wars feed line with company display data resolved.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct WarSummary {
    pub id: Uuid,
    pub territory: String,
    pub start_time: DateTime<Utc>,
    pub attacker: String,
    pub attacker_faction: String,
    pub defender: String,
    pub defender_faction: String,
    pub winner: SideType,
}
