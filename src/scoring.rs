//! War-performance scoring.
//!
//! The score feeds the average-score leaderboard and the per-performance
//! records; the ingestion pipeline takes the function as a parameter so
//! deployments can swap the formula without touching the pipeline.

/// Signature of a performance scorer: kills, deaths, assists, damage, healing.
pub type ScoreFn = fn(u32, u32, u32, u64, u64) -> f64;

/// Default formula: kills weigh double assists, deaths subtract, and raw
/// damage/healing contribute one point per thousand. Floored at zero.
pub fn default_score(kills: u32, deaths: u32, assists: u32, damage: u64, healing: u64) -> f64 {
    let combat = kills as f64 * 10.0 + assists as f64 * 5.0 - deaths as f64 * 5.0;
    let output = (damage as f64 + healing as f64) / 1000.0;
    (combat + output).max(0.0)
}
