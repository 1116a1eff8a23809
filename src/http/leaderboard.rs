//! Ranked leaderboard reads and per-player cache stats.

use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::error::Result;
use crate::leaderboard::LeaderboardService;
use crate::ranking::Metric;

#[derive(Deserialize)]
pub struct LeaderboardParams {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
    pub world: Option<String>,
    pub class: Option<String>,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

/// GET /api/leaderboard/{metric}
///
/// `metric` is one of winrate, mostwins, leastdeaths, mostkills,
/// mostassists, averagescore.
#[get("/leaderboard/{metric}")]
pub async fn leaderboard(
    svc: web::Data<LeaderboardService>,
    path: web::Path<String>,
    web::Query(params): web::Query<LeaderboardParams>,
) -> Result<HttpResponse> {
    let metric: Metric = path.into_inner().parse()?;
    let page = svc
        .get_leaderboard(
            metric,
            params.page,
            params.limit,
            params.world.as_deref(),
            params.class.as_deref(),
        )
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /api/players/{id}/class/{class}/stats — cached aggregates.
#[get("/players/{id}/class/{class}/stats")]
pub async fn player_stats(
    svc: web::Data<LeaderboardService>,
    path: web::Path<(Uuid, String)>,
) -> Result<HttpResponse> {
    let (player_id, class) = path.into_inner();
    match svc.get_player_stats(player_id, &class).await? {
        Some(stats) => Ok(HttpResponse::Ok().json(stats)),
        None => Ok(HttpResponse::Ok().json(json!(null))),
    }
}

/// GET /api/players/{id}/class/{class}/rank — overall rank by average
/// score within the class.
#[get("/players/{id}/class/{class}/rank")]
pub async fn player_rank(
    svc: web::Data<LeaderboardService>,
    path: web::Path<(Uuid, String)>,
) -> Result<HttpResponse> {
    let (player_id, class) = path.into_inner();
    let rank = svc.get_overall_rank(player_id, &class).await?;
    Ok(HttpResponse::Ok().json(json!({ "rank": rank })))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(leaderboard)
        .service(player_stats)
        .service(player_rank);
}
