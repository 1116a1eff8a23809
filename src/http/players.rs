//! Player lookup, search and per-class breakdowns.

use actix_web::{get, web, HttpResponse};
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::players::PlayerDirectory;

#[derive(Deserialize)]
pub struct SearchParams {
    pub query: Option<String>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    10
}

/// GET /api/players/search?query=...
#[get("/players/search")]
pub async fn search(
    dir: web::Data<PlayerDirectory>,
    web::Query(params): web::Query<SearchParams>,
) -> Result<HttpResponse> {
    let page = dir
        .search(params.query.as_deref(), params.page, params.limit)
        .await?;
    Ok(HttpResponse::Ok().json(page))
}

/// GET /api/players/{nickname}
#[get("/players/{nickname}")]
pub async fn lookup(
    dir: web::Data<PlayerDirectory>,
    path: web::Path<String>,
) -> Result<HttpResponse> {
    let nickname = path.into_inner();
    let view = dir
        .find_by_nickname(&nickname)
        .await?
        .ok_or_else(|| Error::NotFound(format!("player '{nickname}'")))?;
    Ok(HttpResponse::Ok().json(view))
}

/// GET /api/players/{nickname}/class/{class} — authoritative stats with
/// war history, straight from the relational store.
#[get("/players/{nickname}/class/{class}")]
pub async fn class_breakdown(
    dir: web::Data<PlayerDirectory>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse> {
    let (nickname, class) = path.into_inner();
    let breakdown = dir.class_breakdown(&nickname, &class).await?;
    Ok(HttpResponse::Ok().json(breakdown))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    // `search` before `{nickname}` so the literal segment wins.
    cfg.service(search).service(lookup).service(class_breakdown);
}
