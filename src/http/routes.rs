use crate::http;
use actix_web::web;

/// Mount every HTTP sub-module under `/api`.
pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api")
            .configure(http::wars::init_routes)
            .configure(http::leaderboard::init_routes)
            .configure(http::players::init_routes)
            .configure(http::health::init_routes),
    );
}
