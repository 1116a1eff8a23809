//! Liveness probe over both stores.

use actix_web::{get, web, HttpResponse, Responder};
use redis::{AsyncCommands, Client as RedisClient};
use sqlx::PgPool;

use crate::error::Result;

async fn db_ready(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1").execute(pool).await?;
    Ok(())
}

async fn redis_ready(client: &RedisClient) -> Result<()> {
    let mut conn = client.get_multiplexed_async_connection().await?;
    conn.ping::<String>().await?;
    Ok(())
}

/// GET /api/healthz — 503 names the dependency that is down.
#[get("/healthz")]
pub async fn healthz(db: web::Data<PgPool>, redis: web::Data<RedisClient>) -> impl Responder {
    if let Err(e) = db_ready(&db).await {
        log::warn!("health probe: postgres down: {e}");
        return HttpResponse::ServiceUnavailable().body("db");
    }
    if let Err(e) = redis_ready(&redis).await {
        log::warn!("health probe: redis down: {e}");
        return HttpResponse::ServiceUnavailable().body("redis");
    }
    HttpResponse::Ok().body("ok")
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(healthz);
}
