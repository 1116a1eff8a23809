//! War upload, rollback and recent-wars endpoints.

use actix_web::{delete, get, post, web, HttpResponse};
use uuid::Uuid;

use crate::error::Result;
use crate::war::{WarService, WarUpload};

/// POST /api/wars/upload
#[post("/wars/upload")]
pub async fn upload(
    svc: web::Data<WarService>,
    body: web::Json<WarUpload>,
) -> Result<HttpResponse> {
    let war = svc.upload_war(body.into_inner()).await?;
    Ok(HttpResponse::Created().json(war))
}

/// DELETE /api/wars/rollback/{id}
#[delete("/wars/rollback/{id}")]
pub async fn rollback(svc: web::Data<WarService>, path: web::Path<Uuid>) -> Result<HttpResponse> {
    svc.rollback_war(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// GET /api/wars/recent
#[get("/wars/recent")]
pub async fn recent(svc: web::Data<WarService>) -> Result<HttpResponse> {
    let wars = svc.recent_wars().await?;
    Ok(HttpResponse::Ok().json(wars))
}

pub fn init_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(upload).service(rollback).service(recent);
}
