use std::sync::Arc;

use actix_web::{test, web, App};
use serde_json::json;
use uuid::Uuid;
use warboard_server::background::TaskRunner;
use warboard_server::db::memory::MemStore;
use warboard_server::http;
use warboard_server::leaderboard::LeaderboardService;
use warboard_server::players::PlayerDirectory;
use warboard_server::ranking::memory::MemRanking;
use warboard_server::ranking::RankingCache;
use warboard_server::scoring;
use warboard_server::war::WarService;

struct Ctx {
    wars: WarService,
    players: PlayerDirectory,
    leaderboards: LeaderboardService,
    tasks: TaskRunner,
}

fn ctx() -> Ctx {
    let store: Arc<MemStore> = Arc::new(MemStore::new());
    let cache = Arc::new(RankingCache::new(Arc::new(MemRanking::new())));
    let tasks = TaskRunner::start(64);
    let players = PlayerDirectory::new(store.clone());
    let wars = WarService::new(
        store.clone(),
        players.clone(),
        cache.clone(),
        tasks.clone(),
        scoring::default_score,
    );
    let leaderboards = LeaderboardService::new(cache, store);
    Ctx {
        wars,
        players,
        leaderboards,
        tasks,
    }
}

macro_rules! app {
    ($ctx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($ctx.wars.clone()))
                .app_data(web::Data::new($ctx.players.clone()))
                .app_data(web::Data::new($ctx.leaderboards.clone()))
                .configure(|cfg| {
                    cfg.service(
                        web::scope("/api")
                            .configure(http::wars::init_routes)
                            .configure(http::leaderboard::init_routes)
                            .configure(http::players::init_routes),
                    );
                }),
        )
        .await
    };
}

fn upload_body(company: Uuid, opponent: Uuid) -> serde_json::Value {
    json!({
        "territory": "Windsward",
        "start_time": "2024-03-01T20:00:00Z",
        "company_id": company,
        "opponent_id": opponent,
        "side": "attacker",
        "is_winner": true,
        "world": "Aaru",
        "stats": [{
            "name": "Group 1",
            "players": [{
                "nickname": "Alice",
                "class": "musket",
                "kills": 10,
                "deaths": 2,
                "assists": 4,
                "damage": 50000,
                "healing": 0
            }]
        }]
    })
}

#[actix_rt::test]
async fn upload_then_read_leaderboard() {
    let ctx = ctx();
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/wars/upload")
        .set_json(upload_body(Uuid::new_v4(), Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);

    ctx.tasks.flush().await;

    let req = test::TestRequest::get()
        .uri("/api/leaderboard/mostkills?class=musket")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["nickname"], "Alice");
    assert_eq!(body["data"][0]["value"], 10.0);
}

#[actix_rt::test]
async fn self_war_maps_to_bad_request() {
    let ctx = ctx();
    let app = app!(ctx);
    let company = Uuid::new_v4();

    let req = test::TestRequest::post()
        .uri("/api/wars/upload")
        .set_json(upload_body(company, company))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_rt::test]
async fn duplicate_upload_maps_to_conflict() {
    let ctx = ctx();
    let app = app!(ctx);
    let (a, b) = (Uuid::new_v4(), Uuid::new_v4());

    let req = test::TestRequest::post()
        .uri("/api/wars/upload")
        .set_json(upload_body(a, b))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let req = test::TestRequest::post()
        .uri("/api/wars/upload")
        .set_json(upload_body(a, b))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 409);
}

#[actix_rt::test]
async fn unknown_metric_maps_to_bad_request() {
    let ctx = ctx();
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/leaderboard/bogus")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 400);
}

#[actix_rt::test]
async fn player_lookup_and_search() {
    let ctx = ctx();
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/wars/upload")
        .set_json(upload_body(Uuid::new_v4(), Uuid::new_v4()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);

    let req = test::TestRequest::get()
        .uri("/api/players/alice")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["nickname"], "Alice");

    let req = test::TestRequest::get()
        .uri("/api/players/search?query=ali")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["total"], 1);

    let req = test::TestRequest::get()
        .uri("/api/players/nobody")
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}

#[actix_rt::test]
async fn player_class_stats_and_rank_endpoints() {
    let ctx = ctx();
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/wars/upload")
        .set_json(upload_body(Uuid::new_v4(), Uuid::new_v4()))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 201);
    ctx.tasks.flush().await;

    let req = test::TestRequest::get()
        .uri("/api/players/alice")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let id = body["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::get()
        .uri(&format!("/api/players/{id}/class/musket/stats"))
        .to_request();
    let stats: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(stats["games_played"], 1);

    let req = test::TestRequest::get()
        .uri(&format!("/api/players/{id}/class/musket/rank"))
        .to_request();
    let rank: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(rank["rank"], 1);

    // an unknown class reads back as null, not an error
    let req = test::TestRequest::get()
        .uri(&format!("/api/players/{id}/class/bow/stats"))
        .to_request();
    let stats: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert!(stats.is_null());
}

#[actix_rt::test]
async fn rollback_round_trip() {
    let ctx = ctx();
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/wars/upload")
        .set_json(upload_body(Uuid::new_v4(), Uuid::new_v4()))
        .to_request();
    let war: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let war_id = war["id"].as_str().unwrap().to_string();

    let req = test::TestRequest::delete()
        .uri(&format!("/api/wars/rollback/{war_id}"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 204);

    // rolling back twice is a 404
    let req = test::TestRequest::delete()
        .uri(&format!("/api/wars/rollback/{war_id}"))
        .to_request();
    assert_eq!(test::call_service(&app, req).await.status(), 404);
}
