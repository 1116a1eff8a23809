use actix_web::{middleware::Logger, web, App, HttpServer};
use redis::Client as RedisClient;
use sqlx::postgres::PgPoolOptions;
use std::env;
use std::sync::Arc;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use warboard_server::background::TaskRunner;
use warboard_server::config::settings;
use warboard_server::db::postgres::PgStore;
use warboard_server::db::WarStore;
use warboard_server::leaderboard::LeaderboardService;
use warboard_server::players::PlayerDirectory;
use warboard_server::ranking::redis::RedisRanking;
use warboard_server::ranking::RankingCache;
use warboard_server::scoring;
use warboard_server::war::WarService;
use warboard_server::{http, metrics};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenvy::dotenv().ok();
    env_logger::init();

    // Configuration
    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let redis_url = env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
    let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".into());

    // Postgres pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await
        .expect("Failed to create Postgres pool");

    // Redis client
    let redis_client = RedisClient::open(redis_url.as_str()).expect("Invalid REDIS_URL");

    let store: Arc<dyn WarStore> = {
        let pg = PgStore::new(db_pool.clone());
        pg.migrate().await.expect("schema migration failed");
        Arc::new(pg)
    };

    let cache = Arc::new(RankingCache::new(Arc::new(RedisRanking::new(
        redis_client.clone(),
    ))));

    // Rebuild the ranking cache from stored performances if Redis came up
    // empty. Retried a few times so a slow Redis start does not abort boot.
    {
        let cache = cache.clone();
        let store = store.clone();
        Retry::spawn(FixedInterval::from_millis(2000).take(5), || async {
            cache.recover_if_empty(store.as_ref()).await
        })
        .await
        .expect("ranking cache recovery failed");
    }

    let tasks = TaskRunner::start(settings().task_queue_depth);
    let players = PlayerDirectory::new(store.clone());
    let wars = WarService::new(
        store.clone(),
        players.clone(),
        cache.clone(),
        tasks.clone(),
        scoring::default_score,
    );
    let leaderboards = LeaderboardService::new(cache.clone(), store.clone());

    // Start HTTP server
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .wrap(metrics::METRICS.clone())
            .app_data(web::Data::new(db_pool.clone()))
            .app_data(web::Data::new(redis_client.clone()))
            .app_data(web::Data::new(wars.clone()))
            .app_data(web::Data::new(players.clone()))
            .app_data(web::Data::new(leaderboards.clone()))
            .configure(http::routes::init_routes)
    })
    .bind(&server_addr)?
    .run()
    .await
}
