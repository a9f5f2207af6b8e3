use chrono::Local;
use localvibe::{config::Config, db, logging, state::AppState};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::str::FromStr;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().unwrap_or_else(|e| panic!("{e}"));
    if let Err(e) = logging::init_logger(config.log_file_path.as_deref()) {
        eprintln!("failed to initialize logger: {e}");
    }

    let connect_options = SqliteConnectOptions::from_str(&config.database_url)
        .expect("failed to parse DATABASE_URL")
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await
        .expect("failed to connect to db");

    db::init_schema(&pool)
        .await
        .expect("failed to create tables");

    if let Err(e) = db::seed_if_empty(&pool, Local::now().fixed_offset()).await {
        log::error!("failed to seed sample event: {}", e);
    }

    if config.gemini_api_key.is_none() {
        log::warn!("GEMINI_API_KEY is not set; chat and discovery will answer with fallbacks");
    }

    let app = localvibe::app(AppState::new(pool, &config));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind listener");
    log::info!("listening on {}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        log::error!("server error: {}", e);
    }
}
