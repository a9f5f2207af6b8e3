pub mod chatbot;
pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod gemini;
pub mod geocoding;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod state;

use axum::{
    Router,
    response::Html,
    routing::{get, post},
};
use state::AppState;
use tower_http::cors::CorsLayer;

async fn root_handler() -> Html<String> {
    tokio::fs::read_to_string("templates/index.html")
        .await
        .map(Html)
        .unwrap_or_else(|_| Html("<h1>Local Vibe</h1><p>index.html is missing; the API lives under /api.</p>".to_string()))
}

pub fn app(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route("/health", get(handlers::health))
        .route("/api/users/login", post(handlers::login_or_register_user))
        .route(
            "/api/users/{user_id}/preferences",
            get(handlers::get_preferences).put(handlers::update_preferences),
        )
        .route(
            "/api/users/{user_id}/location",
            get(handlers::get_location).put(handlers::update_location),
        )
        .route("/api/users/{user_id}/events", get(handlers::get_my_events))
        .route("/api/users/{user_id}/feed", get(handlers::get_feed))
        .route(
            "/api/users/{user_id}/chat",
            get(handlers::get_chat)
                .post(handlers::send_chat_message)
                .delete(handlers::clear_chat),
        )
        .route(
            "/api/events",
            get(handlers::get_events).post(handlers::create_event_handler),
        )
        .route("/api/events/filter", get(handlers::filter_events))
        .route("/api/events/{event_id}", get(handlers::get_event))
        .route("/api/geocode/search", get(handlers::geocode_search))
        .route("/api/geocode/reverse", get(handlers::geocode_reverse))
        .route("/api/discover", get(handlers::discover_events))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}
