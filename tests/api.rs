use anyhow::Result;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::{Local, SecondsFormat};
use localvibe::{config::Config, db, state::AppState};
use serde_json::{Value, json};
use sqlx::sqlite::SqlitePoolOptions;
use tower::ServiceExt;

async fn test_app() -> Result<Router> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    db::init_schema(&pool).await?;
    // Unreachable endpoints: nothing in these tests may touch the network.
    let mut config = Config::with_database("sqlite::memory:");
    config.nominatim_endpoint = "http://127.0.0.1:9".to_string();
    config.gemini_endpoint = "http://127.0.0.1:9".to_string();
    Ok(localvibe::app(AppState::new(pool, &config)))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> Result<(StatusCode, Value)> {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body)?))?,
        None => builder.body(Body::empty())?,
    };
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, value))
}

async fn login(app: &Router, name: &str) -> Result<i64> {
    let (status, body) = send(app, Method::POST, "/api/users/login", Some(json!({ "name": name }))).await?;
    assert_eq!(status, StatusCode::OK);
    Ok(body["user"]["id"].as_i64().unwrap())
}

fn now_rfc3339() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

async fn add_event(app: &Router, user_id: i64, title: &str, is_free: bool, category: &str) -> Result<Value> {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/events",
        Some(json!({
            "userId": user_id,
            "title": title,
            "description": format!("{title} in the old town"),
            "date": now_rfc3339(),
            "isFree": is_free,
            "category": category,
            "organizer": "Local Vibe",
            "phoneNumber": "0712345678",
            "position": { "lat": 44.4300, "lng": 26.1000 }
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    Ok(body)
}

#[tokio::test]
async fn health_reports_ok() -> Result<()> {
    let app = test_app().await?;
    let (status, body) = send(&app, Method::GET, "/health", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    Ok(())
}

#[tokio::test]
async fn root_serves_the_index_page_and_nothing_under_assets() -> Result<()> {
    let app = test_app().await?;
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    assert!(String::from_utf8_lossy(&bytes).contains("Local Vibe"));

    let (status, _) = send(&app, Method::GET, "/assets/app.css", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn login_creates_then_finds_user() -> Result<()> {
    let app = test_app().await?;
    let (_, first) = send(&app, Method::POST, "/api/users/login", Some(json!({ "name": "ana" }))).await?;
    let (_, second) = send(&app, Method::POST, "/api/users/login", Some(json!({ "name": "ana" }))).await?;
    assert_eq!(first["status"], "Created");
    assert_eq!(second["status"], "Exists");
    assert_eq!(first["user"]["id"], second["user"]["id"]);

    let (status, _) = send(&app, Method::POST, "/api/users/login", Some(json!({ "name": "  " }))).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn event_creation_validates_input() -> Result<()> {
    let app = test_app().await?;
    let user_id = login(&app, "ana").await?;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/events",
        Some(json!({
            "userId": user_id,
            "title": "No phone",
            "description": "d",
            "date": now_rfc3339(),
            "organizer": "o",
            "phoneNumber": "",
            "position": { "lat": 44.43, "lng": 26.1 }
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "phoneNumber is required");

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/events",
        Some(json!({
            "userId": 4242,
            "title": "t",
            "description": "d",
            "date": now_rfc3339(),
            "organizer": "o",
            "phoneNumber": "1",
            "position": { "lat": 44.43, "lng": 26.1 }
        })),
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn created_events_are_listed_and_owned() -> Result<()> {
    let app = test_app().await?;
    let user_id = login(&app, "ana").await?;
    let created = add_event(&app, user_id, "Jazz Night", true, "Music").await?;
    assert_eq!(created["imageUrl"], "https://picsum.photos/seed/Jazz/400/300");
    assert_eq!(created["ownerName"], "ana");

    let id = created["id"].as_str().unwrap();
    let (status, fetched) = send(&app, Method::GET, &format!("/api/events/{id}"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["title"], "Jazz Night");

    let (_, mine) = send(&app, Method::GET, &format!("/api/users/{user_id}/events"), None).await?;
    assert_eq!(mine.as_array().map(Vec::len), Some(1));

    let (status, _) = send(&app, Method::GET, "/api/events/nope", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn feed_applies_price_and_date_filters() -> Result<()> {
    let app = test_app().await?;
    let user_id = login(&app, "ana").await?;
    add_event(&app, user_id, "Jazz Night", true, "Music").await?;

    let (status, free) = send(
        &app,
        Method::GET,
        &format!("/api/users/{user_id}/feed?price=free&date=today"),
        None,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let free = free.as_array().unwrap();
    assert_eq!(free.len(), 1);
    assert!(free[0]["distance"].as_f64().unwrap() < 1.0);

    let (_, paid) = send(&app, Method::GET, &format!("/api/users/{user_id}/feed?price=paid"), None).await?;
    assert_eq!(paid, json!([]));
    Ok(())
}

#[tokio::test]
async fn feed_respects_preferences() -> Result<()> {
    let app = test_app().await?;
    let user_id = login(&app, "ana").await?;
    add_event(&app, user_id, "Gallery Opening", true, "Art").await?;
    add_event(&app, user_id, "Board Games", true, "Games").await?;

    // "Games" is not among the initial genres
    let (_, feed) = send(&app, Method::GET, &format!("/api/users/{user_id}/feed"), None).await?;
    assert_eq!(feed.as_array().map(Vec::len), Some(1));
    assert_eq!(feed[0]["title"], "Gallery Opening");

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/users/{user_id}/preferences"),
        Some(json!({ "maxDistance": 100.0, "genrePreferences": [] })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let (_, feed) = send(&app, Method::GET, &format!("/api/users/{user_id}/feed"), None).await?;
    assert_eq!(feed.as_array().map(Vec::len), Some(2));

    // Move the viewer to Cluj, far outside the radius
    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/users/{user_id}/location"),
        Some(json!({ "lat": 46.7712, "lng": 23.6236, "address": "Cluj-Napoca" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    let (_, feed) = send(&app, Method::GET, &format!("/api/users/{user_id}/feed"), None).await?;
    assert_eq!(feed, json!([]));

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/users/{user_id}/preferences"),
        Some(json!({ "maxDistance": -1.0 })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn stateless_filter_honours_suggestions() -> Result<()> {
    let app = test_app().await?;
    let user_id = login(&app, "ana").await?;
    let jazz = add_event(&app, user_id, "Jazz Night", true, "Music").await?;
    add_event(&app, user_id, "Opera Gala", false, "Theater").await?;

    let (_, all) = send(&app, Method::GET, "/api/events/filter", None).await?;
    assert_eq!(all.as_array().map(Vec::len), Some(2));

    let (_, search) = send(&app, Method::GET, "/api/events/filter?search=OPERA", None).await?;
    assert_eq!(search.as_array().map(Vec::len), Some(1));
    assert_eq!(search[0]["title"], "Opera Gala");

    let (_, genres) = send(&app, Method::GET, "/api/events/filter?genres=Music,Art", None).await?;
    assert_eq!(genres.as_array().map(Vec::len), Some(1));

    let id = jazz["id"].as_str().unwrap();
    let (_, overridden) = send(
        &app,
        Method::GET,
        &format!("/api/events/filter?price=paid&search=zzz&suggested={id}"),
        None,
    )
    .await?;
    assert_eq!(overridden.as_array().map(Vec::len), Some(1));
    assert_eq!(overridden[0]["id"], id);
    Ok(())
}

#[tokio::test]
async fn chat_without_api_key_degrades_gracefully() -> Result<()> {
    let app = test_app().await?;
    let user_id = login(&app, "ana").await?;

    let (status, history) = send(&app, Method::GET, &format!("/api/users/{user_id}/chat"), None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history["messages"].as_array().map(Vec::len), Some(1));

    let (status, reply) = send(
        &app,
        Method::POST,
        &format!("/api/users/{user_id}/chat"),
        Some(json!({ "message": "something relaxing" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(reply["filterActive"], false);
    assert_eq!(reply["message"]["role"], "model");
    assert_eq!(reply["message"]["content"], localvibe::gemini::MSG_NOT_CONFIGURED);

    let (status, _) = send(&app, Method::DELETE, &format!("/api/users/{user_id}/chat"), None).await?;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, history) = send(&app, Method::GET, &format!("/api/users/{user_id}/chat"), None).await?;
    assert_eq!(history["messages"].as_array().map(Vec::len), Some(1));

    let (status, _) = send(&app, Method::GET, "/api/users/999/chat", None).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn discovery_without_api_key_fails() -> Result<()> {
    let app = test_app().await?;
    let (status, body) = send(&app, Method::GET, "/api/discover", None).await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["success"], false);
    Ok(())
}

#[tokio::test]
async fn reverse_geocoding_falls_back_to_coordinates() -> Result<()> {
    let app = test_app().await?;
    let (status, body) = send(&app, Method::GET, "/api/geocode/reverse?lat=44.4268&lng=26.1025", None).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["address"], Value::Null);
    assert_eq!(body["label"], "44.4268, 26.1025");

    let (status, _) = send(&app, Method::GET, "/api/geocode/reverse?lat=123&lng=0", None).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}
