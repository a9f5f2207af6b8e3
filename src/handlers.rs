use crate::{
    db,
    error::AppError,
    filter::{self, FilterContext},
    geocoding::{GeocodingResult, coordinate_label},
    models::{
        ChatMessage, DateFilter, DiscoveredEvent, Event, Filters, NewEvent, Position, Preferences,
        PriceFilter, User, UserLocation,
    },
    state::AppState,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, FixedOffset, Local, NaiveDate, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

const DEFAULT_CATEGORY: &str = "Music";
const DEFAULT_SUGGESTION_LIMIT: usize = 8;

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn split_list(raw: Option<&str>) -> Vec<String> {
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Accepts RFC 3339 timestamps, or a bare `YYYY-MM-DDTHH:MM[:SS]` read as
/// server local time (what a datetime-local form field sends).
pub fn parse_event_date(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date);
    }
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|date| date.fixed_offset())
}

async fn require_user(app_state: &AppState, user_id: i64) -> Result<User, AppError> {
    db::get_user(&app_state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("no user with this id".to_string()))
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "Backend server is running" }))
}

#[derive(Deserialize)]
pub struct UserPayload {
    name: String,
}

#[derive(Serialize)]
pub enum LoginStatus {
    Exists,
    Created,
}

#[derive(Serialize)]
pub struct LoginResponse {
    status: LoginStatus,
    user: User,
}

pub async fn login_or_register_user(
    State(app_state): State<AppState>,
    Json(payload): Json<UserPayload>,
) -> Result<Json<LoginResponse>, AppError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(AppError::BadRequest("name must not be empty".to_string()));
    }
    match db::find_user_by_name(&app_state.pool, name).await? {
        Some(user) => Ok(Json(LoginResponse {
            status: LoginStatus::Exists,
            user,
        })),
        None => {
            let new_user = db::create_user(&app_state.pool, name).await?;
            log::info!("registered user {} ({})", new_user.name, new_user.id);
            Ok(Json(LoginResponse {
                status: LoginStatus::Created,
                user: new_user,
            }))
        }
    }
}

pub async fn get_preferences(
    State(app_state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Preferences>, AppError> {
    db::get_preferences(&app_state.pool, user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no user with this id".to_string()))
}

pub async fn update_preferences(
    State(app_state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(preferences): Json<Preferences>,
) -> Result<Json<Preferences>, AppError> {
    if let Some(max) = preferences.max_distance {
        if !max.is_finite() || max < 0.0 {
            return Err(AppError::BadRequest(
                "maxDistance must be a non-negative number".to_string(),
            ));
        }
    }
    if !db::update_preferences(&app_state.pool, user_id, &preferences).await? {
        return Err(AppError::NotFound("no user with this id".to_string()));
    }
    Ok(Json(preferences))
}

pub async fn get_location(
    State(app_state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<UserLocation>, AppError> {
    db::get_location(&app_state.pool, user_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no user with this id".to_string()))
}

pub async fn update_location(
    State(app_state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(mut location): Json<UserLocation>,
) -> Result<Json<UserLocation>, AppError> {
    if !location.position().is_valid() {
        return Err(AppError::BadRequest("invalid coordinates".to_string()));
    }
    require_user(&app_state, user_id).await?;

    if location.is_using_device_location && location.address.is_none() {
        location.address = app_state
            .geocoder
            .place_name(location.lat, location.lng)
            .await;
    }
    db::update_location(&app_state.pool, user_id, &location).await?;
    Ok(Json(location))
}

pub async fn get_my_events(
    State(app_state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<Vec<Event>>, AppError> {
    require_user(&app_state, user_id).await?;
    db::get_events_by_owner(&app_state.pool, user_id)
        .await
        .map(Json)
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FeedQuery {
    price: PriceFilter,
    date: DateFilter,
    search: String,
}

/// The user's map: stored location and preferences, plus any chat override.
pub async fn get_feed(
    State(app_state): State<AppState>,
    Path(user_id): Path<i64>,
    Query(query): Query<FeedQuery>,
) -> Result<Json<Vec<Event>>, AppError> {
    let location = db::get_location(&app_state.pool, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("no user with this id".to_string()))?;
    let preferences = db::get_preferences(&app_state.pool, user_id)
        .await?
        .unwrap_or_default();
    let events = db::get_all_events(&app_state.pool).await?;
    let suggested = app_state.with_chat(user_id, |chat| chat.suggested().to_vec());

    let filters = Filters {
        price: query.price,
        date: query.date,
        search: query.search,
    };
    let ctx = FilterContext {
        filters: &filters,
        location: &location,
        preferences: &preferences,
        suggested: &suggested,
        today: today(),
    };
    let visible = filter::filter_events(&events, &ctx);
    Ok(Json(filter::annotate_distances(&visible, location.position())))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatState {
    messages: Vec<ChatMessage>,
    suggested_events: Vec<Event>,
    filter_active: bool,
}

pub async fn get_chat(
    State(app_state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<ChatState>, AppError> {
    require_user(&app_state, user_id).await?;
    Ok(Json(app_state.with_chat(user_id, |chat| ChatState {
        messages: chat.messages().to_vec(),
        suggested_events: chat.suggested().to_vec(),
        filter_active: chat.is_filter_active(),
    })))
}

#[derive(Deserialize)]
pub struct ChatPayload {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatReply {
    message: ChatMessage,
    filter_active: bool,
}

pub async fn send_chat_message(
    State(app_state): State<AppState>,
    Path(user_id): Path<i64>,
    Json(payload): Json<ChatPayload>,
) -> Result<Json<ChatReply>, AppError> {
    let text = payload.message.trim();
    if text.is_empty() {
        return Err(AppError::BadRequest("message must not be empty".to_string()));
    }
    require_user(&app_state, user_id).await?;

    let events = db::get_all_events(&app_state.pool).await?;
    let recommendation = app_state.gemini.recommend(text, &events, today()).await;
    let reply = app_state.with_chat(user_id, |chat| {
        let message = chat.apply_reply(text, &recommendation, &events);
        ChatReply {
            message,
            filter_active: chat.is_filter_active(),
        }
    });
    Ok(Json(reply))
}

pub async fn clear_chat(
    State(app_state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    require_user(&app_state, user_id).await?;
    app_state.with_chat(user_id, |chat| chat.clear());
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_events(State(app_state): State<AppState>) -> Result<Json<Vec<Event>>, AppError> {
    db::get_all_events(&app_state.pool).await.map(Json)
}

pub async fn get_event(
    State(app_state): State<AppState>,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, AppError> {
    db::get_event(&app_state.pool, &event_id)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("no such event".to_string()))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FilterQuery {
    price: PriceFilter,
    date: DateFilter,
    search: String,
    lat: Option<f64>,
    lng: Option<f64>,
    max_distance: Option<f64>,
    genres: Option<String>,
    suggested: Option<String>,
}

/// Stateless pipeline: every input comes from the query string. `genres` and
/// `suggested` are comma separated; suggested ids are resolved against the
/// stored events.
pub async fn filter_events(
    State(app_state): State<AppState>,
    Query(query): Query<FilterQuery>,
) -> Result<Json<Vec<Event>>, AppError> {
    let events = db::get_all_events(&app_state.pool).await?;
    let defaults = UserLocation::default();
    let location = UserLocation {
        lat: query.lat.unwrap_or(defaults.lat),
        lng: query.lng.unwrap_or(defaults.lng),
        address: None,
        is_using_device_location: false,
    };
    let preferences = Preferences {
        max_distance: query.max_distance,
        genre_preferences: split_list(query.genres.as_deref()),
    };
    let suggested_ids = split_list(query.suggested.as_deref());
    let suggested = crate::chatbot::resolve_suggestions(&events, &suggested_ids);
    let filters = Filters {
        price: query.price,
        date: query.date,
        search: query.search,
    };

    let ctx = FilterContext {
        filters: &filters,
        location: &location,
        preferences: &preferences,
        suggested: &suggested,
        today: today(),
    };
    Ok(Json(filter::filter_events(&events, &ctx)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEventPayload {
    user_id: i64,
    title: String,
    description: String,
    date: String,
    #[serde(default)]
    is_free: bool,
    #[serde(default)]
    category: Option<String>,
    organizer: String,
    phone_number: String,
    #[serde(default)]
    position: Option<Position>,
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    photos: Vec<String>,
}

pub async fn create_event_handler(
    State(app_state): State<AppState>,
    Json(payload): Json<CreateEventPayload>,
) -> Result<(StatusCode, Json<Event>), AppError> {
    let required = [
        ("title", &payload.title),
        ("description", &payload.description),
        ("date", &payload.date),
        ("organizer", &payload.organizer),
        ("phoneNumber", &payload.phone_number),
    ];
    if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
        return Err(AppError::BadRequest(format!("{field} is required")));
    }
    let date = parse_event_date(&payload.date)
        .ok_or_else(|| AppError::BadRequest("date is not a valid timestamp".to_string()))?;
    let owner = require_user(&app_state, payload.user_id).await?;

    let position = match (payload.position, payload.location.as_deref()) {
        (Some(position), _) if position.is_valid() => position,
        (Some(_), _) => return Err(AppError::BadRequest("invalid coordinates".to_string())),
        (None, Some(address)) => {
            let GeocodingResult { lat, lng, .. } = app_state
                .geocoder
                .geocode(address)
                .await
                .ok_or_else(|| AppError::BadRequest("location could not be found".to_string()))?;
            Position { lat, lng }
        }
        (None, None) => return Err(AppError::BadRequest("location is required".to_string())),
    };

    let category = payload
        .category
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_CATEGORY.to_string());

    let new_event = db::create_event(
        &app_state.pool,
        NewEvent {
            title: payload.title,
            description: payload.description,
            date,
            is_free: payload.is_free,
            category,
            organizer: payload.organizer,
            phone_number: Some(payload.phone_number),
            position,
            photos: payload.photos,
            owner_id: Some(owner.id),
            owner_name: Some(owner.name),
        },
    )
    .await?;
    log::info!("event {} created by user {}", new_event.id, payload.user_id);
    Ok((StatusCode::CREATED, Json(new_event)))
}

#[derive(Deserialize)]
pub struct SearchQuery {
    q: String,
    limit: Option<usize>,
}

pub async fn geocode_search(
    State(app_state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Json<Vec<GeocodingResult>> {
    let limit = query.limit.unwrap_or(DEFAULT_SUGGESTION_LIMIT);
    Json(app_state.geocoder.search(&query.q, limit).await)
}

#[derive(Deserialize)]
pub struct ReverseQuery {
    lat: f64,
    lng: f64,
}

#[derive(Serialize)]
pub struct ReverseResponse {
    address: Option<String>,
    label: String,
}

pub async fn geocode_reverse(
    State(app_state): State<AppState>,
    Query(query): Query<ReverseQuery>,
) -> Result<Json<ReverseResponse>, AppError> {
    if !(Position { lat: query.lat, lng: query.lng }).is_valid() {
        return Err(AppError::BadRequest("invalid coordinates".to_string()));
    }
    let address = app_state.geocoder.reverse(query.lat, query.lng).await;
    let label = address
        .clone()
        .unwrap_or_else(|| coordinate_label(query.lat, query.lng));
    Ok(Json(ReverseResponse { address, label }))
}

#[derive(Serialize)]
pub struct DiscoverResponse {
    success: bool,
    events: Vec<DiscoveredEvent>,
    count: usize,
}

pub async fn discover_events(
    State(app_state): State<AppState>,
) -> Result<Json<DiscoverResponse>, AppError> {
    let events = app_state.gemini.discover_events().await?;
    Ok(Json(DiscoverResponse {
        success: true,
        count: events.len(),
        events,
    }))
}
