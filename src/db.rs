use crate::error::AppError;
use crate::models::{Event, NewEvent, Position, Preferences, User, UserLocation};
use chrono::{DateTime, Days, FixedOffset};
use nanoid::nanoid;
use sqlx::SqlitePool;

pub async fn init_schema(pool: &SqlitePool) -> Result<(), AppError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            lat REAL NOT NULL,
            lng REAL NOT NULL,
            address TEXT,
            is_using_device_location INTEGER NOT NULL DEFAULT 0,
            max_distance REAL,
            genre_preferences TEXT NOT NULL DEFAULT '[]'
        );",
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE TABLE IF NOT EXISTS events (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT NOT NULL,
            date TEXT NOT NULL,
            is_free INTEGER NOT NULL,
            category TEXT NOT NULL,
            organizer TEXT NOT NULL,
            phone_number TEXT,
            lat REAL NOT NULL,
            lng REAL NOT NULL,
            image_url TEXT NOT NULL,
            photos TEXT NOT NULL DEFAULT '[]',
            owner_id INTEGER,
            owner_name TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (owner_id) REFERENCES users (id) ON DELETE SET NULL
        );",
    )
    .execute(pool)
    .await?;
    Ok(())
}

/// Inserts a sample event so a fresh database has something on the map.
pub async fn seed_if_empty(pool: &SqlitePool, now: DateTime<FixedOffset>) -> Result<(), AppError> {
    let event_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM events")
        .fetch_one(pool)
        .await?;
    if event_count.0 > 0 {
        return Ok(());
    }

    log::info!("events table is empty, adding a sample event");
    let sample = NewEvent {
        title: "Acoustic Concert in Garden".to_string(),
        description: "Enjoy an evening of live music in an intimate setting. Local artists will perform known pieces and original compositions.".to_string(),
        date: now.checked_add_days(Days::new(3)).unwrap_or(now),
        is_free: false,
        category: "Music".to_string(),
        organizer: "Urban Garden".to_string(),
        phone_number: None,
        position: Position { lat: 44.435, lng: 26.10 },
        photos: Vec::new(),
        owner_id: None,
        owner_name: None,
    };
    create_event(pool, sample).await?;
    Ok(())
}

pub async fn find_user_by_name(pool: &SqlitePool, name: &str) -> Result<Option<User>, AppError> {
    sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM users WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
        .map(|row| row.map(|(id, name)| User { id, name }))
        .map_err(AppError::from)
}

pub async fn get_user(pool: &SqlitePool, user_id: i64) -> Result<Option<User>, AppError> {
    sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await
        .map(|row| row.map(|(id, name)| User { id, name }))
        .map_err(AppError::from)
}

pub async fn create_user(pool: &SqlitePool, name: &str) -> Result<User, AppError> {
    let location = UserLocation::default();
    let preferences = Preferences::initial();
    let user_id = sqlx::query(
        "INSERT INTO users (name, lat, lng, address, is_using_device_location, max_distance, genre_preferences)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(name)
    .bind(location.lat)
    .bind(location.lng)
    .bind(location.address)
    .bind(location.is_using_device_location)
    .bind(preferences.max_distance)
    .bind(encode_list(&preferences.genre_preferences))
    .execute(pool)
    .await?
    .last_insert_rowid();
    Ok(User {
        id: user_id,
        name: name.to_string(),
    })
}

pub async fn get_preferences(pool: &SqlitePool, user_id: i64) -> Result<Option<Preferences>, AppError> {
    let row: Option<(Option<f64>, String)> =
        sqlx::query_as("SELECT max_distance, genre_preferences FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
    Ok(row.map(|(max_distance, genres)| Preferences {
        max_distance,
        genre_preferences: decode_list(&genres),
    }))
}

pub async fn update_preferences(
    pool: &SqlitePool,
    user_id: i64,
    preferences: &Preferences,
) -> Result<bool, AppError> {
    let result = sqlx::query("UPDATE users SET max_distance = ?, genre_preferences = ? WHERE id = ?")
        .bind(preferences.max_distance)
        .bind(encode_list(&preferences.genre_preferences))
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn get_location(pool: &SqlitePool, user_id: i64) -> Result<Option<UserLocation>, AppError> {
    let row: Option<(f64, f64, Option<String>, bool)> = sqlx::query_as(
        "SELECT lat, lng, address, is_using_device_location FROM users WHERE id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|(lat, lng, address, is_using_device_location)| UserLocation {
        lat,
        lng,
        address,
        is_using_device_location,
    }))
}

pub async fn update_location(
    pool: &SqlitePool,
    user_id: i64,
    location: &UserLocation,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        "UPDATE users SET lat = ?, lng = ?, address = ?, is_using_device_location = ? WHERE id = ?",
    )
    .bind(location.lat)
    .bind(location.lng)
    .bind(&location.address)
    .bind(location.is_using_device_location)
    .bind(user_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

#[derive(sqlx::FromRow)]
struct EventRow {
    id: String,
    title: String,
    description: String,
    date: DateTime<FixedOffset>,
    is_free: bool,
    category: String,
    organizer: String,
    phone_number: Option<String>,
    lat: f64,
    lng: f64,
    image_url: String,
    photos: String,
    owner_id: Option<i64>,
    owner_name: Option<String>,
}

impl From<EventRow> for Event {
    fn from(row: EventRow) -> Self {
        let photos = decode_list(&row.photos);
        Event {
            id: row.id,
            title: row.title,
            description: row.description,
            date: row.date,
            is_free: row.is_free,
            category: row.category,
            organizer: row.organizer,
            phone_number: row.phone_number,
            position: Position {
                lat: row.lat,
                lng: row.lng,
            },
            image_url: row.image_url,
            photos: (!photos.is_empty()).then_some(photos),
            distance: None,
            owner_id: row.owner_id,
            owner_name: row.owner_name,
        }
    }
}

const EVENT_COLUMNS: &str = "id, title, description, date, is_free, category, organizer, phone_number, lat, lng, image_url, photos, owner_id, owner_name";

/// Placeholder picture seeded from the first word of the title.
pub fn placeholder_image_url(title: &str) -> String {
    let seed: String = title
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_alphanumeric())
        .collect();
    let seed = if seed.is_empty() { "event".to_string() } else { seed };
    format!("https://picsum.photos/seed/{seed}/400/300")
}

pub async fn create_event(pool: &SqlitePool, new_event: NewEvent) -> Result<Event, AppError> {
    let id = nanoid!(10);
    let image_url = placeholder_image_url(&new_event.title);
    let query = format!(
        "INSERT INTO events ({EVENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING {EVENT_COLUMNS}"
    );
    let row: EventRow = sqlx::query_as(&query)
        .bind(id)
        .bind(new_event.title)
        .bind(new_event.description)
        .bind(new_event.date)
        .bind(new_event.is_free)
        .bind(new_event.category)
        .bind(new_event.organizer)
        .bind(new_event.phone_number)
        .bind(new_event.position.lat)
        .bind(new_event.position.lng)
        .bind(image_url)
        .bind(encode_list(&new_event.photos))
        .bind(new_event.owner_id)
        .bind(new_event.owner_name)
        .fetch_one(pool)
        .await?;
    Ok(row.into())
}

pub async fn get_all_events(pool: &SqlitePool) -> Result<Vec<Event>, AppError> {
    let query = format!("SELECT {EVENT_COLUMNS} FROM events ORDER BY created_at ASC, rowid ASC");
    let rows: Vec<EventRow> = sqlx::query_as(&query).fetch_all(pool).await?;
    Ok(rows.into_iter().map(Event::from).collect())
}

pub async fn get_event(pool: &SqlitePool, id: &str) -> Result<Option<Event>, AppError> {
    let query = format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?");
    let row: Option<EventRow> = sqlx::query_as(&query).bind(id).fetch_optional(pool).await?;
    Ok(row.map(Event::from))
}

pub async fn get_events_by_owner(pool: &SqlitePool, owner_id: i64) -> Result<Vec<Event>, AppError> {
    let query = format!(
        "SELECT {EVENT_COLUMNS} FROM events WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC"
    );
    let rows: Vec<EventRow> = sqlx::query_as(&query).bind(owner_id).fetch_all(pool).await?;
    Ok(rows.into_iter().map(Event::from).collect())
}

fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

fn decode_list(text: &str) -> Vec<String> {
    serde_json::from_str(text).unwrap_or_else(|err| {
        log::warn!("ignoring malformed list column {:?}: {}", text, err);
        Vec::new()
    })
}
