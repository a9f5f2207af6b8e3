use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};

pub const DEFAULT_LAT: f64 = 44.4268;
pub const DEFAULT_LNG: f64 = 26.1025;
pub const DEFAULT_ADDRESS: &str = "Bucharest, Romania";

pub const DEFAULT_GENRES: [&str; 6] = ["Music", "Art", "Sports", "Fair", "Theater", "Education"];
pub const INITIAL_MAX_DISTANCE_KM: f64 = 50.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub lat: f64,
    pub lng: f64,
}

impl Position {
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self {
            lat: DEFAULT_LAT,
            lng: DEFAULT_LNG,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub title: String,
    pub description: String,
    pub date: DateTime<FixedOffset>,
    pub is_free: bool,
    pub category: String,
    pub organizer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,
    pub position: Position,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photos: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_name: Option<String>,
}

/// Fields of an event about to be stored; id and image are assigned on insert.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub title: String,
    pub description: String,
    pub date: DateTime<FixedOffset>,
    pub is_free: bool,
    pub category: String,
    pub organizer: String,
    pub phone_number: Option<String>,
    pub position: Position,
    pub photos: Vec<String>,
    pub owner_id: Option<i64>,
    pub owner_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceFilter {
    #[default]
    All,
    Free,
    Paid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateFilter {
    #[default]
    All,
    Today,
    ThisWeek,
    NextWeek,
    ThisWeekend,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Filters {
    pub price: PriceFilter,
    pub date: DateFilter,
    pub search: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocation {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(default)]
    pub is_using_device_location: bool,
}

impl UserLocation {
    pub fn position(&self) -> Position {
        Position {
            lat: self.lat,
            lng: self.lng,
        }
    }
}

impl Default for UserLocation {
    fn default() -> Self {
        Self {
            lat: DEFAULT_LAT,
            lng: DEFAULT_LNG,
            address: Some(DEFAULT_ADDRESS.to_string()),
            is_using_device_location: false,
        }
    }
}

/// Viewer preferences. `Default` applies no genre restriction and leaves the
/// radius unset; [`Preferences::initial`] is what a new account starts with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
    #[serde(default)]
    pub max_distance: Option<f64>,
    #[serde(default)]
    pub genre_preferences: Vec<String>,
}

impl Preferences {
    pub fn initial() -> Self {
        Self {
            max_distance: Some(INITIAL_MAX_DISTANCE_KM),
            genre_preferences: DEFAULT_GENRES.iter().map(|g| g.to_string()).collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_events: Option<Vec<Event>>,
}

/// Event as described by the discovery model, before it is geocoded or stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveredEvent {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub date: String,
    #[serde(default)]
    pub time: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub organizer: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default)]
    pub is_free: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
