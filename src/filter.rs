//! Event filter pipeline.
//!
//! Everything here is a pure function of its inputs: events are borrowed,
//! never mutated, and the result keeps input order.

use chrono::{Datelike, Days, NaiveDate};

use crate::models::{DateFilter, Event, Filters, Position, Preferences, PriceFilter, UserLocation};

pub const EARTH_RADIUS_KM: f64 = 6371.0;
pub const DEFAULT_MAX_DISTANCE_KM: f64 = 200.0;

/// Everything besides the event list that decides what gets rendered.
#[derive(Debug, Clone, Copy)]
pub struct FilterContext<'a> {
    pub filters: &'a Filters,
    pub location: &'a UserLocation,
    pub preferences: &'a Preferences,
    pub suggested: &'a [Event],
    pub today: NaiveDate,
}

/// Great-circle distance in kilometers.
pub fn haversine_km(from: Position, to: Position) -> f64 {
    let d_lat = (to.lat - from.lat).to_radians();
    let d_lng = (to.lng - from.lng).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + from.lat.to_radians().cos() * to.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

fn effective_position(position: Position) -> Position {
    if position.is_valid() {
        position
    } else {
        Position::default()
    }
}

/// Distance from the viewer to the event, reusing a precomputed value when
/// the event carries one.
pub fn event_distance_km(event: &Event, viewer: Position) -> f64 {
    match event.distance {
        Some(d) if d.is_finite() => d,
        _ => haversine_km(effective_position(viewer), effective_position(event.position)),
    }
}

pub fn matches_search(event: &Event, search: &str) -> bool {
    let needle = search.to_lowercase();
    event.title.to_lowercase().contains(&needle)
        || event.description.to_lowercase().contains(&needle)
}

pub fn matches_price(event: &Event, price: PriceFilter) -> bool {
    match price {
        PriceFilter::All => true,
        PriceFilter::Free => event.is_free,
        PriceFilter::Paid => !event.is_free,
    }
}

pub fn matches_genre(event: &Event, preferences: &Preferences) -> bool {
    preferences.genre_preferences.is_empty()
        || preferences
            .genre_preferences
            .iter()
            .any(|genre| *genre == event.category)
}

pub fn matches_distance(event: &Event, viewer: Position, preferences: &Preferences) -> bool {
    let max = preferences.max_distance.unwrap_or(DEFAULT_MAX_DISTANCE_KM);
    event_distance_km(event, viewer) <= max
}

/// Inclusive date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

fn week_start(today: NaiveDate) -> NaiveDate {
    let back = u64::from(today.weekday().num_days_from_sunday());
    today - Days::new(back)
}

/// Window for a date filter, or `None` for [`DateFilter::All`]. Weeks start on
/// Sunday; the weekend is that week's Friday and Saturday.
pub fn date_window(filter: DateFilter, today: NaiveDate) -> Option<DateWindow> {
    let start = week_start(today);
    let window = match filter {
        DateFilter::All => return None,
        DateFilter::Today => DateWindow {
            start: today,
            end: today,
        },
        DateFilter::ThisWeek => DateWindow {
            start,
            end: start + Days::new(6),
        },
        DateFilter::NextWeek => DateWindow {
            start: start + Days::new(7),
            end: start + Days::new(13),
        },
        DateFilter::ThisWeekend => DateWindow {
            start: start + Days::new(5),
            end: start + Days::new(6),
        },
    };
    Some(window)
}

pub fn matches_date(event: &Event, filter: DateFilter, today: NaiveDate) -> bool {
    match date_window(filter, today) {
        None => true,
        Some(window) => window.contains(event.date.date_naive()),
    }
}

pub fn matches_all(event: &Event, ctx: &FilterContext<'_>) -> bool {
    matches_search(event, &ctx.filters.search)
        && matches_price(event, ctx.filters.price)
        && matches_genre(event, ctx.preferences)
        && matches_distance(event, ctx.location.position(), ctx.preferences)
        && matches_date(event, ctx.filters.date, ctx.today)
}

/// Runs the pipeline. A non-empty chatbot suggestion wins over every manual
/// filter and is returned as is.
pub fn filter_events(events: &[Event], ctx: &FilterContext<'_>) -> Vec<Event> {
    if !ctx.suggested.is_empty() {
        return ctx.suggested.to_vec();
    }
    events
        .iter()
        .filter(|event| matches_all(event, ctx))
        .cloned()
        .collect()
}

/// Copies of `events` with `distance` filled in for the viewer.
pub fn annotate_distances(events: &[Event], viewer: Position) -> Vec<Event> {
    events
        .iter()
        .map(|event| Event {
            distance: Some(event_distance_km(event, viewer)),
            ..event.clone()
        })
        .collect()
}
