use std::time::Duration;

use chrono::NaiveDate;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::models::{DiscoveredEvent, Event};

const MAX_ATTEMPTS: u32 = 3;
const RETRY_STEP: Duration = Duration::from_millis(1000);
const MAX_SUGGESTIONS: usize = 3;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

pub const MSG_NOT_CONFIGURED: &str =
    "API key not configured. Please check your environment variables.";
pub const MSG_NO_EVENTS_TODAY: &str = "Sorry, there are no events scheduled for today. Would you like me to recommend events for another day?";
pub const MSG_DEFAULT_REPLY: &str = "I'm here to help you find today's events!";
pub const MSG_UNPARSEABLE: &str = "I'm here to help you find today's events! Tell me about your mood or what activity you'd like to do today.";
pub const MSG_FAILURE: &str = "Sorry, I encountered an issue. Please try again!";

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("GEMINI_API_KEY is not set")]
    MissingApiKey,
    #[error("model unavailable: {0}")]
    Unavailable(String),
    #[error("model response could not be parsed: {0}")]
    Parse(String),
}

/// What the model made of a chat message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    pub event_ids: Vec<String>,
    pub ai_message: String,
}

impl Recommendation {
    fn message(text: &str) -> Self {
        Self {
            event_ids: Vec::new(),
            ai_message: text.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawRecommendation {
    #[serde(default)]
    event_ids: Option<serde_json::Value>,
    #[serde(default)]
    ai_message: Option<String>,
}

pub struct GeminiClient {
    api_key: Option<String>,
    base_url: String,
    model: String,
    city: String,
    client: Client,
}

impl GeminiClient {
    pub fn new(api_key: Option<String>, base_url: &str, model: &str, city: &str) -> Self {
        Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            city: city.to_string(),
            client: build_client(REQUEST_TIMEOUT),
        }
    }

    /// Replaces the per-request timeout (each retry gets the full budget).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Picks up to three of today's events for a chat message. Never fails:
    /// every problem turns into a friendly reply with no suggestions.
    pub async fn recommend(&self, message: &str, events: &[Event], today: NaiveDate) -> Recommendation {
        if !self.is_configured() {
            return Recommendation::message(MSG_NOT_CONFIGURED);
        }
        let todays = todays_events(events, today);
        if todays.is_empty() {
            return Recommendation::message(MSG_NO_EVENTS_TODAY);
        }

        let prompt = recommendation_prompt(&self.city, &todays, message);
        match self.generate(&prompt).await {
            Ok(text) => parse_recommendation(&text),
            Err(err) => {
                log::error!("recommendation request failed: {}", err);
                Recommendation::message(MSG_FAILURE)
            }
        }
    }

    /// Asks the model for a list of upcoming events in the configured city.
    pub async fn discover_events(&self) -> Result<Vec<DiscoveredEvent>, GeminiError> {
        if !self.is_configured() {
            return Err(GeminiError::MissingApiKey);
        }
        log::info!("requesting event discovery for {}", self.city);
        let text = self.generate(&discovery_prompt(&self.city)).await?;
        let events = parse_discovered(&text)?;
        log::info!("parsed {} discovered events", events.len());
        Ok(events)
    }

    async fn generate(&self, prompt: &str) -> Result<String, GeminiError> {
        let mut attempt = 1;
        loop {
            match self.generate_once(prompt).await {
                Ok(text) => return Ok(text),
                Err(err @ GeminiError::Unavailable(_)) if attempt < MAX_ATTEMPTS => {
                    let wait = RETRY_STEP * attempt;
                    log::warn!("model call failed ({}), retry #{} in {:?}", err, attempt, wait);
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn generate_once(&self, prompt: &str) -> Result<String, GeminiError> {
        let api_key = self.api_key.as_deref().ok_or(GeminiError::MissingApiKey)?;
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let payload = json!({
            "contents": [
                { "parts": [ { "text": prompt } ] }
            ]
        });

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|err| GeminiError::Unavailable(err.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| GeminiError::Unavailable(err.to_string()))?;
        if !status.is_success() {
            return Err(GeminiError::Unavailable(format!("HTTP {}: {}", status, body)));
        }

        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|err| GeminiError::Parse(err.to_string()))?;
        response_text(&value)
            .ok_or_else(|| GeminiError::Parse("response missing candidate text".to_string()))
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

fn response_text(value: &serde_json::Value) -> Option<String> {
    let parts = value
        .get("candidates")?
        .as_array()?
        .first()?
        .get("content")?
        .get("parts")?
        .as_array()?;
    let text: String = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

pub fn todays_events(events: &[Event], today: NaiveDate) -> Vec<&Event> {
    events
        .iter()
        .filter(|event| event.date.date_naive() == today)
        .collect()
}

fn recommendation_prompt(city: &str, todays: &[&Event], message: &str) -> String {
    let context = todays
        .iter()
        .enumerate()
        .map(|(index, e)| {
            format!(
                "{index}. \"{}\" (ID: {}, Category: {}): {} at {}, Free: {}, Organizer: {}",
                e.title,
                e.id,
                e.category,
                e.description,
                e.date.format("%H:%M"),
                e.is_free,
                e.organizer
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "You are an AI Event Assistant for finding events in {city}. Your role is to recommend ONLY TODAY'S events based on the user's mood, interests, or the activities they want to do.

Available events TODAY:
{context}

User's message: \"{message}\"

IMPORTANT INSTRUCTIONS:
1. Only recommend events from TODAY's list above.
2. If you understand the user's mood or interests, recommend UP TO {MAX_SUGGESTIONS} events that match best. Return a JSON object:
   {{\"eventIds\": [\"event-id-1\"], \"aiMessage\": \"Why these events match. Include event times.\"}}
3. If the intent is unclear, ask a clarifying question and return an empty eventIds list.
4. If nothing matches, say so, briefly list what is on today, and return an empty eventIds list.
5. Keep a friendly, conversational tone.
6. Never recommend more than {MAX_SUGGESTIONS} events.

Respond ONLY with the JSON object, no other text."
    )
}

fn discovery_prompt(city: &str) -> String {
    format!(
        "You are an event discovery assistant. Compile a list of 50 upcoming events happening in {city} in the next month.

For each event provide:
{{
  \"title\": \"Event Name\",
  \"description\": \"Brief description of the event\",
  \"date\": \"YYYY-MM-DD\",
  \"time\": \"HH:MM\",
  \"location\": \"Exact address\",
  \"organizer\": \"Organization name\",
  \"genre\": \"Category (e.g., Music, Sports, Art, Conference, Theatre)\",
  \"isFree\": true,
  \"url\": \"Website or link if available\"
}}

Include a mix of genres, locations across {city}, free and paid events, with dates spread over the next month.

Return ONLY a valid JSON array, no other text."
    )
}

/// Slice from the first `open` to the last `close`, inclusive.
fn extract_delimited(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

pub fn parse_recommendation(text: &str) -> Recommendation {
    let Some(object) = extract_delimited(text, '{', '}') else {
        return Recommendation::message(MSG_UNPARSEABLE);
    };
    let raw: RawRecommendation = match serde_json::from_str(object) {
        Ok(raw) => raw,
        Err(err) => {
            log::warn!("recommendation JSON rejected: {}", err);
            return Recommendation::message(MSG_FAILURE);
        }
    };

    let event_ids = match raw.event_ids {
        Some(serde_json::Value::Array(ids)) => ids
            .into_iter()
            .filter_map(|id| id.as_str().map(str::to_string))
            .take(MAX_SUGGESTIONS)
            .collect(),
        _ => Vec::new(),
    };
    let ai_message = raw
        .ai_message
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| MSG_DEFAULT_REPLY.to_string());

    Recommendation {
        event_ids,
        ai_message,
    }
}

pub fn parse_discovered(text: &str) -> Result<Vec<DiscoveredEvent>, GeminiError> {
    let array = extract_delimited(text, '[', ']')
        .ok_or_else(|| GeminiError::Parse("no JSON array found in response".to_string()))?;
    serde_json::from_str(array).map_err(|err| {
        let preview: String = text.chars().take(500).collect();
        log::error!("raw discovery response: {}", preview);
        GeminiError::Parse(err.to_string())
    })
}
