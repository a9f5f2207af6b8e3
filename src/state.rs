use crate::chatbot::ChatSession;
use crate::config::Config;
use crate::gemini::GeminiClient;
use crate::geocoding::Geocoder;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub gemini: Arc<GeminiClient>,
    pub geocoder: Arc<Geocoder>,
    /// Chat sessions by user id. Never held across an await.
    pub chats: Arc<Mutex<HashMap<i64, ChatSession>>>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: &Config) -> Self {
        Self {
            pool,
            gemini: Arc::new(GeminiClient::new(
                config.gemini_api_key.clone(),
                &config.gemini_endpoint,
                &config.gemini_model,
                &config.discovery_city,
            )),
            geocoder: Arc::new(Geocoder::new(&config.nominatim_endpoint)),
            chats: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Runs `f` against the user's chat session, creating it on first use.
    pub fn with_chat<R>(&self, user_id: i64, f: impl FnOnce(&mut ChatSession) -> R) -> R {
        let mut chats = self
            .chats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(chats.entry(user_id).or_default())
    }
}
