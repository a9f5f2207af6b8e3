use std::env;

use thiserror::Error;

const DEFAULT_PORT: &str = "5000";
const DEFAULT_GEMINI_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
const DEFAULT_NOMINATIM_ENDPOINT: &str = "https://nominatim.openstreetmap.org";
const DEFAULT_DISCOVERY_CITY: &str = "Bucharest";

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: String,
    pub gemini_api_key: Option<String>,
    pub gemini_endpoint: String,
    pub gemini_model: String,
    pub nominatim_endpoint: String,
    pub discovery_city: String,
    pub log_file_path: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
}

impl Config {
    /// Reads the process environment. `DATABASE_URL` is the only required
    /// variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let or_default = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let database_url = lookup("DATABASE_URL")
            .filter(|url| !url.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        Ok(Self {
            database_url,
            port: or_default("PORT", DEFAULT_PORT),
            gemini_api_key: lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty()),
            gemini_endpoint: or_default("GEMINI_ENDPOINT", DEFAULT_GEMINI_ENDPOINT),
            gemini_model: or_default("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
            nominatim_endpoint: or_default("NOMINATIM_ENDPOINT", DEFAULT_NOMINATIM_ENDPOINT),
            discovery_city: or_default("DISCOVERY_CITY", DEFAULT_DISCOVERY_CITY),
            log_file_path: lookup("LOG_FILE_PATH"),
        })
    }

    /// Configuration for tests and offline runs: no AI key, default endpoints.
    pub fn with_database(database_url: &str) -> Self {
        Self {
            database_url: database_url.to_string(),
            port: DEFAULT_PORT.to_string(),
            gemini_api_key: None,
            gemini_endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            nominatim_endpoint: DEFAULT_NOMINATIM_ENDPOINT.to_string(),
            discovery_city: DEFAULT_DISCOVERY_CITY.to_string(),
            log_file_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn database_url_is_required() {
        let err = Config::from_lookup(lookup(&[("PORT", "8080")])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("DATABASE_URL")));
        assert_eq!(err.to_string(), "DATABASE_URL must be set");
    }

    #[test]
    fn defaults_fill_the_rest() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "sqlite://test.db"),
            ("GEMINI_API_KEY", "  "),
            ("DISCOVERY_CITY", "Cluj-Napoca"),
        ]))
        .unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.gemini_api_key, None);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.discovery_city, "Cluj-Napoca");
        assert_eq!(config.log_file_path, None);
    }
}
