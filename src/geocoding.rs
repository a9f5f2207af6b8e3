//! Nominatim (OpenStreetMap) geocoding.
//!
//! Lookups never fail outward: transport or decoding problems are logged and
//! reported as "no result".

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};

const USER_AGENT: &str = concat!("localvibe/", env!("CARGO_PKG_VERSION"));
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodingResult {
    pub lat: f64,
    pub lng: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    lat: String,
    lon: String,
    display_name: Option<String>,
}

impl SearchHit {
    fn into_result(self) -> Option<GeocodingResult> {
        Some(GeocodingResult {
            lat: self.lat.parse().ok()?,
            lng: self.lon.parse().ok()?,
            address: self.display_name,
        })
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReverseAddress {
    city: Option<String>,
    town: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReverseHit {
    display_name: Option<String>,
    #[serde(default)]
    address: Option<ReverseAddress>,
}

impl ReverseHit {
    fn place_name(self) -> Option<String> {
        let address = self.address.unwrap_or_default();
        address
            .city
            .or(address.town)
            .or(self.display_name)
            .filter(|s| !s.is_empty())
    }
}

pub struct Geocoder {
    base_url: String,
    client: Client,
}

impl Geocoder {
    pub fn new(base_url: &str) -> Self {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Best match for a free-form address.
    pub async fn geocode(&self, address: &str) -> Option<GeocodingResult> {
        if address.trim().is_empty() {
            return None;
        }
        let hits = self.search_raw(address, 1).await?;
        let result = hits.into_iter().next().and_then(SearchHit::into_result);
        if result.is_none() {
            log::warn!("no geocoding results for address {:?}", address);
        }
        result
    }

    /// Address suggestions while the user types.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<GeocodingResult> {
        if query.trim().chars().count() < MIN_QUERY_LEN {
            return Vec::new();
        }
        self.search_raw(query, limit.max(1))
            .await
            .unwrap_or_default()
            .into_iter()
            .filter_map(SearchHit::into_result)
            .collect()
    }

    pub async fn reverse(&self, lat: f64, lng: f64) -> Option<String> {
        self.reverse_raw(lat, lng).await?.display_name
    }

    /// Short name for a coordinate: city, then town, then the full address.
    pub async fn place_name(&self, lat: f64, lng: f64) -> Option<String> {
        self.reverse_raw(lat, lng).await?.place_name()
    }

    async fn search_raw(&self, query: &str, limit: usize) -> Option<Vec<SearchHit>> {
        let url = format!("{}/search", self.base_url);
        let limit = limit.to_string();
        let request = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .query(&[("format", "json"), ("q", query), ("limit", limit.as_str())]);
        self.fetch(request).await
    }

    async fn reverse_raw(&self, lat: f64, lng: f64) -> Option<ReverseHit> {
        let url = format!("{}/reverse", self.base_url);
        let (lat, lon) = (lat.to_string(), lng.to_string());
        let request = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .query(&[("format", "json"), ("lat", lat.as_str()), ("lon", lon.as_str())]);
        self.fetch(request).await
    }

    async fn fetch<T: for<'de> Deserialize<'de>>(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Option<T> {
        let response = match request.send().await {
            Ok(response) => response,
            Err(err) => {
                log::warn!("geocoding request failed: {}", err);
                return None;
            }
        };
        let status = response.status();
        if !status.is_success() {
            log::warn!("geocoding returned HTTP {}", status);
            return None;
        }
        match response.json::<T>().await {
            Ok(value) => Some(value),
            Err(err) => {
                log::warn!("geocoding response could not be decoded: {}", err);
                None
            }
        }
    }
}

/// Fallback label for a coordinate nobody could name.
pub fn coordinate_label(lat: f64, lng: f64) -> String {
    format!("{lat:.4}, {lng:.4}")
}
