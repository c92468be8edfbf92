//! Reverse geocoding of coordinates to a coarse place description.

use crate::types::Coordinate;
use async_trait::async_trait;
use reqwest::{
    header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE},
    Client, StatusCode,
};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeocodeError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Server returned error status: {status}")]
    ServerError { status: StatusCode },
    #[error("Rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Authentication failed")]
    AuthError,
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Resolves a coordinate to a place description such as "Istanbul, Marmara".
///
/// `Ok(None)` means the lookup succeeded but produced nothing usable.
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn resolve(&self, coordinate: Coordinate) -> Result<Option<String>, GeocodeError>;
}

/// Geocoder that never produces an address.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledGeocoder;

#[async_trait]
impl Geocoder for DisabledGeocoder {
    async fn resolve(&self, _coordinate: Coordinate) -> Result<Option<String>, GeocodeError> {
        Ok(None)
    }
}

/// Configuration for the HTTP geocoder.
#[derive(Debug, Clone)]
pub struct GeocoderConfig {
    /// Base URL of a Nominatim-compatible service
    pub base_url: String,
    /// Request timeout
    pub timeout: Duration,
    /// User agent sent with every request
    pub user_agent: String,
    /// Preferred language for place names
    pub language: String,
}

impl GeocoderConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(10),
            user_agent: concat!("trailmark/", env!("CARGO_PKG_VERSION")).to_string(),
            language: "en".to_string(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

#[derive(Debug, Default, Deserialize)]
struct ReverseResponse {
    #[serde(default)]
    address: Option<PlaceAddress>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PlaceAddress {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    county: Option<String>,
    state: Option<String>,
    province: Option<String>,
    region: Option<String>,
}

impl PlaceAddress {
    fn locality(&self) -> Option<&str> {
        [
            &self.city,
            &self.town,
            &self.village,
            &self.municipality,
            &self.county,
        ]
        .into_iter()
        .find_map(|v| v.as_deref())
    }

    fn region(&self) -> Option<&str> {
        [&self.state, &self.province, &self.region]
            .into_iter()
            .find_map(|v| v.as_deref())
    }

    /// "locality, region" with missing or blank parts dropped.
    fn format(&self) -> Option<String> {
        let parts: Vec<&str> = [self.locality(), self.region()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

/// Geocoder backed by a Nominatim-compatible `/reverse` endpoint.
pub struct HttpGeocoder {
    client: Client,
    config: GeocoderConfig,
}

impl HttpGeocoder {
    pub fn new(config: GeocoderConfig) -> Result<Self, GeocodeError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        if let Ok(lang) = HeaderValue::from_str(&config.language) {
            headers.insert(ACCEPT_LANGUAGE, lang);
        }

        let client = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(config.timeout)
            .build()?;

        Ok(Self { client, config })
    }

    fn reverse_url(&self, coordinate: Coordinate) -> String {
        format!(
            "{}/reverse?format=jsonv2&lat={}&lon={}&zoom=10",
            self.config.base_url.trim_end_matches('/'),
            coordinate.latitude,
            coordinate.longitude
        )
    }
}

#[async_trait]
impl Geocoder for HttpGeocoder {
    async fn resolve(&self, coordinate: Coordinate) -> Result<Option<String>, GeocodeError> {
        let url = self.reverse_url(coordinate);
        tracing::debug!("Reverse geocoding: {}", url);

        let response = self.client.get(&url).send().await?;

        match response.status() {
            StatusCode::OK => {
                let body: ReverseResponse = response
                    .json()
                    .await
                    .map_err(|e| GeocodeError::InvalidResponse(e.to_string()))?;

                if let Some(err) = body.error {
                    tracing::debug!("Geocoder found nothing at {}: {}", coordinate, err);
                    return Ok(None);
                }

                Ok(body.address.and_then(|a| a.format()))
            }
            StatusCode::TOO_MANY_REQUESTS => {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok())
                    .map(Duration::from_secs);

                Err(GeocodeError::RateLimited { retry_after })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(GeocodeError::AuthError),
            status => Err(GeocodeError::ServerError { status }),
        }
    }
}
