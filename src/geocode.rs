//! Address → coordinates lookup.
//!
//! The engine only relies on [`GeocodeResolver`]; the provider behind it is
//! a black box. Timeouts are enforced by the caller, not here.

use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::store::Location;

pub const DEFAULT_GEOCODE_URL: &str = "https://maps.googleapis.com/maps/api/geocode/json";

#[async_trait]
pub trait GeocodeResolver: Send + Sync {
    async fn resolve(&self, address: &str) -> Result<Location, AppError>;
}

fn no_match() -> AppError {
    AppError::validation("Could not find location for the specified address.")
}

/// Google Geocoding API client.
pub struct GoogleGeocoder {
    http: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    geometry: Geometry,
}

#[derive(Debug, Deserialize)]
struct Geometry {
    location: Location,
}

impl GoogleGeocoder {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> anyhow::Result<Self> {
        // transport-level ceiling; the engine applies its own tighter deadline
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .context("build geocoding http client")?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl GeocodeResolver for GoogleGeocoder {
    async fn resolve(&self, address: &str) -> Result<Location, AppError> {
        let response = self
            .http
            .get(&self.base_url)
            .query(&[("address", address), ("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "geocoding request failed");
                AppError::ExternalService("Geocoding service is unavailable.".into())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(%status, "geocoding provider returned an error status");
            return Err(AppError::ExternalService(format!(
                "Geocoding service responded with {status}."
            )));
        }

        let body: GeocodeResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "geocoding response did not parse");
            AppError::ExternalService("Geocoding service sent an unreadable response.".into())
        })?;

        match body.status.as_str() {
            "OK" => {}
            "ZERO_RESULTS" => return Err(no_match()),
            other => {
                warn!(provider_status = other, "geocoding lookup rejected");
                return Err(AppError::ExternalService(format!(
                    "Geocoding service rejected the lookup ({other})."
                )));
            }
        }

        let location = body
            .results
            .into_iter()
            .next()
            .map(|r| r.geometry.location)
            .ok_or_else(no_match)?;
        debug!(lat = location.lat, lng = location.lng, "address resolved");
        Ok(location)
    }
}

/// Resolves every address to the same point. Development fallback when no
/// API key is configured.
pub struct FixedGeocoder {
    location: Location,
}

impl FixedGeocoder {
    pub fn new(location: Location) -> Self {
        Self { location }
    }
}

impl Default for FixedGeocoder {
    fn default() -> Self {
        Self::new(Location {
            lat: 40.7484474,
            lng: -73.9871516,
        })
    }
}

#[async_trait]
impl GeocodeResolver for FixedGeocoder {
    async fn resolve(&self, _address: &str) -> Result<Location, AppError> {
        Ok(self.location)
    }
}
