use std::str::FromStr;

use serde::Deserialize;
use tracing::warn;

use crate::geocode::DEFAULT_GEOCODE_URL;

#[derive(Debug, Clone, Deserialize)]
pub struct GeocodeConfig {
    /// Without a key the service falls back to a fixed location.
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Unset means the in-memory store.
    pub database_url: Option<String>,
    pub geocode: GeocodeConfig,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = non_empty_var("DATABASE_URL");
        let geocode = GeocodeConfig {
            api_key: non_empty_var("GOOGLE_API_KEY"),
            base_url: std::env::var("GEOCODE_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_GEOCODE_URL.into()),
            timeout_ms: parse_or(
                "GEOCODE_TIMEOUT_MS",
                std::env::var("GEOCODE_TIMEOUT_MS").ok(),
                5000,
            ),
        };
        let storage = StorageConfig {
            endpoint: std::env::var("MINIO_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:9000".into()),
            bucket: std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "places".into()),
            access_key: std::env::var("MINIO_ACCESS_KEY")
                .unwrap_or_else(|_| "minioadmin".into()),
            secret_key: std::env::var("MINIO_SECRET_KEY")
                .unwrap_or_else(|_| "minioadmin".into()),
            region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };
        Ok(Self {
            database_url,
            geocode,
            storage,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> T {
    match raw {
        None => default,
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %v, "invalid value, using default");
            default
        }),
    }
}
