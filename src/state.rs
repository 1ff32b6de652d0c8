use crate::config::AppConfig;
use crate::geocode::{FixedGeocoder, GeocodeResolver, GoogleGeocoder};
use crate::places::services::PlaceService;
use crate::storage::{Storage, StorageClient};
use crate::store::{EntityStore, MemoryStore, PgStore};
use crate::users::services::UserService;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub places: PlaceService,
    pub users: UserService,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let store: Arc<dyn EntityStore> = match &config.database_url {
            Some(url) => Arc::new(PgStore::connect(url).await?),
            None => {
                warn!("DATABASE_URL not set; using in-memory store, data is lost on restart");
                Arc::new(MemoryStore::new())
            }
        };

        let geocoder: Arc<dyn GeocodeResolver> = match &config.geocode.api_key {
            Some(key) => Arc::new(GoogleGeocoder::new(&config.geocode.base_url, key)?),
            None => {
                warn!("GOOGLE_API_KEY not set; every address resolves to a fixed location");
                Arc::new(FixedGeocoder::default())
            }
        };

        // Real S3/MinIO
        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;

        Ok(Self::from_parts(config, store, geocoder, storage))
    }

    pub fn from_parts(
        config: Arc<AppConfig>,
        store: Arc<dyn EntityStore>,
        geocoder: Arc<dyn GeocodeResolver>,
        storage: Arc<dyn StorageClient>,
    ) -> Self {
        let timeout = Duration::from_millis(config.geocode.timeout_ms);
        Self {
            places: PlaceService::new(Arc::clone(&store), geocoder, timeout),
            users: UserService::new(store),
            config,
            storage,
        }
    }

    #[cfg(test)]
    pub fn fake_config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            database_url: None,
            geocode: crate::config::GeocodeConfig {
                api_key: None,
                base_url: "http://fake.local/geocode".into(),
                timeout_ms: 500,
            },
            storage: crate::config::StorageConfig {
                endpoint: "fake".into(),
                bucket: "fake".into(),
                access_key: "fake".into(),
                secret_key: "fake".into(),
                region: "us-east-1".into(),
            },
        })
    }

    #[cfg(test)]
    pub fn fake() -> Self {
        use async_trait::async_trait;
        use bytes::Bytes;

        #[derive(Clone)]
        struct FakeStorage;
        #[async_trait]
        impl StorageClient for FakeStorage {
            async fn put_object(&self, _k: &str, _b: Bytes, _ct: &str) -> anyhow::Result<()> {
                Ok(())
            }
            async fn delete_object(&self, _k: &str) -> anyhow::Result<()> {
                Ok(())
            }
        }

        Self::from_parts(
            Self::fake_config(),
            Arc::new(MemoryStore::new()),
            Arc::new(FixedGeocoder::default()),
            Arc::new(FakeStorage),
        )
    }
}
