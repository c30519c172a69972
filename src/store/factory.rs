// ABOUTME: Store facade for environment-based backend selection
// ABOUTME: Redis when REDIS_URL is set, bounded in-memory store otherwise

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{memory::InMemoryStore, redis::RedisStore, StoreConfig, StoreProvider};
use crate::errors::GateResult;

/// Unified store handle over the configured backend.
#[derive(Clone)]
pub enum Store {
    /// Bounded in-memory backend (development, tests).
    Memory(InMemoryStore),
    /// Redis backend (deployments with more than one instance).
    Redis(RedisStore),
}

impl Store {
    /// Create a store from configuration: Redis when a URL is configured,
    /// in-memory otherwise.
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis connection cannot be established.
    pub async fn connect(config: StoreConfig) -> GateResult<Self> {
        if config.redis_url.is_some() {
            Ok(Self::Redis(RedisStore::connect(&config).await?))
        } else {
            tracing::info!(
                "initializing in-memory store (max entries: {})",
                config.max_entries
            );
            Ok(Self::Memory(InMemoryStore::new(&config)))
        }
    }

    /// Create a store from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the configured backend cannot be initialized.
    pub async fn from_env() -> GateResult<Self> {
        let config = StoreConfig {
            redis_url: std::env::var("REDIS_URL").ok(),
            ..StoreConfig::default()
        };
        Self::connect(config).await
    }
}

#[async_trait::async_trait]
impl StoreProvider for Store {
    async fn put<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> GateResult<()> {
        match self {
            Self::Memory(s) => s.put(key, value, ttl).await,
            Self::Redis(s) => s.put(key, value, ttl).await,
        }
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> GateResult<Option<T>> {
        match self {
            Self::Memory(s) => s.get(key).await,
            Self::Redis(s) => s.get(key).await,
        }
    }

    async fn take<T: for<'de> Deserialize<'de>>(&self, key: &str) -> GateResult<Option<T>> {
        match self {
            Self::Memory(s) => s.take(key).await,
            Self::Redis(s) => s.take(key).await,
        }
    }

    async fn scan_prefix<T: for<'de> Deserialize<'de> + Send>(
        &self,
        prefix: &str,
    ) -> GateResult<Vec<T>> {
        match self {
            Self::Memory(s) => s.scan_prefix(prefix).await,
            Self::Redis(s) => s.scan_prefix(prefix).await,
        }
    }

    async fn health_check(&self) -> GateResult<()> {
        match self {
            Self::Memory(s) => s.health_check().await,
            Self::Redis(s) => s.health_check().await,
        }
    }
}
