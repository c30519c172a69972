// ABOUTME: Redis store implementation with connection pooling and TTL support
// ABOUTME: Single-use consumption is an atomic GETDEL, prefix scans use cursor-based SCAN
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GuildPass Project

use std::time::Duration;

use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{StoreConfig, StoreProvider};
use crate::errors::{GateError, GateResult};

/// Connection establishment timeout.
const CONNECTION_TIMEOUT_SECS: u64 = 5;
/// Per-command response timeout.
const RESPONSE_TIMEOUT_SECS: u64 = 5;
/// Reconnection attempts performed by the connection manager.
const RECONNECTION_RETRIES: usize = 3;
/// SCAN batch size for prefix scans.
const SCAN_COUNT: usize = 100;

/// Redis store backed by a pooled `ConnectionManager`.
///
/// `SET key value EX ttl` gives per-key expiry, and `GETDEL` removes and
/// returns an entry in one server-side operation, so duplicate callbacks
/// racing on the same state token serialize at the store.
#[derive(Clone)]
pub struct RedisStore {
    manager: ConnectionManager,
}

impl RedisStore {
    /// Connect to the Redis backend named by `config.redis_url`.
    ///
    /// # Errors
    ///
    /// Returns [`GateError::StorageFailure`] if the URL is missing or the
    /// connection cannot be established.
    pub async fn connect(config: &StoreConfig) -> GateResult<Self> {
        let redis_url = config
            .redis_url
            .as_ref()
            .ok_or_else(|| GateError::StorageFailure {
                detail: "REDIS_URL is required for the redis store backend".to_owned(),
            })?;

        info!("connecting to redis at {redis_url}");

        let client =
            redis::Client::open(redis_url.as_str()).map_err(|e| GateError::StorageFailure {
                detail: format!("failed to create redis client: {e}"),
            })?;

        let manager_config = ConnectionManagerConfig::new()
            .set_connection_timeout(Duration::from_secs(CONNECTION_TIMEOUT_SECS))
            .set_response_timeout(Duration::from_secs(RESPONSE_TIMEOUT_SECS))
            .set_number_of_retries(RECONNECTION_RETRIES);

        let manager = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| GateError::StorageFailure {
                detail: format!("failed to connect to redis: {e}"),
            })?;

        info!("connected to redis");
        Ok(Self { manager })
    }

    fn storage_error(op: &str, e: &redis::RedisError) -> GateError {
        GateError::StorageFailure {
            detail: format!("redis {op} failed: {e}"),
        }
    }

    fn decode<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> GateResult<T> {
        serde_json::from_slice(bytes).map_err(|e| GateError::StorageFailure {
            detail: format!("deserialization failed: {e}"),
        })
    }
}

#[async_trait::async_trait]
impl StoreProvider for RedisStore {
    async fn put<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> GateResult<()> {
        let serialized = serde_json::to_vec(value).map_err(|e| GateError::StorageFailure {
            detail: format!("serialization failed: {e}"),
        })?;
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, serialized, ttl.as_secs())
            .await
            .map_err(|e| Self::storage_error("SET", &e))
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> GateResult<Option<T>> {
        let mut conn = self.manager.clone();
        let data: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| Self::storage_error("GET", &e))?;
        data.as_deref().map(Self::decode).transpose()
    }

    async fn take<T: for<'de> Deserialize<'de>>(&self, key: &str) -> GateResult<Option<T>> {
        let mut conn = self.manager.clone();
        // GETDEL is a single server-side read-and-remove; no get+del window.
        let data: Option<Vec<u8>> = conn
            .get_del(key)
            .await
            .map_err(|e| Self::storage_error("GETDEL", &e))?;
        data.as_deref().map(Self::decode).transpose()
    }

    async fn scan_prefix<T: for<'de> Deserialize<'de> + Send>(
        &self,
        prefix: &str,
    ) -> GateResult<Vec<T>> {
        let pattern = format!("{prefix}*");
        let mut conn = self.manager.clone();
        let mut values = Vec::new();
        let mut cursor = 0u64;

        loop {
            let (new_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(SCAN_COUNT)
                .query_async(&mut conn)
                .await
                .map_err(|e| Self::storage_error("SCAN", &e))?;

            for key in keys {
                // Key may expire between SCAN and GET; treat absence as skip.
                let data: Option<Vec<u8>> = conn
                    .get(&key)
                    .await
                    .map_err(|e| Self::storage_error("GET", &e))?;
                if let Some(bytes) = data {
                    match serde_json::from_slice(&bytes) {
                        Ok(value) => values.push(value),
                        Err(e) => warn!("skipping undecodable store entry {key}: {e}"),
                    }
                }
            }

            cursor = new_cursor;
            if cursor == 0 {
                break;
            }
        }

        Ok(values)
    }

    async fn health_check(&self) -> GateResult<()> {
        let mut conn = self.manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Self::storage_error("PING", &e))?;
        Ok(())
    }
}
