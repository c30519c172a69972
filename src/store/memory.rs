// ABOUTME: In-memory store implementation with LRU eviction and TTL support
// ABOUTME: Includes background cleanup task for expired entries
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GuildPass Project

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use super::{StoreConfig, StoreProvider};
use crate::errors::{GateError, GateResult};

/// In-memory store entry with expiration.
#[derive(Debug, Clone)]
struct StoreEntry {
    data: Vec<u8>,
    expires_at: Instant,
}

impl StoreEntry {
    fn new(data: Vec<u8>, ttl: Duration) -> Self {
        Self {
            data,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// In-memory store with LRU eviction and background cleanup.
///
/// Single-process backend for development and tests. The `Arc<RwLock<..>>`
/// is shared with the cleanup task; `take` holds the write lock across its
/// read-and-remove, which is what makes consumption atomic here.
#[derive(Clone)]
pub struct InMemoryStore {
    entries: Arc<RwLock<LruCache<String, StoreEntry>>>,
}

impl InMemoryStore {
    /// Fallback capacity when the configured bound is zero.
    const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
        Some(n) => n,
        None => unreachable!(),
    };

    /// Create a new in-memory store, optionally with a background cleanup
    /// task removing expired entries on `config.cleanup_interval`.
    #[must_use]
    pub fn new(config: &StoreConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_entries).unwrap_or(Self::DEFAULT_CAPACITY);
        let entries = Arc::new(RwLock::new(LruCache::new(capacity)));

        if config.enable_background_cleanup {
            let entries_clone = Arc::clone(&entries);
            let cleanup_interval = config.cleanup_interval;
            tokio::spawn(async move {
                let mut interval = tokio::time::interval(cleanup_interval);
                loop {
                    interval.tick().await;
                    Self::cleanup_expired(&entries_clone).await;
                }
            });
        }

        Self { entries }
    }

    /// Remove all expired entries.
    async fn cleanup_expired(entries: &Arc<RwLock<LruCache<String, StoreEntry>>>) {
        let mut guard = entries.write().await;
        let expired: Vec<String> = guard
            .iter()
            .filter_map(|(k, v)| v.is_expired().then(|| k.clone()))
            .collect();
        for key in &expired {
            guard.pop(key);
        }
        let removed = expired.len();
        drop(guard);
        if removed > 0 {
            tracing::debug!("cleaned up {removed} expired store entries");
        }
    }
}

#[async_trait::async_trait]
impl StoreProvider for InMemoryStore {
    async fn put<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> GateResult<()> {
        let serialized = serde_json::to_vec(value).map_err(|e| GateError::StorageFailure {
            detail: format!("serialization failed: {e}"),
        })?;
        self.entries
            .write()
            .await
            .push(key.to_owned(), StoreEntry::new(serialized, ttl));
        Ok(())
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> GateResult<Option<T>> {
        let mut entries = self.entries.write().await;
        if let Some(entry) = entries.get(key) {
            if entry.is_expired() {
                entries.pop(key);
                return Ok(None);
            }
            let value = serde_json::from_slice(&entry.data).map_err(|e| {
                GateError::StorageFailure {
                    detail: format!("deserialization failed: {e}"),
                }
            })?;
            return Ok(Some(value));
        }
        Ok(None)
    }

    async fn take<T: for<'de> Deserialize<'de>>(&self, key: &str) -> GateResult<Option<T>> {
        // Remove under a single write lock: the second concurrent taker
        // observes the entry as already gone.
        let entry = self.entries.write().await.pop(key);
        match entry {
            Some(entry) if !entry.is_expired() => {
                let value = serde_json::from_slice(&entry.data).map_err(|e| {
                    GateError::StorageFailure {
                        detail: format!("deserialization failed: {e}"),
                    }
                })?;
                Ok(Some(value))
            }
            _ => Ok(None),
        }
    }

    async fn scan_prefix<T: for<'de> Deserialize<'de> + Send>(
        &self,
        prefix: &str,
    ) -> GateResult<Vec<T>> {
        let pattern = glob::Pattern::new(&format!("{}*", glob::Pattern::escape(prefix))).map_err(
            |e| GateError::StorageFailure {
                detail: format!("invalid scan prefix '{prefix}': {e}"),
            },
        )?;

        let entries = self.entries.read().await;
        let mut values = Vec::new();
        for (key, entry) in entries.iter() {
            if !pattern.matches(key) || entry.is_expired() {
                continue;
            }
            match serde_json::from_slice(&entry.data) {
                Ok(value) => values.push(value),
                Err(e) => tracing::warn!("skipping undecodable store entry {key}: {e}"),
            }
        }
        Ok(values)
    }

    async fn health_check(&self) -> GateResult<()> {
        Ok(())
    }
}
