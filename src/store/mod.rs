// ABOUTME: Correlation store abstraction with per-key expiry and single-use consumption
// ABOUTME: Pluggable backend support (in-memory, Redis) selected by environment

//! Correlation store.
//!
//! The store is the system's only shared mutable resource. It holds pending
//! registration flows (short TTL, consumed exactly once) and invite records
//! (long TTL, append-only). [`StoreProvider::take`] is the single-use
//! consumption primitive: it must remove the entry and return its prior
//! value in one atomic step, so two concurrent callbacks presenting the same
//! state token can never both observe a value.

/// Backend selection facade
pub mod factory;
/// In-memory store implementation
pub mod memory;
/// Redis store implementation
pub mod redis;

pub use factory::Store;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::defaults;
use crate::errors::GateResult;

/// Store configuration.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Redis connection URL; `None` selects the in-memory backend.
    pub redis_url: Option<String>,
    /// Maximum number of entries (in-memory backend).
    pub max_entries: usize,
    /// Cleanup interval for expired entries (in-memory backend).
    pub cleanup_interval: Duration,
    /// Enable the background cleanup task. Disable in tests to avoid
    /// spawning onto the test runtime.
    pub enable_background_cleanup: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            max_entries: defaults::STORE_MAX_ENTRIES,
            cleanup_interval: Duration::from_secs(defaults::STORE_CLEANUP_INTERVAL_SECS),
            enable_background_cleanup: true,
        }
    }
}

/// Store provider trait for pluggable backend implementations.
#[async_trait::async_trait]
pub trait StoreProvider: Send + Sync + Clone {
    /// Store a value under `key` with a time-to-live.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::GateError::StorageFailure`] if serialization
    /// or the backend write fails.
    async fn put<T: Serialize + Send + Sync>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> GateResult<()>;

    /// Read a value without consuming it. Returns `None` when the key is
    /// absent or expired.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::GateError::StorageFailure`] if the backend
    /// read or deserialization fails.
    async fn get<T: for<'de> Deserialize<'de>>(&self, key: &str) -> GateResult<Option<T>>;

    /// Atomically remove `key` and return the value it held, or `None` when
    /// absent or expired. At most one caller can receive the value.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::GateError::StorageFailure`] if the backend
    /// operation or deserialization fails.
    async fn take<T: for<'de> Deserialize<'de>>(&self, key: &str) -> GateResult<Option<T>>;

    /// Collect every live value whose key starts with `prefix`.
    ///
    /// Entries that fail to deserialize are skipped with a log line rather
    /// than failing the whole scan.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::GateError::StorageFailure`] if the backend
    /// scan fails.
    async fn scan_prefix<T: for<'de> Deserialize<'de> + Send>(
        &self,
        prefix: &str,
    ) -> GateResult<Vec<T>>;

    /// Verify the backend is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`crate::errors::GateError::StorageFailure`] if the backend
    /// is unhealthy.
    async fn health_check(&self) -> GateResult<()>;
}
