//! # Stage: ChatCache
//!
//! ## Responsibility
//! Persist the live chat state (ordered messages plus the latest optimization
//! result) as one JSON envelope under a fixed storage key, and restore it on
//! start if it is younger than the TTL.
//!
//! ## Guarantees
//! - Wholesale expiry: an envelope older than `ttl_ms` is discarded entirely
//!   and its key removed; there is no partial expiry
//! - Best-effort: write failures (quota, read-only) are logged and swallowed
//! - Corrupt envelopes are treated as absent and removed
//! - The clock is passed in explicitly so callers and tests control it
//!
//! ## NOT Responsible For
//! - Coordinating concurrent writers (last write wins)

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::message::{ChatMessage, OptimizationResult};
use crate::storage::Storage;

/// Storage key of the cache envelope.
pub const CACHE_KEY: &str = "chat_live_cache_v1";

/// Envelope lifetime: one hour.
pub const CACHE_TTL_MS: u64 = 3_600_000;

/// Configuration for [`ChatCache`].
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub key: String,
    pub ttl_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        CacheConfig { key: CACHE_KEY.to_string(), ttl_ms: CACHE_TTL_MS }
    }
}

/// The single persisted blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEnvelope {
    /// Unix-epoch milliseconds at which the envelope was written.
    pub timestamp: u64,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub optimization_result: Option<OptimizationResult>,
}

impl CacheEnvelope {
    /// An envelope is expired once its age strictly exceeds the TTL.
    pub fn is_expired(&self, now_ms: u64, ttl_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp) > ttl_ms
    }
}

/// TTL-bounded cache over an injected [`Storage`].
pub struct ChatCache<S: Storage> {
    config: CacheConfig,
    storage: S,
}

impl<S: Storage> ChatCache<S> {
    pub fn new(storage: S) -> Self {
        Self::with_config(storage, CacheConfig::default())
    }

    pub fn with_config(storage: S, config: CacheConfig) -> Self {
        ChatCache { config, storage }
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Write the envelope. Failures are logged and swallowed.
    pub fn persist(
        &mut self,
        messages: &[ChatMessage],
        optimization_result: Option<&OptimizationResult>,
        now_ms: u64,
    ) {
        if let Err(e) = self.try_persist(messages, optimization_result, now_ms) {
            debug!(error = %e, key = %self.config.key, "chat cache write skipped");
        }
    }

    fn try_persist(
        &mut self,
        messages: &[ChatMessage],
        optimization_result: Option<&OptimizationResult>,
        now_ms: u64,
    ) -> Result<(), PersistError> {
        let envelope = CacheEnvelope {
            timestamp: now_ms,
            messages: messages.to_vec(),
            optimization_result: optimization_result.cloned(),
        };
        let blob = serde_json::to_string(&envelope)?;
        self.storage.set(&self.config.key, &blob)?;
        Ok(())
    }

    /// Read the envelope back if present and fresh.
    ///
    /// # Returns
    /// - `Some(envelope)` when a parseable envelope younger than the TTL exists.
    /// - `None` when absent, unreadable, corrupt or expired. Corrupt and expired
    ///   envelopes are removed from storage.
    pub fn restore(&mut self, now_ms: u64) -> Option<CacheEnvelope> {
        let blob = match self.storage.get(&self.config.key) {
            Ok(Some(blob)) => blob,
            Ok(None) => return None,
            Err(e) => {
                debug!(error = %e, key = %self.config.key, "chat cache read failed");
                return None;
            }
        };

        let envelope: CacheEnvelope = match serde_json::from_str(&blob) {
            Ok(env) => env,
            Err(e) => {
                warn!(error = %e, key = %self.config.key, "discarding corrupt chat cache");
                self.remove_quietly();
                return None;
            }
        };

        if envelope.is_expired(now_ms, self.config.ttl_ms) {
            debug!(
                age_ms = now_ms.saturating_sub(envelope.timestamp),
                ttl_ms = self.config.ttl_ms,
                "chat cache expired"
            );
            self.remove_quietly();
            return None;
        }

        Some(envelope)
    }

    /// Remove the envelope unconditionally.
    pub fn clear(&mut self) {
        self.remove_quietly();
    }

    fn remove_quietly(&mut self) {
        if let Err(e) = self.storage.remove(&self.config.key) {
            debug!(error = %e, key = %self.config.key, "chat cache remove failed");
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum PersistError {
    #[error(transparent)]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Storage(#[from] StorageError),
}
