// SPDX-License-Identifier: Apache-2.0

//! TTL-capable key-value store backing the login and token records.
//!
//! Values are stored as JSON so heterogeneous record types share one
//! keyspace (`login-<me>`, `token-<token>`, `app-<me>-<client>-<scope>`).
//! Expiry is enforced lazily on read plus a periodic `cleanup()` sweep
//! spawned from `main`. Per-key reads and writes are atomic; no
//! cross-key transaction is provided.

use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Shared in-process key-value store.
#[derive(Clone, Default)]
pub struct KvStore {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

impl KvStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a value under `key`, replacing any prior entry.
    /// `ttl = None` means the entry never expires.
    pub async fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> Result<()> {
        let value = serde_json::to_value(value)?;
        let expires_at = ttl.map(|d| Instant::now() + d);
        let mut entries = self.entries.write().await;
        entries.insert(key.to_string(), Entry { value, expires_at });
        Ok(())
    }

    /// Fetch and deserialize the value under `key`.
    /// Expired entries read as absent.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let entries = self.entries.read().await;
        match entries.get(key) {
            Some(entry) if !entry.expired(Instant::now()) => {
                Ok(Some(serde_json::from_value(entry.value.clone())?))
            }
            _ => Ok(None),
        }
    }

    /// Delete the entry under `key`. Returns whether a live entry was removed.
    pub async fn delete(&self, key: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.remove(key) {
            Some(entry) => !entry.expired(Instant::now()),
            None => false,
        }
    }

    /// Reset the TTL of an existing entry. Returns false if the key is
    /// absent or already expired.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        match entries.get_mut(key) {
            Some(entry) if !entry.expired(now) => {
                entry.expires_at = Some(now + ttl);
                true
            }
            _ => false,
        }
    }

    /// Remove expired entries (should be called periodically).
    pub async fn cleanup(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.expired(now));
        let swept = before - entries.len();
        if swept > 0 {
            debug!(swept, "Swept expired store entries");
        }
    }
}
