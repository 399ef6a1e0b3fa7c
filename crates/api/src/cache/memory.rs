//! In-process cache backend.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::CacheStore;

struct Entry {
    value: String,
    /// `None` means the entry never expires.
    expires_at: Option<Instant>,
}

/// Map-backed [`CacheStore`] used when Redis is unconfigured or unreachable.
/// Expired entries are removed lazily on read.
#[derive(Default)]
pub struct InMemoryCache {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for InMemoryCache {
    async fn ping(&self) -> Result<bool> {
        Ok(true)
    }

    async fn get_string(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            None => Ok(None),
            Some(entry) if entry.expires_at.is_some_and(|at| at <= Instant::now()) => {
                entries.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(entry.value.clone())),
        }
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|ttl| Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>> {
        let entries = self.entries.lock().await;
        let Some(entry) = entries.get(key) else {
            return Ok(None);
        };
        match entry.expires_at {
            None => Ok(None),
            Some(at) => {
                let now = Instant::now();
                if at <= now {
                    Ok(None)
                } else {
                    Ok(Some(at - now))
                }
            }
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }
}
