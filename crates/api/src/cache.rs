//! TTL key/value cache with validated read-through memoization.
//!
//! Two interchangeable backends sit behind the [`CacheStore`] trait: Redis
//! (shared, TTL enforced by the store) and an in-process map (TTL checked
//! lazily on read). Backend selection happens once at startup via
//! [`connect`]; everything else is written against the trait.
//!
//! ## Key Patterns
//!
//! ```text
//! zettle:purchases:{year}-{month}   → Vec<Purchase> JSON per month window
//! ```
//!
//! ## Degradation
//!
//! A broken store never breaks the response path: read and write failures in
//! [`Cache::cachify_validate`] are logged and degrade to "recompute every
//! time". Only a producer failure, or a produced value failing validation,
//! surfaces to the caller.

mod memory;
mod redis;

pub use memory::InMemoryCache;
pub use redis::RedisCache;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use garde::Validate;
use serde::{Serialize, de::DeserializeOwned};

/// String-level store contract shared by both backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Health check - verify the backend is reachable.
    async fn ping(&self) -> Result<bool>;

    /// Get a value. Absent and expired are indistinguishable.
    async fn get_string(&self, key: &str) -> Result<Option<String>>;

    /// Set a value. `None` TTL means the entry never expires.
    async fn set_string(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()>;

    /// Remaining TTL for a key. `None` for both "no expiry" and "absent".
    async fn remaining_ttl(&self, key: &str) -> Result<Option<Duration>>;

    /// Delete a key.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Connect the configured Redis backend, falling back to the in-process
/// backend when no URL is set or the connection fails. Never fails startup.
pub async fn connect(redis_url: Option<&str>) -> Cache {
    if let Some(url) = redis_url {
        match RedisCache::connect(url).await {
            Ok(store) => {
                tracing::info!("connected to redis cache");
                return Cache::new(Arc::new(store));
            }
            Err(error) => {
                tracing::warn!(%error, "failed to connect to redis, using in-memory cache");
            }
        }
    } else {
        tracing::info!("no redis url configured, using in-memory cache");
    }

    Cache::new(Arc::new(InMemoryCache::new()))
}

/// How a [`Cache::cachify_validate`] result was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheInfo {
    /// True only when cached data was actually returned.
    pub cached: bool,
    /// Remaining TTL observed on a hit, nominal TTL on a miss.
    pub ttl: Option<Duration>,
}

/// A validated value plus how it was obtained.
#[derive(Debug, Clone)]
pub struct Cached<T> {
    pub data: T,
    pub info: CacheInfo,
}

/// Cheap-to-clone handle adding the typed layer over a [`CacheStore`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn ping(&self) -> bool {
        self.store.ping().await.unwrap_or(false)
    }

    /// Get and decode a value. A value that no longer decodes is a miss,
    /// not an error.
    pub async fn get_object<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let Some(raw) = self.store.get_string(key).await? else {
            return Ok(None);
        };
        Ok(serde_json::from_str(&raw).ok())
    }

    /// Encode and store a value.
    pub async fn set_object<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.store.set_string(key, &raw, ttl).await
    }

    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key).await
    }

    /// Read-through memoization that only trusts a cached value if it still
    /// validates and passes `validate_cached` (callers without a staleness
    /// predicate pass `|_| true`).
    ///
    /// Never returns data that fails validation. Store failures degrade to
    /// recomputing; a producer error, or a produced value failing validation,
    /// is returned to the caller.
    pub async fn cachify_validate<T, V, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        validate_cached: V,
        producer: F,
    ) -> Result<Cached<T>>
    where
        T: Serialize + DeserializeOwned + Validate<Context = ()>,
        V: Fn(&T) -> bool,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let cached = match self.get_object::<T>(key).await {
            Ok(value) => value,
            Err(error) => {
                tracing::warn!(key, %error, "failed to retrieve cached value");
                None
            }
        };

        if let Some(value) = cached {
            if value.validate().is_ok() && validate_cached(&value) {
                let remaining = match self.store.remaining_ttl(key).await {
                    Ok(remaining) => remaining,
                    Err(error) => {
                        tracing::warn!(key, %error, "failed to read remaining ttl");
                        None
                    }
                };
                return Ok(Cached {
                    data: value,
                    info: CacheInfo {
                        cached: true,
                        ttl: remaining,
                    },
                });
            }
        }

        let value = producer().await?;
        value
            .validate()
            .map_err(|report| anyhow::anyhow!("invalid value produced for key {key}: {report}"))?;

        if let Err(error) = self.set_object(key, &value, ttl).await {
            tracing::warn!(key, %error, "failed to cache value");
        }

        Ok(Cached {
            data: value,
            info: CacheInfo { cached: false, ttl },
        })
    }
}
