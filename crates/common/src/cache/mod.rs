//! Read-through cache for derived data
//!
//! Provides:
//! - A backend seam with Redis and in-process implementations
//! - Typed get/set operations with TTL and key namespacing
//! - Read-through loading that degrades to the loader when the cache fails

use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Raw key/value storage behind [`Cache`]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>>;

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    /// `true` when a key was removed
    async fn delete(&self, key: &str) -> Result<bool>;

    async fn ping(&self) -> Result<()>;
}

/// Redis backend over a multiplexed connection
pub struct RedisBackend {
    connection: RwLock<MultiplexedConnection>,
}

impl RedisBackend {
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url).map_err(|e| AppError::CacheError {
            message: format!("Failed to create Redis client: {}", e),
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to connect to Redis: {}", e),
            })?;

        Ok(Self {
            connection: RwLock::new(connection),
        })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.write().await;
        conn.get(key).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to get key '{}': {}", key, e),
        })
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.write().await;
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Failed to set key '{}': {}", key, e),
            })
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let mut conn = self.connection.write().await;
        let deleted: i32 = conn.del(key).await.map_err(|e| AppError::CacheError {
            message: format!("Failed to delete key '{}': {}", key, e),
        })?;
        Ok(deleted > 0)
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connection.write().await;
        redis::cmd("PING")
            .query_async::<String>(&mut *conn)
            .await
            .map_err(|e| AppError::CacheError {
                message: format!("Redis ping failed: {}", e),
            })?;
        Ok(())
    }
}

/// Process-local backend, used when no Redis is configured
#[derive(Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get_raw(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set_raw(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(key.to_string(), (value, now + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// Namespaced JSON cache
#[derive(Clone)]
pub struct Cache {
    backend: Arc<dyn CacheBackend>,
    key_prefix: String,
    default_ttl: Duration,
}

impl Cache {
    pub fn new(backend: Arc<dyn CacheBackend>, key_prefix: impl Into<String>, default_ttl: Duration) -> Self {
        Self {
            backend,
            key_prefix: key_prefix.into(),
            default_ttl,
        }
    }

    /// Redis when configured, otherwise in-process
    pub async fn from_config(config: &AppConfig) -> Result<Self> {
        let prefix = config.cache.key_prefix.clone();
        match config.redis {
            Some(ref redis) => {
                info!("Connecting to Redis cache...");
                let backend = RedisBackend::connect(&redis.url).await?;
                Ok(Self::new(
                    Arc::new(backend),
                    prefix,
                    Duration::from_secs(redis.default_ttl_secs),
                ))
            }
            None => {
                info!("No Redis configured, using in-process cache");
                Ok(Self::in_memory(prefix, config.dashboard_ttl()))
            }
        }
    }

    pub fn in_memory(key_prefix: impl Into<String>, default_ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryBackend::default()), key_prefix, default_ttl)
    }

    /// Build a prefixed key
    fn key(&self, key: &str) -> String {
        format!("{}:{}", self.key_prefix, key)
    }

    /// Get a value from cache
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let full_key = self.key(key);

        match self.backend.get_raw(&full_key).await? {
            Some(json) => {
                let parsed = serde_json::from_str(&json).map_err(|e| AppError::CacheError {
                    message: format!("Failed to parse cached value: {}", e),
                })?;
                debug!(key = %full_key, "Cache hit");
                metrics::record_cache(true, key);
                Ok(Some(parsed))
            }
            None => {
                debug!(key = %full_key, "Cache miss");
                metrics::record_cache(false, key);
                Ok(None)
            }
        }
    }

    /// Set a value in cache with default TTL
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.default_ttl).await
    }

    /// Set a value in cache with custom TTL
    pub async fn set_with_ttl<T: Serialize>(&self, key: &str, value: &T, ttl: Duration) -> Result<()> {
        let full_key = self.key(key);
        let json = serde_json::to_string(value).map_err(|e| AppError::CacheError {
            message: format!("Failed to serialize value: {}", e),
        })?;

        self.backend.set_raw(&full_key, json, ttl).await?;
        debug!(key = %full_key, ttl_secs = ttl.as_secs(), "Cache set");
        Ok(())
    }

    /// Delete a key from cache
    pub async fn purge(&self, key: &str) -> Result<bool> {
        let full_key = self.key(key);
        let deleted = self.backend.delete(&full_key).await?;
        debug!(key = %full_key, deleted, "Cache delete");
        Ok(deleted)
    }

    /// Get or set with a loader function.
    ///
    /// A cache that cannot be read or written is skipped; only loader
    /// errors reach the caller.
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, ttl: Duration, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        match self.get::<T>(key).await {
            Ok(Some(cached)) => return Ok(cached),
            Ok(None) => {}
            Err(e) => warn!(error = %e, key, "Cache read failed, loading from source"),
        }

        let value = loader().await?;

        if let Err(e) = self.set_with_ttl(key, &value, ttl).await {
            warn!(error = %e, key, "Failed to cache value, continuing without cache");
        }

        Ok(value)
    }

    pub async fn ping(&self) -> Result<()> {
        self.backend.ping().await
    }
}

/// Cache keys
pub mod keys {
    /// Admin dashboard aggregates
    pub const ADMIN_DASHBOARD: &str = "dashboard:admin:stats";
}
