//! Redis cache backend

use std::time::Duration;

use ::redis::AsyncCommands;
use ::redis::aio::ConnectionManager;
use async_trait::async_trait;
use tracing::info;

use wb_core::cache::ConversationCache;
use wb_core::error::{Error, Result};

/// Redis-backed conversation cache.
///
/// Durable across restarts and shared between bridge instances. The
/// connection manager reconnects on its own; individual command failures
/// surface as `CacheUnavailable` and are absorbed by the sync engine.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Connect and ping. A cache that cannot answer a ping is not accepted;
    /// the composition root falls back to the in-memory store instead.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = ::redis::Client::open(redis_url)
            .map_err(|e| Error::CacheUnavailable(format!("bad redis url: {}", e)))?;

        let mut manager = client
            .get_connection_manager()
            .await
            .map_err(|e| Error::CacheUnavailable(format!("redis connect failed: {}", e)))?;

        ::redis::cmd("PING")
            .query_async::<String>(&mut manager)
            .await
            .map_err(|e| Error::CacheUnavailable(format!("redis ping failed: {}", e)))?;

        info!(url = redis_url, "connected to Redis");
        Ok(Self { manager })
    }
}

#[async_trait]
impl ConversationCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.manager.clone();
        let value: Option<String> = conn
            .get(key)
            .await
            .map_err(|e| Error::CacheUnavailable(e.to_string()))?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.manager.clone();
        match ttl {
            Some(ttl) => conn
                .set_ex::<_, _, ()>(key, value, ttl.as_secs())
                .await
                .map_err(|e| Error::CacheUnavailable(e.to_string()))?,
            None => conn
                .set::<_, _, ()>(key, value)
                .await
                .map_err(|e| Error::CacheUnavailable(e.to_string()))?,
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.manager.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| Error::CacheUnavailable(e.to_string()))?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}
