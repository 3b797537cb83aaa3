//! In-process cache fallback

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use wb_core::cache::ConversationCache;
use wb_core::error::Result;

/// Volatile in-memory cache.
///
/// Single-instance only; entries vanish on restart. Used when Redis is
/// unreachable so the bridge keeps relaying, at the cost of re-resolving
/// conversations after a restart.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: Arc<RwLock<HashMap<String, Entry>>>,
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|deadline| Instant::now() >= deadline)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of live (non-expired) entries.
    pub async fn len(&self) -> usize {
        let entries = self.entries.read().await;
        entries.values().filter(|e| !e.is_expired()).count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ConversationCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        {
            let entries = self.entries.read().await;
            match entries.get(key) {
                Some(entry) if !entry.is_expired() => return Ok(Some(entry.value.clone())),
                Some(_) => {}
                None => return Ok(None),
            }
        }

        // Expired: prune lazily under the write lock.
        let mut entries = self.entries.write().await;
        if entries.get(key).is_some_and(Entry::is_expired) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: ttl.map(|t| Instant::now() + t),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.write().await;
        entries.remove(key);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

impl Clone for MemoryCache {
    fn clone(&self) -> Self {
        Self {
            entries: Arc::clone(&self.entries),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let cache = MemoryCache::new();
        cache.set("conv:573001234567", "42", None).await.unwrap();

        assert_eq!(
            cache.get("conv:573001234567").await.unwrap(),
            Some("42".to_string())
        );
        assert_eq!(cache.get("conv:other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("seen:MSG1", "1", Some(Duration::from_millis(10)))
            .await
            .unwrap();

        assert!(cache.get("seen:MSG1").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(cache.get("seen:MSG1").await.unwrap(), None);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_overwrite_wins() {
        let cache = MemoryCache::new();
        cache.set("conv:573001234567", "42", None).await.unwrap();
        cache.set("conv:573001234567", "43", None).await.unwrap();

        assert_eq!(
            cache.get("conv:573001234567").await.unwrap(),
            Some("43".to_string())
        );
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = MemoryCache::new();
        cache.set("conv:573001234567", "42", None).await.unwrap();
        cache.delete("conv:573001234567").await.unwrap();

        assert_eq!(cache.get("conv:573001234567").await.unwrap(), None);
        // Deleting again is a no-op.
        cache.delete("conv:573001234567").await.unwrap();
    }
}
