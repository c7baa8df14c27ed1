//! 内存缓存：进程内 HashMap，读取时检查过期（被动过期，不做清扫）

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::cache::CacheBackend;
use crate::core::Result;

#[derive(Default)]
pub struct InMemoryCache {
    entries: RwLock<HashMap<String, (serde_json::Value, Option<Instant>)>>,
}

impl InMemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前保存的条目数（含已过期未覆盖的）
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).and_then(|(value, expires_at)| match expires_at {
            Some(at) if Instant::now() >= *at => None,
            _ => Some(value.clone()),
        }))
    }

    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Option<Duration>) -> Result<()> {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.entries
            .write()
            .await
            .insert(key.to_string(), (value.clone(), expires_at));
        Ok(())
    }
}
