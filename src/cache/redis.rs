use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::cache::CacheBackend;
use crate::core::{HiveError, Result};

/// Redis 结果缓存
///
/// - 键统一加前缀，与同一 Redis 中的其他数据隔离
/// - 过期由 SETEX 交给 Redis 处理
pub struct RedisCache {
    client: ::redis::Client,
    prefix: String,
}

impl RedisCache {
    /// URL 非法时返回错误；此时并不建立连接
    pub fn new(redis_url: &str, prefix: &str) -> Result<Self> {
        let client = ::redis::Client::open(redis_url).map_err(|e| HiveError::Cache(e.to_string()))?;
        Ok(Self {
            client,
            prefix: prefix.to_string(),
        })
    }

    fn build_key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    async fn get_connection(&self) -> Result<::redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| HiveError::Cache(format!("Redis connection failed: {}", e)))
    }
}

/// 字符串原样存储，其余值序列化为 JSON 文本
fn encode(value: &serde_json::Value) -> Result<String> {
    match value {
        serde_json::Value::String(s) => Ok(s.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}

fn decode(raw: String) -> serde_json::Value {
    serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
}

#[async_trait]
impl CacheBackend for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let mut conn = self.get_connection().await?;
        let key = self.build_key(key);

        let data: Option<String> = ::redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| HiveError::Cache(format!("Redis GET failed: {}", e)))?;

        debug!(key = %key, hit = data.is_some(), "Redis GET");
        Ok(data.map(decode))
    }

    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.get_connection().await?;
        let key = self.build_key(key);
        let payload = encode(value)?;

        let cmd = match ttl {
            Some(ttl) => {
                let mut c = ::redis::cmd("SETEX");
                c.arg(&key).arg(ttl.as_secs().max(1)).arg(&payload);
                c
            }
            None => {
                let mut c = ::redis::cmd("SET");
                c.arg(&key).arg(&payload);
                c
            }
        };
        cmd.query_async::<()>(&mut conn)
            .await
            .map_err(|e| HiveError::Cache(format!("Redis SET failed: {}", e)))?;

        debug!(key = %key, ttl = ?ttl, "Redis SET");
        Ok(())
    }

    async fn health(&self) -> bool {
        let Ok(mut conn) = self.get_connection().await else {
            return false;
        };
        ::redis::cmd("PING")
            .query_async::<String>(&mut conn)
            .await
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encode_decode() {
        assert_eq!(encode(&json!("plain text")).unwrap(), "plain text");
        assert_eq!(decode("plain text".to_string()), json!("plain text"));
        let obj = json!({"model": "m", "n": 3});
        assert_eq!(decode(encode(&obj).unwrap()), obj);
    }

    #[test]
    fn test_invalid_url_rejected() {
        assert!(RedisCache::new("not a url", "hive:").is_err());
    }

    // 需要本地 Redis：cargo test --features redis-tests
    #[cfg(feature = "redis-tests")]
    #[tokio::test]
    async fn test_redis_roundtrip() {
        let cache = RedisCache::new("redis://127.0.0.1:6379/0", "hive:test:").unwrap();
        cache
            .set("k", &json!({"a": 1}), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        assert_eq!(cache.get("k").await.unwrap(), Some(json!({"a": 1})));
        assert!(cache.health().await);
    }
}
