//! 结果缓存层：后端抽象（Redis / 内存）与缓存键构造
//!
//! 读在执行前、写在成功后；过期完全依赖后端 TTL，编排层从不主动删除。

pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::CacheSection;
use crate::core::Result;

pub use self::memory::InMemoryCache;
pub use self::redis::RedisCache;

/// 缓存后端 trait：值为 JSON；非 JSON 的原始字符串以 Value::String 返回
#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// ttl 为 None 时永不过期
    async fn set(&self, key: &str, value: &serde_json::Value, ttl: Option<Duration>) -> Result<()>;

    async fn health(&self) -> bool {
        true
    }
}

/// 查询归一化：去首尾空白，连续空白折叠为单个空格
pub fn normalize_query(query: &str) -> String {
    query.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 信息检索执行器的缓存键：`lookup:<query>`
pub fn lookup_cache_key(query: &str) -> String {
    format!("lookup:{}", normalize_query(query))
}

/// 知识检索执行器的缓存键：`retrieval:<query>:<排序后以冒号连接的集合>`
pub fn retrieval_cache_key(query: &str, collections: &[String]) -> String {
    let mut sorted: Vec<&str> = collections.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    format!("retrieval:{}:{}", normalize_query(query), sorted.join(":"))
}

/// 从配置创建缓存后端；Redis URL 非法时回退到内存缓存
pub fn create_cache_from_config(cfg: &CacheSection) -> Arc<dyn CacheBackend> {
    if cfg.backend.eq_ignore_ascii_case("memory") {
        tracing::info!("Using in-memory result cache");
        return Arc::new(InMemoryCache::new());
    }
    match RedisCache::new(&cfg.url, &cfg.prefix) {
        Ok(cache) => {
            tracing::info!("Using Redis result cache at {}", cfg.url);
            Arc::new(cache)
        }
        Err(e) => {
            tracing::warn!("Redis cache unavailable ({}), using in-memory cache", e);
            Arc::new(InMemoryCache::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query("  find   rust\tdocs \n"), "find rust docs");
        assert_eq!(normalize_query(""), "");
    }

    #[test]
    fn test_lookup_key() {
        assert_eq!(lookup_cache_key(" pricing  info "), "lookup:pricing info");
    }

    #[test]
    fn test_retrieval_key_sorts_collections() {
        let a = retrieval_cache_key("q", &["zeta".to_string(), "alpha".to_string()]);
        let b = retrieval_cache_key("q", &["alpha".to_string(), "zeta".to_string()]);
        assert_eq!(a, "retrieval:q:alpha:zeta");
        assert_eq!(a, b);
    }
}
