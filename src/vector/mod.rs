//! 向量检索层：后端抽象与实现（Qdrant HTTP / 内存）

pub mod memory;
pub mod qdrant;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::VectorSection;
use crate::core::Result;

pub use memory::InMemoryVectorStore;
pub use qdrant::QdrantClient;

/// 向量库返回的一条命中
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// 向量检索 trait：按集合检索，单个集合的失败必须能被调用方单独捕获
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// 在指定集合中检索与 vector 最相似的 limit 条，按分数降序
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;

    async fn health(&self) -> bool {
        true
    }
}

/// 从配置创建向量检索后端
pub fn create_vector_search_from_config(cfg: &VectorSection) -> Arc<dyn VectorSearch> {
    tracing::info!("Using Qdrant vector search at {}", cfg.url);
    Arc::new(QdrantClient::new(&cfg.url, Duration::from_secs(cfg.timeout_secs)))
}
