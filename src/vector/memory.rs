//! 内存向量库：按集合保存 (id, 向量, payload)，余弦相似度检索
//!
//! 用于离线运行与测试；可将某个集合标记为失败，模拟向量库单集合故障。

use std::collections::{HashMap, HashSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::core::{HiveError, Result};
use crate::vector::{ScoredPoint, VectorSearch};

type Entry = (String, Vec<f32>, serde_json::Value);

#[derive(Default)]
pub struct InMemoryVectorStore {
    collections: RwLock<HashMap<String, Vec<Entry>>>,
    failing: RwLock<HashSet<String>>,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_point(
        &self,
        collection: &str,
        id: impl Into<String>,
        vector: Vec<f32>,
        payload: serde_json::Value,
    ) {
        if let Ok(mut collections) = self.collections.write() {
            collections
                .entry(collection.to_string())
                .or_default()
                .push((id.into(), vector, payload));
        }
    }

    /// 之后对该集合的检索都返回错误
    pub fn set_failing(&self, collection: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(collection.to_string());
        }
    }

    fn error(collection: &str, message: &str) -> HiveError {
        HiveError::VectorSearch {
            collection: collection.to_string(),
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl VectorSearch for InMemoryVectorStore {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let failing = self
            .failing
            .read()
            .map_err(|_| Self::error(collection, "lock poisoned"))?
            .contains(collection);
        if failing {
            return Err(Self::error(collection, "collection unavailable"));
        }

        let collections = self
            .collections
            .read()
            .map_err(|_| Self::error(collection, "lock poisoned"))?;
        let entries = collections
            .get(collection)
            .ok_or_else(|| Self::error(collection, "collection not found"))?;

        let mut scored: Vec<ScoredPoint> = entries
            .iter()
            .map(|(id, emb, payload)| ScoredPoint {
                id: id.clone(),
                score: cosine_similarity(vector, emb),
                payload: payload.clone(),
            })
            .collect();
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(limit);
        Ok(scored)
    }
}

/// 余弦相似度
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}
