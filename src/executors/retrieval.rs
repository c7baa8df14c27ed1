//! 知识库检索执行器
//!
//! 1. 目标集合取自 context.collections（排序后使用），缺省为配置的默认集合
//! 2. 查缓存 `retrieval:<query>:<排序后的集合>`，命中原样返回
//! 3. 未命中：查询向量化 -> 各集合并发检索（每集合 top-k，失败的集合视为无命中）
//!    -> 跨集合按分数降序合并取前 N -> 构造综合 prompt 调用一次推理 -> 结果带前 N 条命中，中等 TTL 写缓存

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::cache::{retrieval_cache_key, CacheBackend};
use crate::core::{HiveError, Result};
use crate::executors::{
    timed, ExecutionContext, ExecutorKind, ExecutorResult, KnowledgeRetrieval, TaskExecutor,
};
use crate::llm::{GenerateRequest, InferenceBackend};
use crate::vector::VectorSearch;

/// 一条检索命中，带来源集合
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    pub source_collection: String,
    pub id: String,
    pub relevance_score: f32,
    pub payload: serde_json::Value,
}

/// 检索参数
#[derive(Debug, Clone)]
pub struct RetrievalSettings {
    pub model: String,
    pub embedding_model: String,
    pub system_prompt: String,
    pub default_collection: String,
    /// 每个集合的检索条数
    pub per_collection_limit: usize,
    /// 合并后保留条数，与每集合条数无关
    pub top_n: usize,
    pub ttl: Duration,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            model: String::new(),
            embedding_model: String::new(),
            system_prompt: String::new(),
            default_collection: "documents".to_string(),
            per_collection_limit: 3,
            top_n: 5,
            ttl: Duration::from_secs(1800),
        }
    }
}

/// 跨集合合并：按分数降序（同分保持原顺序），只保留前 top_n 条
pub fn rank_hits(mut hits: Vec<RetrievalHit>, top_n: usize) -> Vec<RetrievalHit> {
    hits.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
    hits.truncate(top_n);
    hits
}

fn format_hits(hits: &[RetrievalHit]) -> String {
    if hits.is_empty() {
        return "No similar documents found in vector database.".to_string();
    }
    hits.iter()
        .map(|h| {
            format!(
                "[Collection: {}, Score: {:.3}]\n{}",
                h.source_collection, h.relevance_score, h.payload
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub struct KnowledgeRetrievalExecutor {
    inference: Arc<dyn InferenceBackend>,
    vector: Arc<dyn VectorSearch>,
    cache: Arc<dyn CacheBackend>,
    settings: RetrievalSettings,
}

impl KnowledgeRetrievalExecutor {
    pub fn new(
        inference: Arc<dyn InferenceBackend>,
        vector: Arc<dyn VectorSearch>,
        cache: Arc<dyn CacheBackend>,
        settings: RetrievalSettings,
    ) -> Self {
        Self {
            inference,
            vector,
            cache,
            settings,
        }
    }

    /// 各集合并发检索；单个集合失败只记日志，不影响其他集合
    async fn search_collections(&self, collections: &[String], vector: &[f32]) -> Vec<RetrievalHit> {
        let limit = self.settings.per_collection_limit;
        let searches = collections.iter().map(|collection| async move {
            match self.vector.search(collection, vector, limit).await {
                Ok(points) => points
                    .into_iter()
                    .map(|p| RetrievalHit {
                        source_collection: collection.clone(),
                        id: p.id,
                        relevance_score: p.score,
                        payload: p.payload,
                    })
                    .collect(),
                Err(e) => {
                    tracing::warn!(collection = %collection, "collection search failed, skipping: {}", e);
                    Vec::new()
                }
            }
        });
        join_all(searches).await.into_iter().flatten().collect()
    }

    fn build_prompt(query: &str, hits: &[RetrievalHit], collection_count: usize, extra: &str) -> String {
        format!(
            r#"Using the following information sources, provide a comprehensive response:

Vector Search Results ({} documents from {} collections):
{}

User Query: {}
Additional Context: {}

Provide a clear, helpful response that combines all available information."#,
            hits.len(),
            collection_count,
            format_hits(hits),
            query,
            extra
        )
    }
}

#[async_trait]
impl TaskExecutor for KnowledgeRetrievalExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::KnowledgeRetrieval
    }

    async fn execute(&self, query: &str, context: &ExecutionContext) -> Result<ExecutorResult> {
        let mut collections = context
            .collections()
            .unwrap_or_else(|| vec![self.settings.default_collection.clone()]);
        collections.sort();

        let key = retrieval_cache_key(query, &collections);
        if let Some(cached) = self.cache.get(&key).await? {
            match serde_json::from_value::<ExecutorResult>(cached) {
                Ok(result) => {
                    tracing::debug!(key = %key, "retrieval cache hit");
                    return Ok(result);
                }
                Err(e) => tracing::warn!(key = %key, "ignoring unreadable cache entry: {}", e),
            }
        }
        tracing::debug!(key = %key, "retrieval cache miss");

        let (outcome, duration_secs) = timed(async {
            let embedding = self
                .inference
                .embed(query, &self.settings.embedding_model)
                .await?;
            let pooled = self.search_collections(&collections, &embedding).await;
            let hits = rank_hits(pooled, self.settings.top_n);

            let prompt = Self::build_prompt(
                query,
                &hits,
                collections.len(),
                context.text().unwrap_or(""),
            );
            let request = GenerateRequest::new(
                prompt,
                self.settings.system_prompt.clone(),
                self.settings.model.clone(),
            );
            let response = self.inference.generate(&request).await?;
            Ok::<_, HiveError>((hits, response))
        })
        .await;
        let (hits, response) = outcome?;
        let hit_count = hits.len();

        let result = ExecutorResult::KnowledgeRetrieval(KnowledgeRetrieval {
            response,
            hit_count,
            hits,
            collections_searched: collections,
            model: self.settings.model.clone(),
            embedding_model: self.settings.embedding_model.clone(),
            duration_secs,
        });

        self.cache
            .set(&key, &serde_json::to_value(&result)?, Some(self.settings.ttl))
            .await?;

        tracing::info!(
            executor = "knowledge_retrieval",
            hits = hit_count,
            duration_ms = (duration_secs * 1000.0) as u64,
            "executor finished"
        );
        Ok(result)
    }
}
