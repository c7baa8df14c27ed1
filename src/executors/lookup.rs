//! 信息检索执行器
//!
//! 先查缓存 `lookup:<query>`，命中则原样返回；未命中时构造研究型 prompt 调用一次推理后端，
//! 结果以中等 TTL 写入缓存。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::cache::{lookup_cache_key, CacheBackend};
use crate::core::Result;
use crate::executors::{
    timed, ExecutionContext, ExecutorKind, ExecutorResult, InformationLookup, TaskExecutor,
};
use crate::llm::{GenerateRequest, InferenceBackend};

pub struct InformationLookupExecutor {
    inference: Arc<dyn InferenceBackend>,
    cache: Arc<dyn CacheBackend>,
    model: String,
    system_prompt: String,
    ttl: Duration,
}

impl InformationLookupExecutor {
    pub fn new(
        inference: Arc<dyn InferenceBackend>,
        cache: Arc<dyn CacheBackend>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
        ttl: Duration,
    ) -> Self {
        Self {
            inference,
            cache,
            model: model.into(),
            system_prompt: system_prompt.into(),
            ttl,
        }
    }

    fn build_prompt(query: &str) -> String {
        format!(
            r#"Research and provide comprehensive information about: "{query}"

Provide:
1. A summary of the topic
2. Key insights and important points
3. Relevant context and background

Format your response clearly and concisely."#
        )
    }
}

#[async_trait]
impl TaskExecutor for InformationLookupExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::InformationLookup
    }

    async fn execute(&self, query: &str, _context: &ExecutionContext) -> Result<ExecutorResult> {
        let key = lookup_cache_key(query);
        if let Some(cached) = self.cache.get(&key).await? {
            match serde_json::from_value::<ExecutorResult>(cached) {
                Ok(result) => {
                    tracing::debug!(key = %key, "lookup cache hit");
                    return Ok(result);
                }
                Err(e) => tracing::warn!(key = %key, "ignoring unreadable cache entry: {}", e),
            }
        }
        tracing::debug!(key = %key, "lookup cache miss");

        let request = GenerateRequest::new(
            Self::build_prompt(query),
            self.system_prompt.clone(),
            self.model.clone(),
        );
        let (response, duration_secs) = timed(self.inference.generate(&request)).await;
        let response = response?;

        let result = ExecutorResult::InformationLookup(InformationLookup {
            query: query.to_string(),
            full_response: response,
            model: self.model.clone(),
            duration_secs,
        });

        self.cache
            .set(&key, &serde_json::to_value(&result)?, Some(self.ttl))
            .await?;

        tracing::info!(
            executor = "information_lookup",
            duration_ms = (duration_secs * 1000.0) as u64,
            "executor finished"
        );
        Ok(result)
    }
}
