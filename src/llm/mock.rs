//! Mock 推理后端（用于测试与离线运行，无需模型服务）
//!
//! 生成：回显模型名与 prompt 首行；向量化：按字节折叠成固定维度向量。统计调用次数，可设置为失败。

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;

use crate::core::{HiveError, Result};
use crate::llm::{GenerateRequest, InferenceBackend};

const MOCK_EMBEDDING_DIM: usize = 8;

/// Mock 客户端
#[derive(Debug, Default)]
pub struct MockInference {
    reply: Option<String>,
    fail_generate: AtomicBool,
    fail_embed: AtomicBool,
    generate_calls: AtomicUsize,
    embed_calls: AtomicUsize,
}

impl MockInference {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有 generate 调用返回固定文本
    pub fn with_reply(reply: impl Into<String>) -> Self {
        Self {
            reply: Some(reply.into()),
            ..Self::default()
        }
    }

    /// 所有调用均失败
    pub fn failing() -> Self {
        let mock = Self::default();
        mock.set_failing(true);
        mock
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_generate.store(failing, Ordering::SeqCst);
        self.fail_embed.store(failing, Ordering::SeqCst);
    }

    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// generate + embed 总调用次数
    pub fn total_calls(&self) -> usize {
        self.generate_calls() + self.embed_calls()
    }
}

/// 确定性向量：同一文本总得到同一向量
pub fn mock_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; MOCK_EMBEDDING_DIM];
    for (i, b) in text.bytes().enumerate() {
        v[i % MOCK_EMBEDDING_DIM] += b as f32 / 255.0;
    }
    v
}

#[async_trait]
impl InferenceBackend for MockInference {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_generate.load(Ordering::SeqCst) {
            return Err(HiveError::Inference("mock inference failure".to_string()));
        }
        if let Some(reply) = &self.reply {
            return Ok(reply.clone());
        }
        let first_line = request.prompt.lines().next().unwrap_or("").trim();
        Ok(format!("[mock:{}] {}", request.model, first_line))
    }

    async fn embed(&self, text: &str, _model: &str) -> Result<Vec<f32>> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed.load(Ordering::SeqCst) {
            return Err(HiveError::Inference("mock embedding failure".to_string()));
        }
        Ok(mock_embedding(text))
    }
}
