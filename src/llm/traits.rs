//! 推理后端抽象
//!
//! 所有后端（Ollama / OpenAI 兼容 / Mock）实现 InferenceBackend：generate（单次生成）、embed（文本向量化）。
//! 后端失败原样返回 HiveError::Inference，调用方不做重试。

use async_trait::async_trait;

use crate::core::Result;

/// 单次生成请求：prompt + system prompt + 模型，可附带 base64 图片（视觉模型）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_prompt: String,
    pub model: String,
    pub images: Vec<String>,
}

impl GenerateRequest {
    pub fn new(
        prompt: impl Into<String>,
        system_prompt: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: system_prompt.into(),
            model: model.into(),
            images: Vec::new(),
        }
    }

    pub fn with_images(mut self, images: Vec<String>) -> Self {
        self.images = images;
        self
    }
}

/// 推理后端 trait
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// 非流式生成，返回完整文本
    async fn generate(&self, request: &GenerateRequest) -> Result<String>;

    /// 文本向量化
    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>>;

    /// 连通性检查；默认认为可用
    async fn health(&self) -> bool {
        true
    }
}
