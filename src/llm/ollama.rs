//! Ollama 推理后端
//!
//! - 生成：POST {base}/api/generate（stream=false，取 response 字段）
//! - 向量化：POST {base}/api/embeddings（取 embedding 字段）
//! - 健康检查：GET {base}/api/tags

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{HiveError, Result};
use crate::llm::{GenerateRequest, InferenceBackend};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

#[derive(Debug, Serialize)]
struct OllamaGenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    system: &'a str,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "no_images")]
    images: &'a [String],
}

fn no_images(images: &&[String]) -> bool {
    images.is_empty()
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    top_p: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaGenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbeddingRequest<'a> {
    model: &'a str,
    prompt: &'a str,
}

#[derive(Debug, Deserialize)]
struct OllamaEmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Ollama 客户端：持有 reqwest Client、采样参数与分项超时
#[derive(Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    base_url: String,
    temperature: f32,
    top_p: f32,
    generate_timeout: Duration,
    embed_timeout: Duration,
}

impl OllamaBackend {
    pub fn new(base_url: Option<&str>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url
                .unwrap_or(DEFAULT_OLLAMA_URL)
                .trim_end_matches('/')
                .to_string(),
            temperature: 0.7,
            top_p: 0.9,
            generate_timeout: Duration::from_secs(600),
            embed_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_sampling(mut self, temperature: f32, top_p: f32) -> Self {
        self.temperature = temperature;
        self.top_p = top_p;
        self
    }

    pub fn with_timeouts(mut self, generate: Duration, embed: Duration) -> Self {
        self.generate_timeout = generate;
        self.embed_timeout = embed;
        self
    }
}

#[async_trait]
impl InferenceBackend for OllamaBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        let body = OllamaGenerateRequest {
            model: &request.model,
            prompt: &request.prompt,
            system: &request.system_prompt,
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
                top_p: self.top_p,
            },
            images: &request.images,
        };

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .timeout(self.generate_timeout)
            .json(&body)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| HiveError::Inference(e.to_string()))?;

        let data: OllamaGenerateResponse = response
            .json()
            .await
            .map_err(|e| HiveError::Inference(e.to_string()))?;
        tracing::debug!(model = %request.model, chars = data.response.len(), "ollama generate done");
        Ok(data.response)
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let response = self
            .client
            .post(format!("{}/api/embeddings", self.base_url))
            .timeout(self.embed_timeout)
            .json(&OllamaEmbeddingRequest {
                model,
                prompt: text,
            })
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| HiveError::Inference(e.to_string()))?;

        let data: OllamaEmbeddingResponse = response
            .json()
            .await
            .map_err(|e| HiveError::Inference(e.to_string()))?;
        Ok(data.embedding)
    }

    async fn health(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                tracing::debug!("ollama health check failed: {}", e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_payload_shape() {
        let images: Vec<String> = vec![];
        let body = OllamaGenerateRequest {
            model: "qwen3-vl:4b",
            prompt: "hi",
            system: "sys",
            stream: false,
            options: OllamaOptions {
                temperature: 0.5,
                top_p: 0.9,
            },
            images: &images,
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["model"], "qwen3-vl:4b");
        assert_eq!(v["system"], "sys");
        assert_eq!(v["stream"], false);
        assert_eq!(v["options"]["temperature"], 0.5);
        // 无图片时不发送 images 字段
        assert!(v.get("images").is_none());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let backend = OllamaBackend::new(Some("http://gpu-box:11434/"));
        assert_eq!(backend.base_url, "http://gpu-box:11434");
    }

    #[test]
    fn test_missing_fields_default_empty() {
        let r: OllamaGenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(r.response.is_empty());
        let e: OllamaEmbeddingResponse = serde_json::from_str(r#"{"embedding":[0.5,1.0]}"#).unwrap();
        assert_eq!(e.embedding, vec![0.5, 1.0]);
    }
}
