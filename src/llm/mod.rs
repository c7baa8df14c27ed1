//! 推理层：后端抽象与实现（Ollama / OpenAI 兼容 / Mock）

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

use std::sync::Arc;
use std::time::Duration;

pub use mock::MockInference;
pub use ollama::OllamaBackend;
pub use openai::OpenAiBackend;
pub use traits::{GenerateRequest, InferenceBackend};

use crate::config::LlmSection;

/// 根据配置选择推理后端（Ollama / OpenAI 兼容 / Mock）
pub fn create_inference_from_config(cfg: &LlmSection) -> Arc<dyn InferenceBackend> {
    match cfg.provider.to_lowercase().as_str() {
        "openai" => {
            tracing::info!("Using OpenAI-compatible inference backend");
            Arc::new(OpenAiBackend::new(
                cfg.base_url.as_deref(),
                cfg.api_key.as_deref(),
            ))
        }
        "mock" => {
            tracing::warn!("Using mock inference backend");
            Arc::new(MockInference::new())
        }
        other => {
            if other != "ollama" {
                tracing::warn!("Unknown llm provider '{}', falling back to ollama", other);
            }
            tracing::info!("Using Ollama inference backend");
            Arc::new(
                OllamaBackend::new(cfg.base_url.as_deref())
                    .with_sampling(cfg.temperature, cfg.top_p)
                    .with_timeouts(
                        Duration::from_secs(cfg.timeouts.generate),
                        Duration::from_secs(cfg.timeouts.embed),
                    ),
            )
        }
    }
}
