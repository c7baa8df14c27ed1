//! OpenAI 兼容推理后端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）：chat completions 做生成，/embeddings 做向量化，/models 做健康检查。
//! 图片输入仅 Ollama 视觉模型支持，这里忽略。

use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
};
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::core::{HiveError, Result};
use crate::llm::{GenerateRequest, InferenceBackend};

/// OpenAI 兼容客户端；模型由每次请求指定
#[derive(Clone)]
pub struct OpenAiBackend {
    client: Client<OpenAIConfig>,
}

impl OpenAiBackend {
    pub fn new(base_url: Option<&str>, api_key: Option<&str>) -> Self {
        let api_key = api_key
            .map(String::from)
            .or_else(|| std::env::var("OPENAI_API_KEY").ok())
            .unwrap_or_else(|| "sk-placeholder".to_string());

        let config = if let Some(url) = base_url {
            OpenAIConfig::new().with_api_base(url).with_api_key(api_key)
        } else {
            OpenAIConfig::new().with_api_key(api_key)
        };

        Self {
            client: Client::with_config(config),
        }
    }

    fn to_messages(request: &GenerateRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(ChatCompletionRequestMessage::System(
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(request.system_prompt.clone())
                    .build()
                    .map_err(|e| HiveError::Inference(e.to_string()))?,
            ));
        }
        messages.push(ChatCompletionRequestMessage::User(
            ChatCompletionRequestUserMessageArgs::default()
                .content(request.prompt.clone())
                .build()
                .map_err(|e| HiveError::Inference(e.to_string()))?,
        ));
        Ok(messages)
    }
}

#[async_trait]
impl InferenceBackend for OpenAiBackend {
    async fn generate(&self, request: &GenerateRequest) -> Result<String> {
        if !request.images.is_empty() {
            tracing::debug!(count = request.images.len(), "openai backend ignores images");
        }
        let chat = CreateChatCompletionRequestArgs::default()
            .model(&request.model)
            .messages(Self::to_messages(request)?)
            .build()
            .map_err(|e| HiveError::Inference(e.to_string()))?;

        let response = self
            .client
            .chat()
            .create(chat)
            .await
            .map_err(|e| HiveError::Inference(e.to_string()))?;

        Ok(response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default())
    }

    async fn embed(&self, text: &str, model: &str) -> Result<Vec<f32>> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| HiveError::Inference(e.to_string()))?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| HiveError::Inference(e.to_string()))?;
        Ok(response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .unwrap_or_default())
    }

    /// 列出模型作为连通性检查
    async fn health(&self) -> bool {
        match tokio::time::timeout(Duration::from_secs(5), self.client.models().list()).await {
            Ok(Ok(_)) => true,
            Ok(Err(e)) => {
                tracing::debug!("openai health check failed: {}", e);
                false
            }
            Err(_) => {
                tracing::debug!("openai health check timed out");
                false
            }
        }
    }
}
