//! 文档分析执行器
//!
//! 分析 context 中附带的文档文本（既无文本也无图片时退回到请求文本本身），调用一次推理后端，
//! 另用固定子串规则在本地猜测文档类别。不走缓存：每份文档文本都视为唯一。

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Result;
use crate::executors::{
    timed, DocumentAnalysis, ExecutionContext, ExecutorKind, ExecutorResult, TaskExecutor,
};
use crate::llm::{GenerateRequest, InferenceBackend};

/// 固定置信度，模型输出中的自评分不采信
pub const DOCUMENT_CONFIDENCE: f32 = 0.95;

/// 按优先级排列的类别关键字
const DOCUMENT_TYPES: [&str; 4] = ["invoice", "receipt", "contract", "report"];

/// 本地文档类别猜测：invoice / receipt / contract / report，否则 general document
pub fn detect_document_type(text: &str) -> &'static str {
    let lower = text.to_lowercase();
    DOCUMENT_TYPES
        .iter()
        .find(|t| lower.contains(*t))
        .copied()
        .unwrap_or("general document")
}

pub struct DocumentAnalysisExecutor {
    inference: Arc<dyn InferenceBackend>,
    model: String,
    system_prompt: String,
}

impl DocumentAnalysisExecutor {
    pub fn new(
        inference: Arc<dyn InferenceBackend>,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            inference,
            model: model.into(),
            system_prompt: system_prompt.into(),
        }
    }

    fn build_prompt(query: &str, text: &str) -> String {
        format!(
            r#"Analyze the following text and images based on the user's query: "{query}".
Document Text: "{text}"

Provide your analysis in the following format:
Document Type: [type]
Confidence: [0-1]
Key Information: [bullet points of extracted data]"#
        )
    }
}

#[async_trait]
impl TaskExecutor for DocumentAnalysisExecutor {
    fn kind(&self) -> ExecutorKind {
        ExecutorKind::DocumentAnalysis
    }

    async fn execute(&self, query: &str, context: &ExecutionContext) -> Result<ExecutorResult> {
        let images = context.images();
        // 既无文本也无图片时才以查询本身作为分析对象
        let text = match context.text().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ if !images.is_empty() => String::new(),
            _ => {
                tracing::debug!("no document text or images in context, analysing the query itself");
                query.to_string()
            }
        };

        let request = GenerateRequest::new(
            Self::build_prompt(query, &text),
            self.system_prompt.clone(),
            self.model.clone(),
        )
        .with_images(images);

        let (analysis, duration_secs) = timed(self.inference.generate(&request)).await;
        let analysis = analysis?;

        tracing::info!(
            executor = "document_analysis",
            duration_ms = (duration_secs * 1000.0) as u64,
            "executor finished"
        );

        Ok(ExecutorResult::DocumentAnalysis(DocumentAnalysis {
            detected_type: detect_document_type(&text).to_string(),
            text,
            analysis,
            confidence: DOCUMENT_CONFIDENCE,
            model: self.model.clone(),
            duration_secs,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockInference;

    #[test]
    fn test_detect_document_type() {
        assert_eq!(detect_document_type("INVOICE #42"), "invoice");
        assert_eq!(detect_document_type("store receipt"), "receipt");
        assert_eq!(detect_document_type("rental contract"), "contract");
        assert_eq!(detect_document_type("quarterly report"), "report");
        assert_eq!(detect_document_type("hello there"), "general document");
        // 多个关键字同时出现时按固定优先级
        assert_eq!(detect_document_type("report on the invoice"), "invoice");
    }

    #[tokio::test]
    async fn test_analyses_context_text_when_present() {
        let mock = Arc::new(MockInference::with_reply("Document Type: receipt"));
        let executor = DocumentAnalysisExecutor::new(mock.clone(), "vision", "sys");
        let ctx = ExecutionContext::new().with_text("Coffee shop receipt, total $4");

        let result = executor.execute("read this", &ctx).await.unwrap();
        let ExecutorResult::DocumentAnalysis(doc) = result else {
            panic!("unexpected result kind");
        };
        assert_eq!(doc.text, "Coffee shop receipt, total $4");
        assert_eq!(doc.detected_type, "receipt");
        assert_eq!(doc.analysis, "Document Type: receipt");
        assert_eq!(doc.confidence, DOCUMENT_CONFIDENCE);
        assert_eq!(doc.model, "vision");
        assert_eq!(mock.generate_calls(), 1);
    }

    #[tokio::test]
    async fn test_falls_back_to_query_and_never_caches() {
        let mock = Arc::new(MockInference::new());
        let executor = DocumentAnalysisExecutor::new(mock.clone(), "vision", "sys");
        let ctx = ExecutionContext::new().with_text("   ");

        let first = executor.execute("extract the invoice total", &ctx).await.unwrap();
        executor.execute("extract the invoice total", &ctx).await.unwrap();
        assert_eq!(mock.generate_calls(), 2);

        let ExecutorResult::DocumentAnalysis(doc) = first else {
            panic!("unexpected result kind");
        };
        assert_eq!(doc.text, "extract the invoice total");
        assert_eq!(doc.detected_type, "invoice");
    }

    #[tokio::test]
    async fn test_images_without_text_do_not_fall_back_to_query() {
        let mock = Arc::new(MockInference::new());
        let executor = DocumentAnalysisExecutor::new(mock.clone(), "vision", "sys");
        let mut ctx = ExecutionContext::new();
        ctx.insert("images", serde_json::json!(["aW1hZ2U="]));

        let ExecutorResult::DocumentAnalysis(doc) =
            executor.execute("extract the invoice total", &ctx).await.unwrap()
        else {
            panic!("unexpected result kind");
        };
        assert_eq!(doc.text, "");
        assert_eq!(doc.detected_type, "general document");
        assert_eq!(mock.generate_calls(), 1);
    }

    #[tokio::test]
    async fn test_inference_failure_propagates() {
        let executor =
            DocumentAnalysisExecutor::new(Arc::new(MockInference::failing()), "vision", "sys");
        let err = executor
            .execute("scan", &ExecutionContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, crate::core::HiveError::Inference(_)));
    }
}
