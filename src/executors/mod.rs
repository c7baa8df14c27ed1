//! 任务执行器：文档分析、信息检索、知识库检索
//!
//! 三个执行器共享同一契约 `execute(query, context) -> ExecutorResult`，
//! 只会因外部服务（推理 / 向量库 / 缓存）失败而失败，内部不重试。

pub mod document;
pub mod lookup;
pub mod retrieval;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::Result;

pub use document::{detect_document_type, DocumentAnalysisExecutor};
pub use lookup::InformationLookupExecutor;
pub use retrieval::{rank_hits, KnowledgeRetrievalExecutor, RetrievalHit, RetrievalSettings};

/// 执行器种类；声明顺序即计划中的拓扑顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorKind {
    DocumentAnalysis,
    InformationLookup,
    KnowledgeRetrieval,
}

impl ExecutorKind {
    pub const ALL: [ExecutorKind; 3] = [
        ExecutorKind::DocumentAnalysis,
        ExecutorKind::InformationLookup,
        ExecutorKind::KnowledgeRetrieval,
    ];

    /// 展示名
    pub fn label(&self) -> &'static str {
        match self {
            ExecutorKind::DocumentAnalysis => "Document Analysis",
            ExecutorKind::InformationLookup => "Information Lookup",
            ExecutorKind::KnowledgeRetrieval => "Knowledge Retrieval",
        }
    }

    /// 作为依赖步骤时，从前置步骤结果中取来覆盖到 context 的字段
    pub fn consumed_fields(&self) -> &'static [&'static str] {
        match self {
            ExecutorKind::KnowledgeRetrieval => &["text"],
            _ => &[],
        }
    }
}

impl std::fmt::Display for ExecutorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// 调用方传入的自由格式上下文（JSON 对象）
///
/// 识别的键：`text`（附带的文档文本 / 补充上下文）、`collections`（检索的集合名列表）、
/// `images`（base64 图片，转交给视觉模型）。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext(serde_json::Map<String, serde_json::Value>);

impl ExecutionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.insert("text", serde_json::Value::String(text.into()));
        self
    }

    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let list = collections
            .into_iter()
            .map(|c| serde_json::Value::String(c.into()))
            .collect();
        self.insert("collections", serde_json::Value::Array(list));
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `text` 字段（非字符串视为缺失）
    pub fn text(&self) -> Option<&str> {
        self.0.get("text").and_then(|v| v.as_str())
    }

    /// `collections` 字段；缺失、为空或不是字符串数组时返回 None
    pub fn collections(&self) -> Option<Vec<String>> {
        let list: Vec<String> = self
            .0
            .get("collections")?
            .as_array()?
            .iter()
            .filter_map(|v| v.as_str())
            .map(String::from)
            .collect();
        if list.is_empty() {
            None
        } else {
            Some(list)
        }
    }

    pub fn images(&self) -> Vec<String> {
        self.0
            .get("images")
            .and_then(|v| v.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }
}

/// 文档分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    /// 实际分析的文本（也是下游知识检索读取的 `text` 字段）
    pub text: String,
    pub analysis: String,
    pub confidence: f32,
    pub detected_type: String,
    pub model: String,
    pub duration_secs: f64,
}

/// 信息检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InformationLookup {
    pub query: String,
    pub full_response: String,
    pub model: String,
    pub duration_secs: f64,
}

/// 知识库检索结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeRetrieval {
    pub response: String,
    pub hit_count: usize,
    /// 跨集合合并后的前 N 条命中，按分数降序
    #[serde(default)]
    pub hits: Vec<RetrievalHit>,
    pub collections_searched: Vec<String>,
    pub model: String,
    pub embedding_model: String,
    pub duration_secs: f64,
}

/// 单次执行器调用的产出
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "executor", rename_all = "snake_case")]
pub enum ExecutorResult {
    DocumentAnalysis(DocumentAnalysis),
    InformationLookup(InformationLookup),
    KnowledgeRetrieval(KnowledgeRetrieval),
}

impl ExecutorResult {
    pub fn kind(&self) -> ExecutorKind {
        match self {
            ExecutorResult::DocumentAnalysis(_) => ExecutorKind::DocumentAnalysis,
            ExecutorResult::InformationLookup(_) => ExecutorKind::InformationLookup,
            ExecutorResult::KnowledgeRetrieval(_) => ExecutorKind::KnowledgeRetrieval,
        }
    }

    pub fn model(&self) -> &str {
        match self {
            ExecutorResult::DocumentAnalysis(r) => &r.model,
            ExecutorResult::InformationLookup(r) => &r.model,
            ExecutorResult::KnowledgeRetrieval(r) => &r.model,
        }
    }

    pub fn duration_secs(&self) -> f64 {
        match self {
            ExecutorResult::DocumentAnalysis(r) => r.duration_secs,
            ExecutorResult::InformationLookup(r) => r.duration_secs,
            ExecutorResult::KnowledgeRetrieval(r) => r.duration_secs,
        }
    }

    /// 供依赖步骤读取的输出字段
    pub fn output_field(&self, name: &str) -> Option<serde_json::Value> {
        match (self, name) {
            (ExecutorResult::DocumentAnalysis(r), "text") => {
                Some(serde_json::Value::String(r.text.clone()))
            }
            (ExecutorResult::InformationLookup(r), "text") => {
                Some(serde_json::Value::String(r.full_response.clone()))
            }
            _ => None,
        }
    }
}

/// 执行器 trait
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    fn kind(&self) -> ExecutorKind;

    async fn execute(&self, query: &str, context: &ExecutionContext) -> Result<ExecutorResult>;
}

/// 执行器注册表：每种 kind 至多一个执行器
#[derive(Clone, Default)]
pub struct ExecutorSet {
    executors: HashMap<ExecutorKind, Arc<dyn TaskExecutor>>,
}

impl ExecutorSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册执行器，同 kind 的旧执行器被替换
    pub fn register(&mut self, executor: Arc<dyn TaskExecutor>) {
        self.executors.insert(executor.kind(), executor);
    }

    pub fn with(mut self, executor: Arc<dyn TaskExecutor>) -> Self {
        self.register(executor);
        self
    }

    pub fn get(&self, kind: ExecutorKind) -> Option<Arc<dyn TaskExecutor>> {
        self.executors.get(&kind).cloned()
    }

    pub fn kinds(&self) -> Vec<ExecutorKind> {
        let mut kinds: Vec<_> = self.executors.keys().copied().collect();
        kinds.sort();
        kinds
    }
}

/// 计时执行，返回 (结果, 耗时秒)
pub(crate) async fn timed<F, T>(fut: F) -> (T, f64)
where
    F: Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    (out, start.elapsed().as_secs_f64())
}
