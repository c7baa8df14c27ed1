//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `HIVE__*` 覆盖（双下划线表示嵌套，如 `HIVE__LLM__PROVIDER=ollama`）。
//! 所有段均有默认值，缺省时与线上部署的默认参数一致。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::Result;
use crate::orchestrator::{FailurePolicy, KeywordTable};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub vector: VectorSection,
    pub cache: CacheSection,
    pub routing: RoutingSection,
    pub prompts: PromptsSection,
}

/// [app] 段：汇总中展示的模型、失败策略、整体超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 汇总报告中展示的编排模型
    pub orchestrator_model: String,
    /// abort：任一步骤失败即整体失败；partial：保留成功步骤并生成部分报告
    pub failure_policy: FailurePolicy,
    /// 整个计划的执行期限（秒），未设置则不限
    pub plan_timeout_secs: Option<u64>,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            orchestrator_model: default_model(),
            failure_policy: FailurePolicy::default(),
            plan_timeout_secs: None,
        }
    }
}

impl AppSection {
    pub fn plan_timeout(&self) -> Option<Duration> {
        self.plan_timeout_secs.map(Duration::from_secs)
    }
}

pub(crate) fn default_model() -> String {
    "qwen3-vl:4b".to_string()
}

fn default_embedding_model() -> String {
    "qwen3-embedding:8b".to_string()
}

/// [llm] 段：推理后端选择、各执行器模型、采样参数与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：ollama / openai / mock
    pub provider: String,
    /// 未设置时按 provider 取默认地址
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub models: LlmModelsSection,
    pub temperature: f32,
    pub top_p: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: None,
            api_key: None,
            models: LlmModelsSection::default(),
            temperature: 0.7,
            top_p: 0.9,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

/// [llm.models] 段：每类执行器使用的模型
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmModelsSection {
    pub document: String,
    pub lookup: String,
    pub retrieval: String,
    pub embedding: String,
}

impl Default for LlmModelsSection {
    fn default() -> Self {
        Self {
            document: default_model(),
            lookup: default_model(),
            retrieval: default_model(),
            embedding: default_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 生成请求超时（秒）
    pub generate: u64,
    /// 向量化请求超时（秒）
    pub embed: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            generate: 600,
            embed: 120,
        }
    }
}

/// [vector] 段：向量库地址、默认集合、检索条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VectorSection {
    pub url: String,
    /// context 未指定 collections 时检索的集合
    pub default_collection: String,
    /// 每个集合的检索条数
    pub per_collection_limit: usize,
    /// 跨集合合并后保留的条数
    pub top_n: usize,
    pub timeout_secs: u64,
}

impl Default for VectorSection {
    fn default() -> Self {
        Self {
            url: "http://localhost:6333".to_string(),
            default_collection: "documents".to_string(),
            per_collection_limit: 3,
            top_n: 5,
            timeout_secs: 30,
        }
    }
}

/// [cache] 段：缓存后端与 TTL（秒）
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSection {
    /// 后端：redis / memory
    pub backend: String,
    pub url: String,
    /// 键前缀，隔离同一 Redis 中的其他数据
    pub prefix: String,
    /// 信息检索与知识库检索结果的 TTL
    pub ttl_medium: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self {
            backend: "redis".to_string(),
            url: "redis://127.0.0.1:6379/0".to_string(),
            prefix: "hive:".to_string(),
            ttl_medium: 1800,
        }
    }
}

/// [routing] 段：能力识别关键词表
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RoutingSection {
    pub document_analysis: Vec<String>,
    pub information_lookup: Vec<String>,
}

impl Default for RoutingSection {
    fn default() -> Self {
        let table = KeywordTable::default();
        Self {
            document_analysis: table.document_analysis,
            information_lookup: table.information_lookup,
        }
    }
}

impl RoutingSection {
    pub fn keyword_table(&self) -> KeywordTable {
        KeywordTable::new(
            self.document_analysis.clone(),
            self.information_lookup.clone(),
        )
    }
}

/// [prompts] 段：各执行器的 system prompt
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PromptsSection {
    pub document: String,
    pub lookup: String,
    pub retrieval: String,
}

impl Default for PromptsSection {
    fn default() -> Self {
        Self {
            document: "You are an OCR analysis agent. Extract and structure information from documents accurately.".to_string(),
            lookup: "You are an information gathering agent. Synthesize web search results into clear, accurate summaries.".to_string(),
            retrieval: "You are a RAG (Retrieval-Augmented Generation) agent. Combine vector search results and knowledge base information to provide accurate, contextual responses.".to_string(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 HIVE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 HIVE__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("HIVE")
            .separator("__")
            .try_parsing(true),
    );

    Ok(builder.build()?.try_deserialize()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_deployment() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.llm.provider, "ollama");
        assert_eq!(cfg.llm.models.embedding, "qwen3-embedding:8b");
        assert_eq!(cfg.vector.default_collection, "documents");
        assert_eq!(cfg.vector.per_collection_limit, 3);
        assert_eq!(cfg.vector.top_n, 5);
        assert_eq!(cfg.cache.ttl_medium, 1800);
        assert_eq!(cfg.app.failure_policy, FailurePolicy::Abort);
        assert!(cfg.app.plan_timeout().is_none());
        assert!(cfg.routing.document_analysis.contains(&"scan".to_string()));
    }

    #[test]
    fn test_load_from_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[app]
failure_policy = "partial"
plan_timeout_secs = 45

[llm]
provider = "mock"

[llm.models]
lookup = "llama3.2"

[vector]
top_n = 2

[routing]
information_lookup = ["google"]
"#
        )
        .unwrap();

        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.app.failure_policy, FailurePolicy::Partial);
        assert_eq!(cfg.app.plan_timeout(), Some(Duration::from_secs(45)));
        assert_eq!(cfg.llm.provider, "mock");
        assert_eq!(cfg.llm.models.lookup, "llama3.2");
        assert_eq!(cfg.llm.models.document, "qwen3-vl:4b");
        assert_eq!(cfg.vector.top_n, 2);
        assert_eq!(cfg.routing.information_lookup, vec!["google".to_string()]);
        // 未覆盖的键保持默认
        assert_eq!(cfg.cache.prefix, "hive:");
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[vector]\ntop_n = \"many\"").unwrap();

        let err = load_config(Some(file.path().to_path_buf())).unwrap_err();
        assert!(matches!(err, crate::core::HiveError::Config(_)), "{err:?}");
    }
}
