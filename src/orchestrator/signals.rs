//! 能力信号识别
//!
//! 对请求文本做确定性的关键词判定，得到三项能力需求；知识库检索恒为需要。
//! 关键词表是数据（可由 [routing] 配置替换），各能力独立判定，一个请求可以同时触发多项。

use serde::{Deserialize, Serialize};

use crate::executors::{ExecutionContext, ExecutorKind};

/// 各能力的触发关键词（匹配前统一转小写）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTable {
    pub document_analysis: Vec<String>,
    pub information_lookup: Vec<String>,
}

impl KeywordTable {
    pub fn new(document_analysis: Vec<String>, information_lookup: Vec<String>) -> Self {
        Self {
            document_analysis: document_analysis.into_iter().map(|k| k.to_lowercase()).collect(),
            information_lookup: information_lookup.into_iter().map(|k| k.to_lowercase()).collect(),
        }
    }

    fn matches(keywords: &[String], text: &str) -> bool {
        keywords.iter().any(|k| !k.is_empty() && text.contains(k.as_str()))
    }
}

impl Default for KeywordTable {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            document_analysis: words(&["document", "text", "extract", "read", "scan"]),
            information_lookup: words(&["search", "find", "information", "lookup", "research"]),
        }
    }
}

/// 一次请求的能力需求，计算后不再变化
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityRequirements {
    pub document_analysis: bool,
    pub information_lookup: bool,
    pub knowledge_retrieval: bool,
}

impl CapabilityRequirements {
    /// 为真的需求数（1-3）
    pub fn complexity(&self) -> usize {
        [
            self.document_analysis,
            self.information_lookup,
            self.knowledge_retrieval,
        ]
        .iter()
        .filter(|b| **b)
        .count()
    }

    pub fn requires(&self, kind: ExecutorKind) -> bool {
        match kind {
            ExecutorKind::DocumentAnalysis => self.document_analysis,
            ExecutorKind::InformationLookup => self.information_lookup,
            ExecutorKind::KnowledgeRetrieval => self.knowledge_retrieval,
        }
    }

    /// 可解释的一行路由摘要
    pub fn summary(&self) -> String {
        format!(
            "Request requires {} executors. Document analysis: {}, Information lookup: {}, Knowledge retrieval: {}",
            self.complexity(),
            self.document_analysis,
            self.information_lookup,
            self.knowledge_retrieval
        )
    }
}

/// 能力信号识别器
#[derive(Debug, Clone, Default)]
pub struct CapabilityDetector {
    keywords: KeywordTable,
}

impl CapabilityDetector {
    pub fn new(keywords: KeywordTable) -> Self {
        Self { keywords }
    }

    pub fn keywords(&self) -> &KeywordTable {
        &self.keywords
    }

    /// 只看请求文本；空文本只得到必需的知识库检索
    pub fn detect(&self, query: &str) -> CapabilityRequirements {
        let lower = query.to_lowercase();
        CapabilityRequirements {
            document_analysis: KeywordTable::matches(&self.keywords.document_analysis, &lower),
            information_lookup: KeywordTable::matches(&self.keywords.information_lookup, &lower),
            knowledge_retrieval: true,
        }
    }

    /// 在 detect 基础上：调用方附带了非空文档文本时，同样需要文档分析
    pub fn detect_with_context(
        &self,
        query: &str,
        context: &ExecutionContext,
    ) -> CapabilityRequirements {
        let mut requirements = self.detect(query);
        if context.text().is_some_and(|t| !t.trim().is_empty()) {
            requirements.document_analysis = true;
        }
        requirements
    }
}
