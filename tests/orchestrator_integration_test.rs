//! 编排集成测试：识别 -> 计划 -> 执行 -> 汇总 全链路

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use hive::cache::InMemoryCache;
use hive::config::AppConfig;
use hive::executors::{
    DocumentAnalysis, ExecutorSet, InformationLookup, KnowledgeRetrieval, TaskExecutor,
};
use hive::llm::mock::mock_embedding;
use hive::llm::MockInference;
use hive::orchestrator::{
    ActivityReporter, Backends, ExecutionMode, FailurePolicy, Orchestrator, RunStatus,
};
use hive::vector::InMemoryVectorStore;
use hive::{ExecutionContext, ExecutorKind, ExecutorResult, HiveError, Result};

/// 返回固定文本的执行器
struct FixedExecutor {
    kind: ExecutorKind,
    fail: bool,
    calls: AtomicUsize,
}

impl FixedExecutor {
    fn ok(kind: ExecutorKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail: false,
            calls: AtomicUsize::new(0),
        })
    }

    fn failing(kind: ExecutorKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            fail: true,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TaskExecutor for FixedExecutor {
    fn kind(&self) -> ExecutorKind {
        self.kind
    }

    async fn execute(&self, query: &str, _context: &ExecutionContext) -> Result<ExecutorResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(HiveError::Inference("connection refused".into()));
        }
        Ok(match self.kind {
            ExecutorKind::DocumentAnalysis => ExecutorResult::DocumentAnalysis(DocumentAnalysis {
                text: "Invoice #2024-001 Widget x3 $120".into(),
                analysis: "FIXED DOCUMENT ANALYSIS".into(),
                confidence: 0.95,
                detected_type: "invoice".into(),
                model: "vision".into(),
                duration_secs: 0.1,
            }),
            ExecutorKind::InformationLookup => {
                ExecutorResult::InformationLookup(InformationLookup {
                    query: query.into(),
                    full_response: "FIXED LOOKUP RESPONSE".into(),
                    model: "llm".into(),
                    duration_secs: 0.1,
                })
            }
            ExecutorKind::KnowledgeRetrieval => {
                ExecutorResult::KnowledgeRetrieval(KnowledgeRetrieval {
                    response: "FIXED RETRIEVAL RESPONSE".into(),
                    hit_count: 0,
                    hits: Vec::new(),
                    collections_searched: vec!["documents".into()],
                    model: "llm".into(),
                    embedding_model: "embed".into(),
                    duration_secs: 0.1,
                })
            }
        })
    }
}

struct Fixed {
    doc: Arc<FixedExecutor>,
    info: Arc<FixedExecutor>,
    rag: Arc<FixedExecutor>,
}

impl Fixed {
    fn new(doc: Arc<FixedExecutor>) -> Self {
        Self {
            doc,
            info: FixedExecutor::ok(ExecutorKind::InformationLookup),
            rag: FixedExecutor::ok(ExecutorKind::KnowledgeRetrieval),
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            ExecutorSet::new()
                .with(self.doc.clone())
                .with(self.info.clone())
                .with(self.rag.clone()),
        )
        .with_orchestrator_model("master")
    }
}

const INVOICE_QUERY: &str = "extract text from this invoice and find related pricing information";

#[tokio::test]
async fn test_invoice_request_end_to_end() {
    let fixed = Fixed::new(FixedExecutor::ok(ExecutorKind::DocumentAnalysis));
    let outcome = fixed.orchestrator().run(INVOICE_QUERY, None).await.unwrap();

    assert!(outcome.requirements.document_analysis);
    assert!(outcome.requirements.information_lookup);
    assert!(outcome.requirements.knowledge_retrieval);
    assert_eq!(outcome.plan.len(), 3);
    assert_eq!(outcome.plan.mode(), ExecutionMode::Parallel);
    assert_eq!(outcome.status, RunStatus::Success);
    assert_eq!(outcome.results.len(), 3);
    assert!(outcome.failures.is_empty());

    let report = &outcome.final_report;
    let doc = report.find("FIXED DOCUMENT ANALYSIS").unwrap();
    let info = report.find("FIXED LOOKUP RESPONSE").unwrap();
    let rag = report.find("FIXED RETRIEVAL RESPONSE").unwrap();
    assert!(doc < info && info < rag);
    assert!(report.ends_with("CONCLUSION:\nAll 3 planned steps completed successfully.\n"));
}

#[tokio::test]
async fn test_document_failure_returns_error_only() {
    let fixed = Fixed::new(FixedExecutor::failing(ExecutorKind::DocumentAnalysis));
    let err = fixed.orchestrator().run(INVOICE_QUERY, None).await.unwrap_err();

    assert_eq!(err, HiveError::Inference("connection refused".into()));
    assert_eq!(fixed.doc.calls(), 1);
    assert_eq!(fixed.rag.calls(), 0);
}

#[tokio::test]
async fn test_partial_policy_renders_partial_report() {
    let fixed = Fixed::new(FixedExecutor::failing(ExecutorKind::DocumentAnalysis));
    let orchestrator = fixed.orchestrator().with_policy(FailurePolicy::Partial);
    let outcome = orchestrator.run(INVOICE_QUERY, None).await.unwrap();

    assert_eq!(outcome.status, RunStatus::Partial);
    assert_eq!(
        outcome.results.keys().copied().collect::<Vec<_>>(),
        vec![ExecutorKind::InformationLookup]
    );
    assert_eq!(outcome.failures.len(), 2);
    assert!(outcome.final_report.contains("DOCUMENT ANALYSIS FAILED:"));
    assert!(outcome.final_report.contains("KNOWLEDGE RETRIEVAL FAILED:"));
    assert_eq!(fixed.rag.calls(), 0);

    let v = serde_json::to_value(&outcome).unwrap();
    assert_eq!(v["status"], "partial");
    assert!(v["failures"]["document_analysis"]
        .as_str()
        .unwrap()
        .contains("connection refused"));
}

#[tokio::test]
async fn test_plain_question_runs_retrieval_only() {
    let fixed = Fixed::new(FixedExecutor::ok(ExecutorKind::DocumentAnalysis));
    let outcome = fixed
        .orchestrator()
        .run("what is the capital of France?", None)
        .await
        .unwrap();

    assert_eq!(outcome.plan.len(), 1);
    assert_eq!(outcome.plan.mode(), ExecutionMode::Sequential);
    assert_eq!(
        outcome.results.keys().copied().collect::<Vec<_>>(),
        vec![ExecutorKind::KnowledgeRetrieval]
    );
    assert_eq!(fixed.doc.calls(), 0);
    assert_eq!(fixed.info.calls(), 0);
}

#[tokio::test]
async fn test_activity_events_cover_the_run() {
    let fixed = Fixed::new(FixedExecutor::ok(ExecutorKind::DocumentAnalysis));
    let (reporter, mut rx) = ActivityReporter::channel(64);
    let orchestrator = fixed.orchestrator().with_reporter(reporter);
    orchestrator.run("hello", None).await.unwrap();

    let mut messages = Vec::new();
    while let Ok(event) = rx.try_recv() {
        messages.push(event.message);
    }
    assert_eq!(messages.first().map(String::as_str), Some("Analyzing request..."));
    assert_eq!(messages.last().map(String::as_str), Some("Synthesis complete."));
    assert!(messages.iter().any(|m| m == "Completed"));
}

fn seeded_store() -> Arc<InMemoryVectorStore> {
    let store = Arc::new(InMemoryVectorStore::new());
    for (collection, id, text) in [
        ("invoices", "inv-1", "Widget unit price $40"),
        ("invoices", "inv-2", "Gadget unit price $15"),
        ("contracts", "c-1", "Supplier agreement for widgets"),
    ] {
        store.add_point(collection, id, mock_embedding(text), json!({ "text": text }));
    }
    store
}

#[tokio::test]
async fn test_full_pipeline_with_in_memory_backends() {
    let inference = Arc::new(MockInference::new());
    let backends = Backends {
        inference: inference.clone(),
        vector: seeded_store(),
        cache: Arc::new(InMemoryCache::new()),
    };
    let orchestrator = Orchestrator::from_backends(&AppConfig::default(), backends);
    let context = ExecutionContext::new()
        .with_text("INVOICE #2024-001: 3 widgets, total $120")
        .with_collections(["invoices", "contracts"]);

    let first = orchestrator
        .run(INVOICE_QUERY, Some(context.clone()))
        .await
        .unwrap();
    assert_eq!(first.status, RunStatus::Success);

    let Some(ExecutorResult::DocumentAnalysis(doc)) =
        first.results.get(&ExecutorKind::DocumentAnalysis)
    else {
        panic!("missing document analysis");
    };
    assert_eq!(doc.detected_type, "invoice");

    let Some(ExecutorResult::KnowledgeRetrieval(rag)) =
        first.results.get(&ExecutorKind::KnowledgeRetrieval)
    else {
        panic!("missing knowledge retrieval");
    };
    assert_eq!(rag.hit_count, 3);
    assert_eq!(rag.hits.len(), 3);
    assert!(rag
        .hits
        .windows(2)
        .all(|w| w[0].relevance_score >= w[1].relevance_score));
    assert_eq!(rag.collections_searched, vec!["contracts", "invoices"]);

    // 3 次 generate（每个执行器一次）+ 1 次 embed
    assert_eq!(inference.generate_calls(), 3);
    assert_eq!(inference.embed_calls(), 1);

    // 再次运行：文档分析不缓存，其余两个命中缓存
    let second = orchestrator.run(INVOICE_QUERY, Some(context)).await.unwrap();
    assert_eq!(inference.generate_calls(), 4);
    assert_eq!(inference.embed_calls(), 1);

    for kind in [ExecutorKind::InformationLookup, ExecutorKind::KnowledgeRetrieval] {
        assert_eq!(
            serde_json::to_string(&first.results[&kind]).unwrap(),
            serde_json::to_string(&second.results[&kind]).unwrap(),
            "{kind} should be served from cache"
        );
    }
}

#[tokio::test]
async fn test_broken_collection_does_not_sink_the_plan() {
    let store = seeded_store();
    store.set_failing("contracts");
    let backends = Backends {
        inference: Arc::new(MockInference::new()),
        vector: store,
        cache: Arc::new(InMemoryCache::new()),
    };
    let orchestrator = Orchestrator::from_backends(&AppConfig::default(), backends);
    let context = ExecutionContext::new().with_collections(["invoices", "contracts"]);

    let outcome = orchestrator.run("hello", Some(context)).await.unwrap();
    let Some(ExecutorResult::KnowledgeRetrieval(rag)) =
        outcome.results.get(&ExecutorKind::KnowledgeRetrieval)
    else {
        panic!("missing knowledge retrieval");
    };
    assert_eq!(rag.hit_count, 2);
    assert!(rag.hits.iter().all(|h| h.source_collection == "invoices"));
    let mut ids: Vec<&str> = rag.hits.iter().map(|h| h.id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["inv-1", "inv-2"]);
}

#[tokio::test]
async fn test_inference_outage_fails_the_run() {
    let backends = Backends {
        inference: Arc::new(MockInference::failing()),
        vector: seeded_store(),
        cache: Arc::new(InMemoryCache::new()),
    };
    let orchestrator = Orchestrator::from_backends(&AppConfig::default(), backends);
    let err = orchestrator.run("find widget prices", None).await.unwrap_err();
    assert!(matches!(err, HiveError::Inference(_)));
}
