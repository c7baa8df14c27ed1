//! 编排入口：识别 -> 计划 -> 协调执行 -> 汇总
//!
//! 整个协调过程可选地受计划级截止时间与 CancellationToken 约束。

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{create_cache_from_config, CacheBackend};
use crate::config::AppConfig;
use crate::core::{HiveError, Result};
use crate::executors::{
    DocumentAnalysisExecutor, ExecutionContext, ExecutorKind, ExecutorResult, ExecutorSet,
    InformationLookupExecutor, KnowledgeRetrievalExecutor, RetrievalSettings,
};
use crate::llm::{create_inference_from_config, InferenceBackend};
use crate::orchestrator::activity::ActivityReporter;
use crate::orchestrator::coordinator::ExecutionCoordinator;
use crate::orchestrator::plan::{ExecutionPlan, PlanBuilder};
use crate::orchestrator::signals::{CapabilityDetector, CapabilityRequirements};
use crate::orchestrator::synthesizer::ResultSynthesizer;
use crate::orchestrator::FailurePolicy;
use crate::vector::{create_vector_search_from_config, VectorSearch};

const SOURCE: &str = "Orchestrator";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// 计划内全部步骤完成
    Success,
    /// 部分步骤失败或被跳过（仅 Partial 策略）
    Partial,
}

/// 一次请求的完整产出
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub query: String,
    pub requirements: CapabilityRequirements,
    pub plan: ExecutionPlan,
    pub results: BTreeMap<ExecutorKind, ExecutorResult>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub failures: BTreeMap<ExecutorKind, String>,
    pub final_report: String,
    pub duration_secs: f64,
    pub status: RunStatus,
}

/// 后端连通性；未注入后端时对应项为 false
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendHealth {
    pub inference: bool,
    pub vector_search: bool,
    pub cache: bool,
}

impl BackendHealth {
    pub fn all_ok(&self) -> bool {
        self.inference && self.vector_search && self.cache
    }
}

/// 注入给执行器的共享后端
#[derive(Clone)]
pub struct Backends {
    pub inference: Arc<dyn InferenceBackend>,
    pub vector: Arc<dyn VectorSearch>,
    pub cache: Arc<dyn CacheBackend>,
}

impl Backends {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            inference: create_inference_from_config(&cfg.llm),
            vector: create_vector_search_from_config(&cfg.vector),
            cache: create_cache_from_config(&cfg.cache),
        }
    }

    /// 按配置构建三个执行器
    pub fn executors(&self, cfg: &AppConfig) -> ExecutorSet {
        let models = &cfg.llm.models;
        let ttl = Duration::from_secs(cfg.cache.ttl_medium);
        let retrieval = RetrievalSettings {
            model: models.retrieval.clone(),
            embedding_model: models.embedding.clone(),
            system_prompt: cfg.prompts.retrieval.clone(),
            default_collection: cfg.vector.default_collection.clone(),
            per_collection_limit: cfg.vector.per_collection_limit,
            top_n: cfg.vector.top_n,
            ttl,
        };

        ExecutorSet::new()
            .with(Arc::new(DocumentAnalysisExecutor::new(
                self.inference.clone(),
                &models.document,
                &cfg.prompts.document,
            )))
            .with(Arc::new(InformationLookupExecutor::new(
                self.inference.clone(),
                self.cache.clone(),
                &models.lookup,
                &cfg.prompts.lookup,
                ttl,
            )))
            .with(Arc::new(KnowledgeRetrievalExecutor::new(
                self.inference.clone(),
                self.vector.clone(),
                self.cache.clone(),
                retrieval,
            )))
    }
}

/// 编排器
pub struct Orchestrator {
    detector: CapabilityDetector,
    coordinator: ExecutionCoordinator,
    synthesizer: ResultSynthesizer,
    reporter: ActivityReporter,
    plan_timeout: Option<Duration>,
    backends: Option<Backends>,
}

impl Orchestrator {
    pub fn new(executors: ExecutorSet) -> Self {
        Self {
            detector: CapabilityDetector::default(),
            coordinator: ExecutionCoordinator::new(executors),
            synthesizer: ResultSynthesizer::new(crate::config::default_model()),
            reporter: ActivityReporter::disabled(),
            plan_timeout: None,
            backends: None,
        }
    }

    /// 按配置创建后端并装配
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self::from_backends(cfg, Backends::from_config(cfg))
    }

    /// 使用给定后端装配（测试或嵌入场景）
    pub fn from_backends(cfg: &AppConfig, backends: Backends) -> Self {
        Self::new(backends.executors(cfg))
            .with_detector(CapabilityDetector::new(cfg.routing.keyword_table()))
            .with_policy(cfg.app.failure_policy)
            .with_plan_timeout(cfg.app.plan_timeout())
            .with_orchestrator_model(&cfg.app.orchestrator_model)
            .with_backends(backends)
    }

    pub fn with_detector(mut self, detector: CapabilityDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.coordinator = self.coordinator.with_policy(policy);
        self
    }

    pub fn with_plan_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.plan_timeout = timeout;
        self
    }

    pub fn with_orchestrator_model(mut self, model: impl Into<String>) -> Self {
        self.synthesizer = ResultSynthesizer::new(model);
        self
    }

    pub fn with_reporter(mut self, reporter: ActivityReporter) -> Self {
        self.coordinator = self.coordinator.with_reporter(reporter.clone());
        self.reporter = reporter;
        self
    }

    pub fn with_backends(mut self, backends: Backends) -> Self {
        self.backends = Some(backends);
        self
    }

    pub fn detector(&self) -> &CapabilityDetector {
        &self.detector
    }

    pub async fn run(&self, query: &str, context: Option<ExecutionContext>) -> Result<RunOutcome> {
        self.run_with_cancel(query, context, CancellationToken::new())
            .await
    }

    /// 处理一次请求；取消返回 Cancelled，超过计划截止时间返回 Timeout
    pub async fn run_with_cancel(
        &self,
        query: &str,
        context: Option<ExecutionContext>,
        cancel: CancellationToken,
    ) -> Result<RunOutcome> {
        let start = Instant::now();
        let run_id = Uuid::new_v4();
        let context = context.unwrap_or_default();

        self.reporter.report(SOURCE, "Analyzing request...");
        let requirements = self.detector.detect_with_context(query, &context);
        info!(%run_id, "{}", requirements.summary());

        self.reporter.report(SOURCE, "Creating execution plan...");
        let plan = PlanBuilder::build(&requirements);
        info!(
            %run_id,
            steps = plan.len(),
            mode = plan.mode().as_str(),
            "execution plan created"
        );
        self.reporter.report(
            SOURCE,
            format!(
                "Execution plan created: {} steps, {} mode",
                plan.len(),
                plan.mode().as_str()
            ),
        );

        let coordination = with_deadline(
            self.coordinator.execute(&plan, query, Some(&context)),
            self.plan_timeout,
        );
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(HiveError::Cancelled),
            result = coordination => result,
        };
        let outcome = match outcome {
            Ok(o) => o,
            Err(e) => {
                warn!(%run_id, error = %e, "orchestration failed");
                self.reporter.report_error(SOURCE, format!("Execution failed: {e}"));
                return Err(e);
            }
        };

        self.reporter.report(SOURCE, "Synthesizing results...");
        let final_report = self.synthesizer.synthesize_outcome(&outcome, &plan, query);
        let status = if outcome.is_complete() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };
        let duration_secs = start.elapsed().as_secs_f64();
        info!(%run_id, ?status, duration_ms = (duration_secs * 1000.0) as u64, "run finished");
        self.reporter.report(SOURCE, "Synthesis complete.");

        Ok(RunOutcome {
            run_id,
            query: query.to_string(),
            requirements,
            plan,
            results: outcome.results(),
            failures: outcome.failures(),
            final_report,
            duration_secs,
            status,
        })
    }

    /// 并发探测各后端，从不失败
    pub async fn health(&self) -> BackendHealth {
        let Some(b) = &self.backends else {
            return BackendHealth::default();
        };
        let (inference, vector_search, cache) =
            tokio::join!(b.inference.health(), b.vector.health(), b.cache.health());
        BackendHealth {
            inference,
            vector_search,
            cache,
        }
    }
}

async fn with_deadline<F, T>(fut: F, limit: Option<Duration>) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| HiveError::Timeout(limit))?,
        None => fut.await,
    }
}
