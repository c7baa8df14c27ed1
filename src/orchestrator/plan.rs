//! 执行计划：步骤、依赖与执行模式
//!
//! 计划构建后不可变。依赖只能指向 id 更小、且已存在的步骤，
//! 在 ExecutionPlan::new 中校验，因此计划天然无环。

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::HiveError;
use crate::executors::ExecutorKind;
use crate::orchestrator::signals::CapabilityRequirements;

/// 每个步骤的预估耗时（仅供展示，不参与调度）
pub const PER_STEP_ESTIMATE: Duration = Duration::from_millis(1000);

/// 步骤 ID：计划内唯一的正整数
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(pub u32);

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    #[default]
    Sequential,
    Parallel,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Sequential => "sequential",
            ExecutionMode::Parallel => "parallel",
        }
    }
}

/// 计划中的一个步骤，绑定一种执行器
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: StepId,
    pub executor: ExecutorKind,
    pub depends_on: Vec<StepId>,
    pub action: String,
    pub rationale: String,
}

impl PlanStep {
    pub fn is_independent(&self) -> bool {
        self.depends_on.is_empty()
    }
}

/// 计划校验错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    #[error("step id must be positive")]
    ZeroId,
    #[error("duplicate step id {0}")]
    DuplicateId(StepId),
    #[error("executor {0} appears in more than one step")]
    DuplicateExecutor(ExecutorKind),
    #[error("step {step} depends on {dependency}, which is not an earlier step")]
    NonForwardDependency { step: StepId, dependency: StepId },
}

impl From<PlanError> for HiveError {
    fn from(e: PlanError) -> Self {
        HiveError::InvalidPlan(e.to_string())
    }
}

/// 执行计划；反序列化同样经过 `ExecutionPlan::new` 校验
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawPlan")]
pub struct ExecutionPlan {
    steps: Vec<PlanStep>,
    executors: Vec<ExecutorKind>,
    mode: ExecutionMode,
    estimated_duration_ms: u64,
}

/// 序列化形态；`executors` 与耗时估算由步骤重新推导
#[derive(Deserialize)]
struct RawPlan {
    steps: Vec<PlanStep>,
    #[serde(default)]
    mode: ExecutionMode,
}

impl TryFrom<RawPlan> for ExecutionPlan {
    type Error = PlanError;

    fn try_from(raw: RawPlan) -> Result<Self, Self::Error> {
        ExecutionPlan::new(raw.steps, raw.mode)
    }
}

impl ExecutionPlan {
    /// 校验后构建：ID 为正且唯一、每种执行器至多一步、依赖只指向更早出现且 ID 更小的步骤
    pub fn new(steps: Vec<PlanStep>, mode: ExecutionMode) -> Result<Self, PlanError> {
        let mut seen_ids = HashSet::new();
        let mut seen_kinds = HashSet::new();
        for step in &steps {
            if step.id.0 == 0 {
                return Err(PlanError::ZeroId);
            }
            for dep in &step.depends_on {
                if *dep >= step.id || !seen_ids.contains(dep) {
                    return Err(PlanError::NonForwardDependency {
                        step: step.id,
                        dependency: *dep,
                    });
                }
            }
            if !seen_ids.insert(step.id) {
                return Err(PlanError::DuplicateId(step.id));
            }
            if !seen_kinds.insert(step.executor) {
                return Err(PlanError::DuplicateExecutor(step.executor));
            }
        }
        Ok(Self::assemble(steps, mode))
    }

    /// 不做校验的组装，供构建器及测试使用
    pub(crate) fn assemble(steps: Vec<PlanStep>, mode: ExecutionMode) -> Self {
        let mut executors: Vec<ExecutorKind> = steps.iter().map(|s| s.executor).collect();
        executors.sort();
        executors.dedup();
        let estimated_duration_ms = PER_STEP_ESTIMATE.as_millis() as u64 * steps.len() as u64;
        Self {
            steps,
            executors,
            mode,
            estimated_duration_ms,
        }
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn step(&self, id: StepId) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_for(&self, kind: ExecutorKind) -> Option<&PlanStep> {
        self.steps.iter().find(|s| s.executor == kind)
    }

    /// 参与的执行器种类（按计划顺序）
    pub fn executors(&self) -> &[ExecutorKind] {
        &self.executors
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn estimated_duration(&self) -> Duration {
        Duration::from_millis(self.estimated_duration_ms)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 无依赖步骤，保持计划顺序
    pub fn independent_steps(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(|s| s.is_independent())
    }

    /// 有依赖步骤，保持计划顺序
    pub fn dependent_steps(&self) -> impl Iterator<Item = &PlanStep> {
        self.steps.iter().filter(|s| !s.is_independent())
    }
}

/// 计划构建器：固定拓扑顺序 文档分析 -> 信息检索 -> 知识库检索
///
/// 信息检索从不依赖文档分析；知识库检索仅在文档分析在计划中时依赖它。
#[derive(Debug, Default)]
pub struct PlanBuilder {
    steps: Vec<PlanStep>,
}

impl PlanBuilder {
    pub fn build(requirements: &CapabilityRequirements) -> ExecutionPlan {
        let mut builder = PlanBuilder::default();

        let document_step = requirements.document_analysis.then(|| {
            builder.push(
                ExecutorKind::DocumentAnalysis,
                Vec::new(),
                "Extract and analyze text from document",
                "Request mentions a document or text extraction",
            )
        });

        if requirements.information_lookup {
            builder.push(
                ExecutorKind::InformationLookup,
                Vec::new(),
                "Search for relevant information",
                "Request requires external information lookup",
            );
        }

        if requirements.knowledge_retrieval {
            builder.push(
                ExecutorKind::KnowledgeRetrieval,
                document_step.into_iter().collect(),
                "Query knowledge base for context",
                "Knowledge base consultation grounds every response",
            );
        }

        let mode = if requirements.complexity() > 1 {
            ExecutionMode::Parallel
        } else {
            ExecutionMode::Sequential
        };
        let plan = ExecutionPlan::assemble(builder.steps, mode);
        debug_assert!(ExecutionPlan::new(plan.steps.clone(), mode).is_ok());
        plan
    }

    /// 追加步骤，ID 为当前步数 + 1
    fn push(
        &mut self,
        executor: ExecutorKind,
        depends_on: Vec<StepId>,
        action: &str,
        rationale: &str,
    ) -> StepId {
        let id = StepId(self.steps.len() as u32 + 1);
        self.steps.push(PlanStep {
            id,
            executor,
            depends_on,
            action: action.to_string(),
            rationale: rationale.to_string(),
        });
        id
    }
}
