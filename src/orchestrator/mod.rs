//! 编排层：能力识别 -> 计划构建 -> 协调执行 -> 结果汇总

pub mod activity;
pub mod coordinator;
pub mod plan;
pub mod runner;
pub mod signals;
pub mod synthesizer;

use serde::{Deserialize, Serialize};

pub use activity::{ActivityEvent, ActivityReporter};
pub use coordinator::{CoordinationOutcome, ExecutionCoordinator, StepOutcome};
pub use plan::{ExecutionMode, ExecutionPlan, PlanBuilder, PlanError, PlanStep, StepId};
pub use runner::{BackendHealth, Backends, Orchestrator, RunOutcome, RunStatus};
pub use signals::{CapabilityDetector, CapabilityRequirements, KeywordTable};
pub use synthesizer::ResultSynthesizer;

/// 步骤失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// 任一步骤失败即整体失败，不返回部分结果
    #[default]
    Abort,
    /// 记录每步结局，渲染部分报告；依赖失败的步骤被跳过
    Partial,
}
