//! 执行协调器：两阶段屏障
//!
//! 1. 无依赖步骤：Parallel 模式且多于一个时并发启动并等待全部结束，否则按计划顺序逐个执行
//! 2. 有依赖步骤：按计划顺序执行，输入为调用方 context 的副本叠加依赖步骤的输出字段
//!
//! 失败策略见 [`FailurePolicy`]：Abort 下任一步骤失败即整体失败且不返回任何结果；
//! Partial 下记录每步结局，依赖失败的步骤被跳过。

use std::collections::BTreeMap;
use std::time::Instant;

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};

use crate::core::{HiveError, Result};
use crate::executors::{ExecutionContext, ExecutorKind, ExecutorResult, ExecutorSet};
use crate::orchestrator::activity::ActivityReporter;
use crate::orchestrator::plan::{ExecutionMode, ExecutionPlan, PlanStep};
use crate::orchestrator::FailurePolicy;

/// 单个步骤的结局
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum StepOutcome {
    Completed { result: ExecutorResult },
    Failed { error: String },
    /// 依赖步骤未完成，未执行
    Skipped { reason: String },
}

impl StepOutcome {
    pub fn result(&self) -> Option<&ExecutorResult> {
        match self {
            StepOutcome::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, StepOutcome::Completed { .. })
    }
}

/// 一次协调的全部步骤结局，键为执行器种类（按计划顺序）
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CoordinationOutcome {
    outcomes: BTreeMap<ExecutorKind, StepOutcome>,
}

impl CoordinationOutcome {
    pub fn outcomes(&self) -> &BTreeMap<ExecutorKind, StepOutcome> {
        &self.outcomes
    }

    pub fn get(&self, kind: ExecutorKind) -> Option<&StepOutcome> {
        self.outcomes.get(&kind)
    }

    /// 已完成步骤的结果
    pub fn results(&self) -> BTreeMap<ExecutorKind, ExecutorResult> {
        self.outcomes
            .iter()
            .filter_map(|(kind, o)| o.result().map(|r| (*kind, r.clone())))
            .collect()
    }

    /// 失败或被跳过的步骤及原因
    pub fn failures(&self) -> BTreeMap<ExecutorKind, String> {
        self.outcomes
            .iter()
            .filter_map(|(kind, o)| match o {
                StepOutcome::Completed { .. } => None,
                StepOutcome::Failed { error } => Some((*kind, error.clone())),
                StepOutcome::Skipped { reason } => Some((*kind, reason.clone())),
            })
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.outcomes.values().all(StepOutcome::is_completed)
    }

    fn record(&mut self, kind: ExecutorKind, outcome: StepOutcome) {
        self.outcomes.insert(kind, outcome);
    }
}

/// 执行协调器
#[derive(Clone)]
pub struct ExecutionCoordinator {
    executors: ExecutorSet,
    policy: FailurePolicy,
    reporter: ActivityReporter,
}

impl ExecutionCoordinator {
    pub fn new(executors: ExecutorSet) -> Self {
        Self {
            executors,
            policy: FailurePolicy::default(),
            reporter: ActivityReporter::disabled(),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_reporter(mut self, reporter: ActivityReporter) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// 按计划执行；Abort 策略下首个失败（按计划顺序）原样返回
    pub async fn execute(
        &self,
        plan: &ExecutionPlan,
        query: &str,
        context: Option<&ExecutionContext>,
    ) -> Result<CoordinationOutcome> {
        // 任何步骤开始前确认执行器齐全
        if let Some(missing) = plan
            .executors()
            .iter()
            .find(|kind| self.executors.get(**kind).is_none())
        {
            return Err(HiveError::InvalidPlan(format!(
                "no executor registered for {missing}"
            )));
        }

        let base = context.cloned().unwrap_or_default();
        let mut outcome = CoordinationOutcome::default();

        // 阶段一：无依赖步骤
        let independent: Vec<&PlanStep> = plan.independent_steps().collect();
        let phase_one = if plan.mode() == ExecutionMode::Parallel && independent.len() > 1 {
            tracing::debug!(steps = independent.len(), "fan-out independent steps");
            join_all(independent.iter().map(|step| self.run_step(step, query, &base))).await
        } else {
            let mut results = Vec::with_capacity(independent.len());
            for step in &independent {
                let result = self.run_step(step, query, &base).await;
                let failed = result.is_err();
                results.push(result);
                if failed && self.policy == FailurePolicy::Abort {
                    break;
                }
            }
            results
        };

        for (step, result) in independent.iter().zip(phase_one) {
            self.settle(&mut outcome, step, result)?;
        }

        // 阶段二：有依赖步骤，依赖结果已全部就绪
        for step in plan.dependent_steps() {
            let pending: Vec<String> = step
                .depends_on
                .iter()
                .filter_map(|dep| plan.step(*dep))
                .filter(|dep| !outcome.get(dep.executor).is_some_and(StepOutcome::is_completed))
                .map(|dep| dep.executor.to_string())
                .collect();
            if !pending.is_empty() {
                let reason = format!("dependency not completed: {}", pending.join(", "));
                if self.policy == FailurePolicy::Abort {
                    return Err(HiveError::InvalidPlan(format!(
                        "step {} ({}): {reason}",
                        step.id, step.executor
                    )));
                }
                tracing::warn!(step = step.id.0, executor = %step.executor, %reason, "step skipped");
                self.reporter
                    .report_error(step.executor.label(), format!("Skipped: {reason}"));
                outcome.record(step.executor, StepOutcome::Skipped { reason });
                continue;
            }

            let step_context = Self::overlay_dependencies(plan, step, &base, &outcome);
            let result = self.run_step(step, query, &step_context).await;
            self.settle(&mut outcome, step, result)?;
        }

        Ok(outcome)
    }

    /// 复制调用方 context，叠加依赖步骤中本步骤消费的字段
    fn overlay_dependencies(
        plan: &ExecutionPlan,
        step: &PlanStep,
        base: &ExecutionContext,
        outcome: &CoordinationOutcome,
    ) -> ExecutionContext {
        let mut context = base.clone();
        for dep in step.depends_on.iter().filter_map(|id| plan.step(*id)) {
            let Some(result) = outcome.get(dep.executor).and_then(StepOutcome::result) else {
                continue;
            };
            for field in step.executor.consumed_fields() {
                if let Some(value) = result.output_field(field) {
                    context.insert(*field, value);
                }
            }
        }
        context
    }

    /// 记录步骤结局；Abort 策略下失败直接返回
    fn settle(
        &self,
        outcome: &mut CoordinationOutcome,
        step: &PlanStep,
        result: Result<ExecutorResult>,
    ) -> Result<()> {
        match result {
            Ok(result) => {
                outcome.record(step.executor, StepOutcome::Completed { result });
                Ok(())
            }
            Err(e) if self.policy == FailurePolicy::Abort => Err(e),
            Err(e) => {
                outcome.record(
                    step.executor,
                    StepOutcome::Failed {
                        error: e.to_string(),
                    },
                );
                Ok(())
            }
        }
    }

    async fn run_step(
        &self,
        step: &PlanStep,
        query: &str,
        context: &ExecutionContext,
    ) -> Result<ExecutorResult> {
        let executor = self.executors.get(step.executor).ok_or_else(|| {
            HiveError::InvalidPlan(format!("no executor registered for {}", step.executor))
        })?;

        self.reporter
            .report(step.executor.label(), format!("Starting: {}", step.action));
        let start = Instant::now();
        let result = executor.execute(query, context).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let ok = result.is_ok();
        let outcome = match &result {
            Ok(_) => "ok".to_string(),
            Err(e) => e.to_string(),
        };
        let audit = serde_json::json!({
            "event": "step_audit",
            "step": step.id.0,
            "executor": step.executor,
            "ok": ok,
            "outcome": outcome,
            "duration_ms": duration_ms,
        });
        tracing::info!(audit = %audit.to_string(), "step");

        match &result {
            Ok(_) => self.reporter.report(step.executor.label(), "Completed"),
            Err(e) => self
                .reporter
                .report_error(step.executor.label(), format!("Failed: {e}")),
        }
        result
    }
}
