//! 结果汇总：把各执行器结果渲染成一份确定性的文本报告
//!
//! 报告结构：执行摘要、按 文档分析 -> 信息检索 -> 知识库检索 顺序的分节、固定结语。
//! 总耗时由调用方报告，不在此计算。

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::executors::{ExecutorKind, ExecutorResult};
use crate::orchestrator::coordinator::CoordinationOutcome;
use crate::orchestrator::plan::ExecutionPlan;

pub struct ResultSynthesizer {
    orchestrator_model: String,
}

impl ResultSynthesizer {
    pub fn new(orchestrator_model: impl Into<String>) -> Self {
        Self {
            orchestrator_model: orchestrator_model.into(),
        }
    }

    /// 全部步骤成功时的报告
    pub fn synthesize(
        &self,
        results: &BTreeMap<ExecutorKind, ExecutorResult>,
        plan: &ExecutionPlan,
        query: &str,
    ) -> String {
        self.render(results, &BTreeMap::new(), plan, query)
    }

    /// 由协调结果渲染，失败/跳过的步骤单独成节
    pub fn synthesize_outcome(
        &self,
        outcome: &CoordinationOutcome,
        plan: &ExecutionPlan,
        query: &str,
    ) -> String {
        self.render(&outcome.results(), &outcome.failures(), plan, query)
    }

    fn render(
        &self,
        results: &BTreeMap<ExecutorKind, ExecutorResult>,
        failures: &BTreeMap<ExecutorKind, String>,
        plan: &ExecutionPlan,
        query: &str,
    ) -> String {
        let mut out = String::from("=== ORCHESTRATION REPORT ===\n\n");
        let executors: Vec<&str> = plan.executors().iter().map(|k| k.label()).collect();

        // String 的 fmt::Write 不会失败
        let _ = writeln!(out, "Request: {query}\n");
        out.push_str("EXECUTION SUMMARY:\n");
        let _ = writeln!(out, "- Orchestrator Model: {}", self.orchestrator_model);
        let _ = writeln!(out, "- Total Steps: {}", plan.len());
        let _ = writeln!(out, "- Executors Used: {}", executors.join(", "));
        let _ = writeln!(out, "- Execution Mode: {}\n", plan.mode().as_str());

        for kind in ExecutorKind::ALL {
            if let Some(result) = results.get(&kind) {
                render_section(&mut out, result);
            } else if let Some(error) = failures.get(&kind) {
                let _ = writeln!(out, "{} FAILED:", kind.label().to_uppercase());
                let _ = writeln!(out, "- Error: {error}\n");
            }
        }

        out.push_str("CONCLUSION:\n");
        if failures.is_empty() {
            let _ = writeln!(out, "All {} planned steps completed successfully.", plan.len());
        } else {
            let _ = writeln!(
                out,
                "{} of {} planned steps completed; {} did not complete.",
                results.len(),
                plan.len(),
                failures.len()
            );
        }
        out
    }
}

fn render_section(out: &mut String, result: &ExecutorResult) {
    let _ = writeln!(out, "{} RESULTS:", result.kind().label().to_uppercase());
    let _ = writeln!(out, "- Model: {}", result.model());
    match result {
        ExecutorResult::DocumentAnalysis(r) => {
            let _ = writeln!(out, "- Document Type: {}", r.detected_type);
            let _ = writeln!(out, "- Confidence: {:.0}%", r.confidence * 100.0);
            let _ = writeln!(out, "- Analysis:\n{}\n", r.analysis);
        }
        ExecutorResult::InformationLookup(r) => {
            let _ = writeln!(out, "{}\n", r.full_response);
        }
        ExecutorResult::KnowledgeRetrieval(r) => {
            let _ = writeln!(out, "- Embedding Model: {}", r.embedding_model);
            let _ = writeln!(out, "- Vector Search Results: {}", r.hit_count);
            let _ = writeln!(
                out,
                "- Collections Searched: {}",
                r.collections_searched.join(", ")
            );
            let _ = writeln!(out, "\nResponse:\n{}\n", r.response);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executors::{DocumentAnalysis, InformationLookup, KnowledgeRetrieval};
    use crate::orchestrator::plan::PlanBuilder;
    use crate::orchestrator::signals::CapabilityDetector;

    fn results() -> BTreeMap<ExecutorKind, ExecutorResult> {
        let mut map = BTreeMap::new();
        map.insert(
            ExecutorKind::KnowledgeRetrieval,
            ExecutorResult::KnowledgeRetrieval(KnowledgeRetrieval {
                response: "KB says hello".into(),
                hit_count: 0,
                hits: Vec::new(),
                collections_searched: vec!["a".into(), "b".into()],
                model: "rag".into(),
                embedding_model: "embed".into(),
                duration_secs: 1.0,
            }),
        );
        map.insert(
            ExecutorKind::DocumentAnalysis,
            ExecutorResult::DocumentAnalysis(DocumentAnalysis {
                text: "t".into(),
                analysis: "Total 42".into(),
                confidence: 0.95,
                detected_type: "invoice".into(),
                model: "vision".into(),
                duration_secs: 1.0,
            }),
        );
        map.insert(
            ExecutorKind::InformationLookup,
            ExecutorResult::InformationLookup(InformationLookup {
                query: "q".into(),
                full_response: "Prices vary".into(),
                model: "llm".into(),
                duration_secs: 1.0,
            }),
        );
        map
    }

    #[test]
    fn test_report_sections_in_order() {
        let plan = PlanBuilder::build(&CapabilityDetector::default().detect("extract and find"));
        let report = ResultSynthesizer::new("master").synthesize(&results(), &plan, "q");

        let doc = report.find("DOCUMENT ANALYSIS RESULTS:").unwrap();
        let info = report.find("INFORMATION LOOKUP RESULTS:").unwrap();
        let rag = report.find("KNOWLEDGE RETRIEVAL RESULTS:").unwrap();
        let end = report.find("CONCLUSION:").unwrap();
        assert!(doc < info && info < rag && rag < end);

        assert!(report.contains("- Orchestrator Model: master"));
        assert!(report.contains("- Total Steps: 3"));
        assert!(report.contains(
            "- Executors Used: Document Analysis, Information Lookup, Knowledge Retrieval"
        ));
        assert!(report.contains("- Execution Mode: parallel"));
        assert!(report.contains("- Confidence: 95%"));
        assert!(report.contains("- Collections Searched: a, b"));
        assert!(report.ends_with("All 3 planned steps completed successfully.\n"));
    }

    #[test]
    fn test_only_present_sections_rendered() {
        let plan = PlanBuilder::build(&CapabilityDetector::default().detect("hello"));
        let mut map = results();
        map.retain(|k, _| *k == ExecutorKind::KnowledgeRetrieval);
        let report = ResultSynthesizer::new("m").synthesize(&map, &plan, "hello");
        assert!(!report.contains("DOCUMENT ANALYSIS"));
        assert!(!report.contains("INFORMATION LOOKUP"));
        assert!(report.contains("- Execution Mode: sequential"));
        assert!(report.contains("All 1 planned steps completed successfully."));
    }

    #[test]
    fn test_deterministic() {
        let plan = PlanBuilder::build(&CapabilityDetector::default().detect("scan, research"));
        let s = ResultSynthesizer::new("m");
        assert_eq!(
            s.synthesize(&results(), &plan, "q"),
            s.synthesize(&results(), &plan, "q")
        );
    }

    #[test]
    fn test_failed_sections_rendered() {
        let plan = PlanBuilder::build(&CapabilityDetector::default().detect("extract and find"));
        let mut map = results();
        map.remove(&ExecutorKind::DocumentAnalysis);
        map.remove(&ExecutorKind::KnowledgeRetrieval);
        let mut failures = BTreeMap::new();
        failures.insert(ExecutorKind::DocumentAnalysis, "model offline".to_string());
        failures.insert(
            ExecutorKind::KnowledgeRetrieval,
            "dependency not completed: Document Analysis".to_string(),
        );
        let report = ResultSynthesizer::new("m").render(&map, &failures, &plan, "q");
        assert!(report.contains("DOCUMENT ANALYSIS FAILED:\n- Error: model offline"));
        assert!(report.contains("INFORMATION LOOKUP RESULTS:"));
        assert!(report.ends_with("1 of 3 planned steps completed; 2 did not complete.\n"));
    }
}
