//! Hive - Rust 多执行器编排引擎
//!
//! 模块划分：
//! - **cache**: 结果缓存（Redis / 内存）与缓存键
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型
//! - **executors**: 文档分析、信息检索、知识库检索三个执行器
//! - **llm**: 推理后端抽象与实现（Ollama / OpenAI 兼容 / Mock）
//! - **observability**: 日志初始化
//! - **orchestrator**: 能力识别、计划构建、协调执行、结果汇总
//! - **vector**: 向量检索后端（Qdrant / 内存）

pub mod cache;
pub mod config;
pub mod core;
pub mod executors;
pub mod llm;
pub mod observability;
pub mod orchestrator;
pub mod vector;

pub use crate::core::{HiveError, Result};
pub use executors::{ExecutionContext, ExecutorKind, ExecutorResult};
pub use orchestrator::{Orchestrator, RunOutcome, RunStatus};
