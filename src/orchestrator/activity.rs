//! 活动事件流：分析、计划、步骤开始/结束、汇总等进度通知

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// 一条进度事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// 事件来源，如 "Orchestrator" 或执行器展示名
    pub source: String,
    pub message: String,
    pub is_error: bool,
    pub timestamp: DateTime<Utc>,
}

/// 事件发布端；未配置通道或没有订阅者时静默丢弃
#[derive(Debug, Clone, Default)]
pub struct ActivityReporter {
    tx: Option<broadcast::Sender<ActivityEvent>>,
}

impl ActivityReporter {
    pub fn new(tx: broadcast::Sender<ActivityEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    /// 不发布任何事件
    pub fn disabled() -> Self {
        Self::default()
    }

    /// 新建通道并返回 (reporter, receiver)
    pub fn channel(capacity: usize) -> (Self, broadcast::Receiver<ActivityEvent>) {
        let (tx, rx) = broadcast::channel(capacity.max(1));
        (Self::new(tx), rx)
    }

    pub fn subscribe(&self) -> Option<broadcast::Receiver<ActivityEvent>> {
        self.tx.as_ref().map(|tx| tx.subscribe())
    }

    pub fn report(&self, source: &str, message: impl Into<String>) {
        self.emit(source, message.into(), false);
    }

    pub fn report_error(&self, source: &str, message: impl Into<String>) {
        self.emit(source, message.into(), true);
    }

    fn emit(&self, source: &str, message: String, is_error: bool) {
        let Some(tx) = &self.tx else { return };
        let event = ActivityEvent {
            source: source.to_string(),
            message,
            is_error,
            timestamp: Utc::now(),
        };
        // 没有订阅者时 send 返回 Err，忽略
        let _ = tx.send(event);
    }
}
