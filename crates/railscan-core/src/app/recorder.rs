//! AnalysisRecorder - 解析結果を受け取った後の流れ
//!
//! 1. 履歴に保存（失敗してもユーザーの操作は止めない）
//! 2. 結果に応じたトーストを出す

use std::sync::Arc;

use crate::domain::{AnalysisResult, HistoryEntry};
use crate::history::HistoryStore;
use crate::notify::NotificationBus;

/// Shown when the backend gave no reason for a failure.
pub const DEFAULT_FAILURE_REASON: &str =
    "Error connecting to the server. Please ensure the backend is running.";

const ALL_CLEAR: &str = "Analysis Complete: No critical defects found.";

#[derive(Clone)]
pub struct AnalysisRecorder {
    history: Arc<HistoryStore>,
    bus: NotificationBus,
}

impl AnalysisRecorder {
    pub fn new(history: Arc<HistoryStore>, bus: NotificationBus) -> Self {
        Self { history, bus }
    }

    /// Save a successful analysis and tell the user what was found.
    pub fn record(&self, result: AnalysisResult) -> HistoryEntry {
        let defects = result.defect_count();
        let entry = self.history.append(result.into_payload());

        if defects > 0 {
            self.bus.warning(format!("Safety Alert: {defects} defect(s) detected."));
        } else {
            self.bus.success(ALL_CLEAR);
        }
        tracing::info!(id = %entry.id(), defects, "analysis recorded");
        entry
    }

    /// Tell the user an analysis request failed. Nothing is saved.
    pub fn report_failure(&self, reason: Option<&str>) {
        let reason = reason.unwrap_or(DEFAULT_FAILURE_REASON);
        tracing::warn!(reason, "analysis failed");
        self.bus.error(format!("Analysis Failed: {reason}"));
    }
}
