//! 批次状态模型
//!
//! 所有派生视图都是 `items` 上的纯函数，不保存隐藏状态

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::upload_item::{ItemStatus, UploadItem};

/// 默认最大并发上传数
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 2;

/// 批次状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Idle,
    Selecting,
    Ready,
    Processing,
    Paused,
    Completed,
    Cancelled,
}

impl BatchStatus {
    /// 批次已经结束（不会再自行变化）
    pub fn is_settled(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// 批次状态快照
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchState {
    pub status: BatchStatus,
    pub items: Vec<UploadItem>,
    pub max_concurrent_uploads: usize,
    /// 每次修改后由 `recompute` 刷新
    pub total_progress: u8,
    pub error: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Default for BatchState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONCURRENT_UPLOADS)
    }
}

impl BatchState {
    pub fn new(max_concurrent_uploads: usize) -> Self {
        Self {
            status: BatchStatus::Idle,
            items: Vec::new(),
            max_concurrent_uploads,
            total_progress: 0,
            error: None,
            started_at: None,
            completed_at: None,
        }
    }

    /// 刷新派生字段
    pub fn recompute(&mut self) {
        self.total_progress = self.compute_total_progress();
    }

    pub fn find_item(&self, id: Uuid) -> Option<&UploadItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn find_item_mut(&mut self, id: Uuid) -> Option<&mut UploadItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    pub fn queued_items(&self) -> Vec<&UploadItem> {
        self.items_with(|status| status == ItemStatus::Queued)
    }

    pub fn active_items(&self) -> Vec<&UploadItem> {
        self.items_with(ItemStatus::is_active)
    }

    pub fn completed_items(&self) -> Vec<&UploadItem> {
        self.items_with(|status| status == ItemStatus::Completed)
    }

    pub fn failed_items(&self) -> Vec<&UploadItem> {
        self.items_with(|status| status == ItemStatus::Failed)
    }

    pub fn cancelled_items(&self) -> Vec<&UploadItem> {
        self.items_with(|status| status == ItemStatus::Cancelled)
    }

    pub fn active_count(&self) -> usize {
        self.items.iter().filter(|item| item.is_active()).count()
    }

    pub fn all_terminal(&self) -> bool {
        self.items.iter().all(UploadItem::is_terminal)
    }

    /// 所有上传项有效进度的算术平均（向下取整），空批次为 0
    pub fn compute_total_progress(&self) -> u8 {
        if self.items.is_empty() {
            return 0;
        }
        let sum: usize = self
            .items
            .iter()
            .map(|item| item.effective_progress() as usize)
            .sum();
        (sum / self.items.len()) as u8
    }

    /// 成功率（百分比），空批次为 0.0
    pub fn success_rate(&self) -> f64 {
        if self.items.is_empty() {
            return 0.0;
        }
        self.completed_items().len() as f64 / self.items.len() as f64 * 100.0
    }

    pub fn is_completed(&self) -> bool {
        self.status == BatchStatus::Completed
    }

    pub fn has_failures(&self) -> bool {
        self.items.iter().any(|item| item.status == ItemStatus::Failed)
    }

    /// 汇总统计
    pub fn stats(&self) -> BatchStats {
        let mut stats = BatchStats {
            total: self.items.len(),
            ..Default::default()
        };
        for item in &self.items {
            match item.status {
                ItemStatus::Queued => stats.queued += 1,
                ItemStatus::Uploading | ItemStatus::Processing => stats.active += 1,
                ItemStatus::Completed => stats.completed += 1,
                ItemStatus::Failed => stats.failed += 1,
                ItemStatus::Cancelled => stats.cancelled += 1,
            }
        }
        stats
    }

    fn items_with(&self, predicate: impl Fn(ItemStatus) -> bool) -> Vec<&UploadItem> {
        self.items
            .iter()
            .filter(|item| predicate(item.status))
            .collect()
    }
}

/// 批次统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total: usize,
    pub queued: usize,
    pub active: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::upload_item::{ProcessingStage, SourceFile};

    fn item(name: &str) -> UploadItem {
        UploadItem::new(SourceFile::new(
            format!("/tmp/{}", name),
            name,
            1024,
            "image/png",
        ))
    }

    fn state_with(items: Vec<UploadItem>) -> BatchState {
        let mut state = BatchState::new(2);
        state.items = items;
        state.recompute();
        state
    }

    #[test]
    fn test_empty_batch_aggregates() {
        let state = BatchState::default();
        assert_eq!(state.max_concurrent_uploads, DEFAULT_MAX_CONCURRENT_UPLOADS);
        assert_eq!(state.compute_total_progress(), 0);
        assert_eq!(state.success_rate(), 0.0);
        assert!(!state.has_failures());
        assert!(!state.is_completed());
        assert!(state.all_terminal());
    }

    #[test]
    fn test_total_progress_uses_effective_progress() {
        let mut done = item("a.png");
        done.start().unwrap();
        done.complete("r-a", None).unwrap();

        let mut failed = item("b.png");
        failed.start().unwrap();
        failed.apply_stage(ProcessingStage::AiProcessing, 80).unwrap();
        failed.fail("boom").unwrap();

        let mut running = item("c.png");
        running.start().unwrap();
        running.apply_stage(ProcessingStage::UploadingImage, 50).unwrap();

        let queued = item("d.png");

        // (100 + 0 + 50 + 0) / 4
        let state = state_with(vec![done, failed, running, queued]);
        assert_eq!(state.total_progress, 37);
        assert_eq!(state.compute_total_progress(), 37);
        assert!(state.total_progress <= 100);
    }

    #[test]
    fn test_status_filters_and_stats() {
        let mut done = item("a.png");
        done.start().unwrap();
        done.complete("r-a", None).unwrap();

        let mut failed = item("b.png");
        failed.fail("boom").unwrap();

        let mut running = item("c.png");
        running.start().unwrap();

        let mut cancelled = item("d.png");
        cancelled.cancel().unwrap();

        let state = state_with(vec![done, failed, running, cancelled, item("e.png")]);

        assert_eq!(state.queued_items().len(), 1);
        assert_eq!(state.active_items().len(), 1);
        assert_eq!(state.completed_items().len(), 1);
        assert_eq!(state.failed_items().len(), 1);
        assert_eq!(state.cancelled_items().len(), 1);
        assert!(state.has_failures());
        assert!(!state.all_terminal());
        assert_eq!(state.success_rate(), 20.0);
        assert_eq!(
            state.stats(),
            BatchStats {
                total: 5,
                queued: 1,
                active: 1,
                completed: 1,
                failed: 1,
                cancelled: 1,
            }
        );
    }

    #[test]
    fn test_find_item_by_id() {
        let first = item("a.png");
        let id = first.id;
        let state = state_with(vec![first, item("b.png")]);
        assert_eq!(state.find_item(id).map(|i| i.file_name.as_str()), Some("a.png"));
        assert!(state.find_item(Uuid::new_v4()).is_none());
    }
}
