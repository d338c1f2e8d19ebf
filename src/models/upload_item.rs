//! 上传项模型
//!
//! 一个文件从"排队"到"完成/失败/取消"的完整生命周期

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::ItemError;

/// 本地文件引用
///
/// 只是一个不透明的句柄，编排层从不读取文件内容
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceHandle(PathBuf);

impl SourceHandle {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }
}

/// 用户选中的一个本地文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub handle: SourceHandle,
    pub file_name: String,
    pub file_size_bytes: u64,
    pub mime_type: String,
}

impl SourceFile {
    pub fn new(
        path: impl Into<PathBuf>,
        file_name: impl Into<String>,
        file_size_bytes: u64,
        mime_type: impl Into<String>,
    ) -> Self {
        Self {
            handle: SourceHandle::new(path),
            file_name: file_name.into(),
            file_size_bytes,
            mime_type: mime_type.into(),
        }
    }
}

/// 上传项状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Queued,
    Uploading,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl ItemStatus {
    /// 是否为终态（终态之后不允许任何转换）
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// 是否占用一个并发名额
    pub fn is_active(self) -> bool {
        matches!(self, Self::Uploading | Self::Processing)
    }

    /// 给界面展示用的描述
    pub fn description(self) -> &'static str {
        match self {
            Self::Queued => "等待上传",
            Self::Uploading => "正在上传",
            Self::Processing => "正在识别",
            Self::Completed => "已完成",
            Self::Failed => "失败",
            Self::Cancelled => "已取消",
        }
    }
}

/// 处理阶段（比状态更细的粒度）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStage {
    Initializing,
    UploadingImage,
    CreatingRecord,
    AiProcessing,
    Finalizing,
    Completed,
    Failed,
}

impl ProcessingStage {
    /// 该阶段对应的上传项状态；终态阶段返回 None
    pub fn item_status(self) -> Option<ItemStatus> {
        match self {
            Self::Initializing | Self::UploadingImage => Some(ItemStatus::Uploading),
            Self::CreatingRecord | Self::AiProcessing | Self::Finalizing => {
                Some(ItemStatus::Processing)
            }
            Self::Completed | Self::Failed => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::Initializing => "准备中...",
            Self::UploadingImage => "正在上传图片...",
            Self::CreatingRecord => "正在创建收据记录...",
            Self::AiProcessing => "AI 正在提取收据信息...",
            Self::Finalizing => "正在保存结果...",
            Self::Completed => "处理完成",
            Self::Failed => "处理失败",
        }
    }
}

/// 上传项日志条目
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemLogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// 上传项
///
/// 所有状态修改都通过下面的转换方法完成，非法转换返回 `ItemError` 且不修改任何字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadItem {
    pub id: Uuid,
    pub source: SourceHandle,
    pub file_name: String,
    pub file_size_bytes: u64,
    pub mime_type: String,
    pub status: ItemStatus,
    pub stage: Option<ProcessingStage>,
    pub progress: u8,
    pub error: Option<String>,
    pub result_id: Option<String>,
    /// AI 提取出的结构化数据
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_data: Option<JsonValue>,
    /// 如果是重试项，记录原失败项的 id
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_of: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub log: Vec<ItemLogEntry>,
}

impl UploadItem {
    /// 根据选中的文件创建一个排队中的上传项
    pub fn new(file: SourceFile) -> Self {
        let now = Utc::now();
        let mut item = Self {
            id: Uuid::new_v4(),
            source: file.handle,
            file_name: file.file_name,
            file_size_bytes: file.file_size_bytes,
            mime_type: file.mime_type,
            status: ItemStatus::Queued,
            stage: None,
            progress: 0,
            error: None,
            result_id: None,
            result_data: None,
            retry_of: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            log: Vec::new(),
        };
        item.push_log(now, "已加入队列".to_string());
        item
    }

    /// 为失败项生成一个新的重试项（新 id，同一个源文件），原项保持不变
    pub fn retry(&self) -> Self {
        let mut item = Self::new(SourceFile {
            handle: self.source.clone(),
            file_name: self.file_name.clone(),
            file_size_bytes: self.file_size_bytes,
            mime_type: self.mime_type.clone(),
        });
        item.retry_of = Some(self.id);
        let created_at = item.created_at;
        item.push_log(created_at, format!("重试失败项 {}", self.id));
        item
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// 计入批次总进度的有效进度：完成算 100，失败/取消算 0
    pub fn effective_progress(&self) -> u8 {
        match self.status {
            ItemStatus::Completed => 100,
            ItemStatus::Failed | ItemStatus::Cancelled => 0,
            _ => self.progress,
        }
    }

    /// 界面展示用的阶段：活跃时为当前阶段，完成/失败时推导出终态阶段
    pub fn display_stage(&self) -> Option<ProcessingStage> {
        match self.status {
            ItemStatus::Uploading | ItemStatus::Processing => self.stage,
            ItemStatus::Completed => Some(ProcessingStage::Completed),
            ItemStatus::Failed if self.started_at.is_some() => Some(ProcessingStage::Failed),
            _ => None,
        }
    }

    /// 当前状态/阶段的描述
    pub fn status_description(&self) -> &'static str {
        match self.display_stage() {
            Some(stage) => stage.description(),
            None => self.status.description(),
        }
    }

    /// queued → uploading
    pub fn start(&mut self) -> Result<(), ItemError> {
        if self.status != ItemStatus::Queued {
            return Err(self.invalid("uploading"));
        }
        let now = Utc::now();
        let before = self.label();
        self.status = ItemStatus::Uploading;
        self.stage = Some(ProcessingStage::Initializing);
        self.progress = 0;
        self.started_at = Some(now);
        self.record_transition(now, before);
        Ok(())
    }

    /// 应用处理方上报的阶段与进度
    ///
    /// 状态只能前进（uploading → processing），进度截断到 [0, 100] 且不会回退
    pub fn apply_stage(&mut self, stage: ProcessingStage, percent: i32) -> Result<(), ItemError> {
        let target = stage.item_status().ok_or_else(|| self.invalid("terminal stage"))?;
        if !self.is_active() || (self.status == ItemStatus::Processing && target == ItemStatus::Uploading)
        {
            return Err(self.invalid("stage update"));
        }

        let clamped = percent.clamp(0, 100) as u8;
        let progress = self.progress.max(clamped);

        if self.stage == Some(stage) && self.status == target {
            self.progress = progress;
            return Ok(());
        }

        let now = Utc::now();
        let before = self.label();
        self.status = target;
        self.stage = Some(stage);
        self.progress = progress;
        self.record_transition(now, before);
        Ok(())
    }

    /// uploading/processing → completed
    pub fn complete(
        &mut self,
        result_id: impl Into<String>,
        data: Option<JsonValue>,
    ) -> Result<(), ItemError> {
        if !self.is_active() {
            return Err(self.invalid("completed"));
        }
        let now = Utc::now();
        let before = self.label();
        self.status = ItemStatus::Completed;
        self.stage = None;
        self.progress = 100;
        self.result_id = Some(result_id.into());
        self.result_data = data;
        self.completed_at = Some(now);
        self.push_log(now, format!("{} → completed(completed)", before));
        Ok(())
    }

    /// 任意非终态 → failed
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), ItemError> {
        if self.is_terminal() {
            return Err(self.invalid("failed"));
        }
        let now = Utc::now();
        let before = self.label();
        let had_stage = self.stage.is_some();
        let error = error.into();
        self.status = ItemStatus::Failed;
        self.stage = None;
        self.completed_at = Some(now);
        let after = if had_stage { "failed(failed)" } else { "failed" };
        self.push_log(now, format!("{} → {}: {}", before, after, error));
        self.error = Some(error);
        Ok(())
    }

    /// 任意非终态 → cancelled
    pub fn cancel(&mut self) -> Result<(), ItemError> {
        if self.is_terminal() {
            return Err(self.invalid("cancelled"));
        }
        let now = Utc::now();
        let before = self.label();
        self.status = ItemStatus::Cancelled;
        self.stage = None;
        self.completed_at = Some(now);
        self.record_transition(now, before);
        Ok(())
    }

    // ========== 内部辅助方法 ==========

    fn label(&self) -> String {
        match self.stage {
            Some(stage) => format!("{}({})", status_name(self.status), stage_name(stage)),
            None => status_name(self.status).to_string(),
        }
    }

    fn record_transition(&mut self, at: DateTime<Utc>, before: String) {
        let after = self.label();
        self.push_log(at, format!("{} → {}", before, after));
    }

    fn push_log(&mut self, at: DateTime<Utc>, message: String) {
        self.log.push(ItemLogEntry { at, message });
    }

    fn invalid(&self, to: &'static str) -> ItemError {
        ItemError::InvalidTransition {
            id: self.id,
            from: self.status,
            to,
        }
    }
}

impl fmt::Display for UploadItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{} {}%]",
            self.file_name,
            self.status_description(),
            self.effective_progress()
        )
    }
}

fn status_name(status: ItemStatus) -> &'static str {
    match status {
        ItemStatus::Queued => "queued",
        ItemStatus::Uploading => "uploading",
        ItemStatus::Processing => "processing",
        ItemStatus::Completed => "completed",
        ItemStatus::Failed => "failed",
        ItemStatus::Cancelled => "cancelled",
    }
}

fn stage_name(stage: ProcessingStage) -> &'static str {
    match stage {
        ProcessingStage::Initializing => "initializing",
        ProcessingStage::UploadingImage => "uploading_image",
        ProcessingStage::CreatingRecord => "creating_record",
        ProcessingStage::AiProcessing => "ai_processing",
        ProcessingStage::Finalizing => "finalizing",
        ProcessingStage::Completed => "completed",
        ProcessingStage::Failed => "failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    fn receipt() -> UploadItem {
        UploadItem::new(SourceFile::new(
            "/tmp/receipt.jpg",
            "receipt.jpg",
            2048,
            "image/jpeg",
        ))
    }

    /// stage 非空 ⟺ 状态为 uploading/processing
    fn assert_stage_invariant(item: &UploadItem) {
        assert_eq!(item.stage.is_some(), item.status.is_active(), "{:?}", item);
        assert_eq!(item.error.is_some(), item.status == ItemStatus::Failed);
        if item.result_id.is_some() {
            assert_eq!(item.status, ItemStatus::Completed);
        }
        if let (Some(started), Some(completed)) = (item.started_at, item.completed_at) {
            assert!(started <= completed);
        }
    }

    #[test]
    fn test_full_lifecycle_to_completed() {
        let mut item = receipt();
        assert_eq!(item.status, ItemStatus::Queued);
        assert_stage_invariant(&item);

        assert_ok!(item.start());
        assert_eq!(item.stage, Some(ProcessingStage::Initializing));
        assert!(item.started_at.is_some());
        assert_stage_invariant(&item);

        assert_ok!(item.apply_stage(ProcessingStage::UploadingImage, 20));
        assert_eq!(item.status, ItemStatus::Uploading);
        assert_ok!(item.apply_stage(ProcessingStage::CreatingRecord, 40));
        assert_eq!(item.status, ItemStatus::Processing);
        assert_ok!(item.apply_stage(ProcessingStage::AiProcessing, 70));
        assert_stage_invariant(&item);

        assert_ok!(item.complete("receipt-42", Some(serde_json::json!({ "total": 12.5 }))));
        assert_eq!(item.status, ItemStatus::Completed);
        assert_eq!(item.progress, 100);
        assert_eq!(item.result_id.as_deref(), Some("receipt-42"));
        assert_eq!(item.display_stage(), Some(ProcessingStage::Completed));
        assert_stage_invariant(&item);

        // 每次转换一条日志：入队 + start + 3 次阶段 + 完成
        assert_eq!(item.log.len(), 6);
        assert!(item.log[1].message.contains("queued → uploading(initializing)"));
    }

    #[test]
    fn test_progress_is_clamped_and_monotonic() {
        let mut item = receipt();
        assert_ok!(item.start());
        assert_ok!(item.apply_stage(ProcessingStage::UploadingImage, 150));
        assert_eq!(item.progress, 100);

        let mut item = receipt();
        assert_ok!(item.start());
        assert_ok!(item.apply_stage(ProcessingStage::UploadingImage, 60));
        assert_ok!(item.apply_stage(ProcessingStage::CreatingRecord, 30));
        assert_eq!(item.progress, 60);
        assert_ok!(item.apply_stage(ProcessingStage::CreatingRecord, -5));
        assert_eq!(item.progress, 60);
    }

    #[test]
    fn test_status_never_moves_backwards() {
        let mut item = receipt();
        assert_ok!(item.start());
        assert_ok!(item.apply_stage(ProcessingStage::AiProcessing, 50));
        let before = item.clone();

        assert_err!(item.apply_stage(ProcessingStage::UploadingImage, 60));
        assert_err!(item.apply_stage(ProcessingStage::Completed, 100));
        assert_eq!(item, before);
    }

    #[test]
    fn test_cannot_skip_from_queued_to_completed() {
        let mut item = receipt();
        assert_err!(item.complete("r1", None));
        assert_err!(item.apply_stage(ProcessingStage::AiProcessing, 10));
        assert_eq!(item.status, ItemStatus::Queued);
    }

    #[test]
    fn test_terminal_items_are_frozen() {
        let mut item = receipt();
        assert_ok!(item.start());
        assert_ok!(item.fail("network error"));
        assert_eq!(item.error.as_deref(), Some("network error"));
        assert_eq!(item.display_stage(), Some(ProcessingStage::Failed));
        assert_stage_invariant(&item);

        let frozen = item.clone();
        assert_err!(item.cancel());
        assert_err!(item.fail("again"));
        assert_err!(item.start());
        assert_eq!(item, frozen);
    }

    #[test]
    fn test_cancel_from_queued_has_no_error() {
        let mut item = receipt();
        assert_ok!(item.cancel());
        assert_eq!(item.status, ItemStatus::Cancelled);
        assert!(item.error.is_none());
        assert!(item.started_at.is_none());
        assert!(item.completed_at.is_some());
        assert_eq!(item.effective_progress(), 0);
        assert_stage_invariant(&item);
    }

    #[test]
    fn test_retry_creates_new_identity() {
        let mut item = receipt();
        assert_ok!(item.start());
        assert_ok!(item.fail("timeout"));

        let retry = item.retry();
        assert_ne!(retry.id, item.id);
        assert_eq!(retry.source, item.source);
        assert_eq!(retry.status, ItemStatus::Queued);
        assert_eq!(retry.retry_of, Some(item.id));
        assert_eq!(item.status, ItemStatus::Failed);
    }
}
