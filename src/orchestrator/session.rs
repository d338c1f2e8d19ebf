//! 上传会话 - 编排层
//!
//! 负责批次开始之前的生命周期：idle → selecting → ready，
//! 以及启动时的参数校验。启动成功后状态交给 `BatchNotifier`。

use std::mem;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{BatchError, BatchResult};
use crate::models::{BatchState, BatchStatus, SourceFile, UploadItem};
use crate::orchestrator::batch_notifier::{BatchHandle, BatchNotifier, BatchOptions};
use crate::services::RemoteProcessor;

/// 上传会话
pub struct UploadSession {
    state: BatchState,
    files: Vec<SourceFile>,
}

impl UploadSession {
    pub fn new(max_concurrent_uploads: usize) -> Self {
        Self {
            state: BatchState::new(max_concurrent_uploads),
            files: Vec::new(),
        }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// 已选择的文件（按选择顺序）
    pub fn files(&self) -> &[SourceFile] {
        &self.files
    }

    /// 进入文件选择
    pub fn begin_selection(&mut self) {
        self.state.status = BatchStatus::Selecting;
    }

    pub fn add_file(&mut self, file: SourceFile) {
        self.add_files(std::iter::once(file));
    }

    pub fn add_files(&mut self, files: impl IntoIterator<Item = SourceFile>) {
        self.files.extend(files);
        self.refresh_status();
    }

    /// 按位置移除已选择的文件
    pub fn remove_file(&mut self, index: usize) -> Option<SourceFile> {
        if index >= self.files.len() {
            return None;
        }
        let removed = self.files.remove(index);
        self.refresh_status();
        Some(removed)
    }

    /// 启动批次
    ///
    /// 校验失败时错误写入 `state().error`，状态保持不变且不创建任何上传项；
    /// 成功后会话重置为新的 idle 状态，可用于下一批
    pub fn start(
        &mut self,
        processor: Arc<dyn RemoteProcessor>,
        options: BatchOptions,
    ) -> BatchResult<BatchHandle> {
        if let Err(e) = self.validate() {
            warn!("⚠️ 批次启动失败: {}", e);
            self.state.error = Some(e.to_string());
            return Err(e);
        }

        let max_concurrent = self.state.max_concurrent_uploads;
        let mut state = mem::replace(&mut self.state, BatchState::new(max_concurrent));
        state.items = mem::take(&mut self.files)
            .into_iter()
            .map(UploadItem::new)
            .collect();

        info!("📋 已创建 {} 个上传项", state.items.len());
        Ok(BatchNotifier::launch(state, processor, options))
    }

    fn validate(&self) -> BatchResult<()> {
        match self.state.status {
            BatchStatus::Idle | BatchStatus::Selecting | BatchStatus::Ready => {}
            status => {
                return Err(BatchError::InvalidState {
                    status,
                    operation: "start",
                })
            }
        }
        if self.state.max_concurrent_uploads == 0 {
            return Err(BatchError::InvalidConcurrency(0));
        }
        if self.files.is_empty() {
            return Err(BatchError::NoItems);
        }
        Ok(())
    }

    fn refresh_status(&mut self) {
        self.state.status = if self.files.is_empty() {
            BatchStatus::Selecting
        } else {
            BatchStatus::Ready
        };
        self.state.error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::SimulatedProcessor;
    use std::time::Duration;

    fn file(name: &str) -> SourceFile {
        SourceFile::new(format!("/tmp/{}", name), name, 100, "image/jpeg")
    }

    fn processor() -> Arc<dyn RemoteProcessor> {
        Arc::new(SimulatedProcessor::new(Duration::from_millis(10)))
    }

    #[test]
    fn test_selection_lifecycle() {
        let mut session = UploadSession::new(2);
        assert_eq!(session.state().status, BatchStatus::Idle);

        session.begin_selection();
        assert_eq!(session.state().status, BatchStatus::Selecting);

        session.add_file(file("a.jpg"));
        session.add_file(file("b.jpg"));
        assert_eq!(session.state().status, BatchStatus::Ready);
        assert!(session.state().items.is_empty());

        assert_eq!(session.remove_file(0).map(|f| f.file_name), Some("a.jpg".to_string()));
        assert!(session.remove_file(5).is_none());
        assert_eq!(session.remove_file(0).map(|f| f.file_name), Some("b.jpg".to_string()));
        assert_eq!(session.state().status, BatchStatus::Selecting);
    }

    #[tokio::test]
    async fn test_start_without_files_fails() {
        let mut session = UploadSession::new(2);
        session.begin_selection();

        let result = session.start(processor(), BatchOptions::default());
        assert_eq!(result.err(), Some(BatchError::NoItems));
        assert_eq!(session.state().status, BatchStatus::Selecting);
        assert_eq!(session.state().error.as_deref(), Some("没有选择任何文件"));
        assert!(session.state().items.is_empty());
    }

    #[tokio::test]
    async fn test_start_with_zero_concurrency_fails() {
        let mut session = UploadSession::new(0);
        session.add_file(file("a.jpg"));

        let result = session.start(processor(), BatchOptions::default());
        assert_eq!(result.err(), Some(BatchError::InvalidConcurrency(0)));
        assert_eq!(session.state().status, BatchStatus::Ready);
        assert!(session.state().error.is_some());
        assert!(session.state().items.is_empty());
        assert_eq!(session.files().len(), 1);
    }

    #[tokio::test]
    async fn test_successful_start_resets_session() {
        let mut session = UploadSession::new(3);
        session.add_files(vec![file("a.jpg"), file("b.jpg")]);

        let handle = session.start(processor(), BatchOptions::default()).unwrap();
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.status, BatchStatus::Processing);
        assert_eq!(snapshot.items.len(), 2);
        assert_eq!(snapshot.max_concurrent_uploads, 3);
        assert!(snapshot.started_at.is_some());

        assert_eq!(session.state().status, BatchStatus::Idle);
        assert!(session.files().is_empty());
        handle.shutdown().await;
    }
}
