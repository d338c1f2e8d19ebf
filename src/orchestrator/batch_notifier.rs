//! 批次编排器 - 编排层
//!
//! ## 职责
//!
//! 批次状态的唯一写入方。所有输入（控制命令、各上传项的处理事件、超时）
//! 都经由通道进入同一个事件循环，逐条应用，每条之后重新计算聚合并发布快照。
//!
//! ## 核心功能
//!
//! 1. **放行控制**：活跃（上传中/识别中）数量不超过 `max_concurrent_uploads`，按选择顺序 FIFO 放行
//! 2. **状态转换**：把处理方事件映射为上传项状态转换
//! 3. **暂停/恢复/取消/重试**：通过 `BatchHandle` 发送命令
//! 4. **完成检测**：全部上传项进入终态后批次完成
//!
//! ## 设计特点
//!
//! - **单一写入方**：状态只在编排任务内修改，外部只拿到不可变快照
//! - **失败隔离**：单个上传项失败只记录在该项上，不影响其他项
//! - **协作式取消**：取消只是请求，迟到的结果会被丢弃

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{BatchError, BatchResult};
use crate::models::{BatchState, BatchStatus, ItemStatus, SourceFile};
use crate::orchestrator::session::UploadSession;
use crate::services::{Canceller, ProcessorEvent, RemoteProcessor};
use crate::utils::logging::truncate_text;
use crate::workflow::{timeout_message, FlowMessage, FlowSignal, ItemCtx, ItemFlow};

/// 默认单项超时
pub const DEFAULT_ITEM_TIMEOUT: Duration = Duration::from_secs(120);

const COMMAND_BUFFER: usize = 16;
const SIGNAL_BUFFER: usize = 64;

/// 批次运行参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchOptions {
    /// 单个上传项活跃阶段（上传 + 识别）的超时
    pub item_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            item_timeout: DEFAULT_ITEM_TIMEOUT,
        }
    }
}

/// 控制命令
enum Command {
    Pause(oneshot::Sender<BatchResult<BatchStatus>>),
    Resume(oneshot::Sender<BatchResult<BatchStatus>>),
    Cancel(oneshot::Sender<BatchResult<BatchStatus>>),
    CancelItem(Uuid, oneshot::Sender<BatchResult<()>>),
    RetryFailed(oneshot::Sender<BatchResult<usize>>),
}

/// 批次句柄
///
/// 外部（界面）与编排任务交互的唯一入口；丢弃句柄会停止编排并取消进行中的处理
pub struct BatchHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<BatchState>,
    task: JoinHandle<()>,
}

impl BatchHandle {
    /// 暂停放行，已在处理中的项继续运行
    pub async fn pause(&self) -> BatchResult<BatchStatus> {
        self.request(Command::Pause).await
    }

    pub async fn resume(&self) -> BatchResult<BatchStatus> {
        self.request(Command::Resume).await
    }

    /// 取消整个批次
    pub async fn cancel(&self) -> BatchResult<BatchStatus> {
        self.request(Command::Cancel).await
    }

    /// 取消单个上传项
    pub async fn cancel_item(&self, item_id: Uuid) -> BatchResult<()> {
        self.request(|reply| Command::CancelItem(item_id, reply))
            .await
    }

    /// 为所有失败项创建新的排队项，返回新增数量
    pub async fn retry_failed(&self) -> BatchResult<usize> {
        self.request(Command::RetryFailed).await
    }

    /// 当前状态快照
    pub fn snapshot(&self) -> BatchState {
        self.state.borrow().clone()
    }

    /// 订阅状态变化
    pub fn subscribe(&self) -> watch::Receiver<BatchState> {
        self.state.clone()
    }

    /// 等待批次完成或被取消，返回最终快照
    pub async fn wait_until_settled(&self) -> BatchResult<BatchState> {
        let mut state = self.state.clone();
        let settled = state
            .wait_for(|state| state.status.is_settled())
            .await
            .map_err(|_| BatchError::OrchestratorGone)?;
        Ok(settled.clone())
    }

    /// 停止编排任务并等待其退出
    pub async fn shutdown(self) {
        let Self { commands, task, .. } = self;
        drop(commands);
        if let Err(e) = task.await {
            error!("批次编排任务异常退出: {}", e);
        }
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<BatchResult<T>>) -> Command,
    ) -> BatchResult<T> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.commands
            .send(build(reply_tx))
            .await
            .map_err(|_| BatchError::OrchestratorGone)?;
        reply_rx.await.map_err(|_| BatchError::OrchestratorGone)?
    }
}

/// 批次编排器
///
/// 由编排任务独占，外部通过 `BatchHandle` 访问
pub struct BatchNotifier {
    state: BatchState,
    processor: Arc<dyn RemoteProcessor>,
    options: BatchOptions,
    active: HashMap<Uuid, Canceller>,
    signals: mpsc::Sender<FlowMessage>,
    publisher: watch::Sender<BatchState>,
}

impl BatchNotifier {
    /// 直接用一组文件启动批次（跳过选择阶段）
    ///
    /// 必须在 tokio 运行时内调用
    pub fn start(
        files: Vec<SourceFile>,
        max_concurrent_uploads: usize,
        processor: Arc<dyn RemoteProcessor>,
        options: BatchOptions,
    ) -> BatchResult<BatchHandle> {
        let mut session = UploadSession::new(max_concurrent_uploads);
        session.begin_selection();
        session.add_files(files);
        session.start(processor, options)
    }

    /// 启动编排任务；`state` 已通过校验且所有上传项都在排队
    pub(crate) fn launch(
        mut state: BatchState,
        processor: Arc<dyn RemoteProcessor>,
        options: BatchOptions,
    ) -> BatchHandle {
        state.status = BatchStatus::Processing;
        state.started_at = Some(Utc::now());
        state.completed_at = None;
        state.error = None;
        state.recompute();

        info!(
            items = state.items.len(),
            max_concurrent = state.max_concurrent_uploads,
            timeout_secs = options.item_timeout.as_secs(),
            "🚀 批次开始处理"
        );

        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (signal_tx, signal_rx) = mpsc::channel(SIGNAL_BUFFER);
        let (publisher, state_rx) = watch::channel(state.clone());

        let mut notifier = Self {
            state,
            processor,
            options,
            active: HashMap::new(),
            signals: signal_tx,
            publisher,
        };
        // 启动时立即放行第一批，返回的句柄即可看到活跃项
        notifier.settle();

        let task = tokio::spawn(notifier.run(command_rx, signal_rx));

        BatchHandle {
            commands: command_tx,
            state: state_rx,
            task,
        }
    }

    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut signals: mpsc::Receiver<FlowMessage>,
    ) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => {
                        self.abandon_in_flight();
                        break;
                    }
                },
                Some(message) = signals.recv() => self.handle_signal(message),
            }
        }
        debug!("批次编排任务退出");
    }

    // ========== 处理方信号 ==========

    fn handle_signal(&mut self, message: FlowMessage) {
        let FlowMessage { item_id, signal } = message;

        let Some(item) = self.state.find_item_mut(item_id) else {
            warn!(%item_id, "收到未知上传项的信号，已忽略");
            return;
        };

        if item.is_terminal() {
            debug!(%item_id, status = ?item.status, "丢弃已结束上传项的迟到信号");
            return;
        }

        let timed_out = matches!(signal, FlowSignal::TimedOut(_));
        let result = match signal {
            FlowSignal::Event(ProcessorEvent::StageUpdate {
                stage,
                progress_percent,
            }) => item.apply_stage(stage, progress_percent),
            FlowSignal::Event(ProcessorEvent::Success { result_id, data }) => {
                item.complete(result_id, data)
            }
            FlowSignal::Event(ProcessorEvent::Failure { error_message }) => {
                item.fail(error_message)
            }
            FlowSignal::TimedOut(timeout) => item.fail(timeout_message(timeout)),
            FlowSignal::Disconnected => item.fail("处理服务连接中断"),
        };

        if let Err(e) = result {
            warn!(error = %e, "忽略非法的状态转换");
            return;
        }

        let (status, file_name) = (item.status, item.file_name.clone());
        match status {
            ItemStatus::Completed => info!("[{}] ✅ 处理完成", file_name),
            ItemStatus::Failed => warn!(
                "[{}] ❌ 处理失败: {}",
                file_name,
                truncate_text(item.error.as_deref().unwrap_or_default(), 80)
            ),
            _ => debug!(
                "[{}] {} ({}%)",
                file_name,
                item.status_description(),
                item.progress
            ),
        }

        if status.is_terminal() {
            if let Some(canceller) = self.active.remove(&item_id) {
                // 超时的处理仍可能在运行，请求其停止
                if timed_out {
                    canceller.cancel();
                }
            }
        }

        self.settle();
    }

    // ========== 控制命令 ==========

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::Pause(reply) => {
                let _ = reply.send(self.pause());
            }
            Command::Resume(reply) => {
                let _ = reply.send(self.resume());
            }
            Command::Cancel(reply) => {
                let _ = reply.send(self.cancel());
            }
            Command::CancelItem(item_id, reply) => {
                let _ = reply.send(self.cancel_item(item_id));
            }
            Command::RetryFailed(reply) => {
                let _ = reply.send(self.retry_failed());
            }
        }
    }

    fn pause(&mut self) -> BatchResult<BatchStatus> {
        match self.state.status {
            BatchStatus::Processing => {
                self.state.status = BatchStatus::Paused;
                info!("⏸️ 批次已暂停，正在处理的文件会继续完成");
                self.settle();
            }
            BatchStatus::Paused => {}
            status => {
                return Err(BatchError::InvalidState {
                    status,
                    operation: "pause",
                })
            }
        }
        Ok(self.state.status)
    }

    fn resume(&mut self) -> BatchResult<BatchStatus> {
        match self.state.status {
            BatchStatus::Paused => {
                self.state.status = BatchStatus::Processing;
                info!("▶️ 批次继续处理");
                self.settle();
            }
            BatchStatus::Processing => {}
            status => {
                return Err(BatchError::InvalidState {
                    status,
                    operation: "resume",
                })
            }
        }
        Ok(self.state.status)
    }

    fn cancel(&mut self) -> BatchResult<BatchStatus> {
        match self.state.status {
            BatchStatus::Processing | BatchStatus::Paused => {}
            BatchStatus::Cancelled => return Ok(BatchStatus::Cancelled),
            status => {
                return Err(BatchError::InvalidState {
                    status,
                    operation: "cancel",
                })
            }
        }

        let mut cancelled = 0;
        for item in self.state.items.iter_mut().filter(|item| !item.is_terminal()) {
            if let Some(canceller) = self.active.remove(&item.id) {
                canceller.cancel();
            }
            if item.cancel().is_ok() {
                cancelled += 1;
            }
        }

        self.state.status = BatchStatus::Cancelled;
        self.state.completed_at = Some(Utc::now());
        info!("🛑 批次已取消，共取消 {} 个文件", cancelled);
        self.settle();
        Ok(self.state.status)
    }

    fn cancel_item(&mut self, item_id: Uuid) -> BatchResult<()> {
        let status = self.state.status;
        if !matches!(status, BatchStatus::Processing | BatchStatus::Paused) {
            return Err(BatchError::InvalidState {
                status,
                operation: "cancel_item",
            });
        }

        let item = self
            .state
            .find_item_mut(item_id)
            .ok_or(BatchError::ItemNotFound(item_id))?;
        item.cancel()?;
        info!("[{}] 🛑 已取消", item.file_name);

        if let Some(canceller) = self.active.remove(&item_id) {
            canceller.cancel();
        }
        self.settle();
        Ok(())
    }

    fn retry_failed(&mut self) -> BatchResult<usize> {
        let status = self.state.status;
        if !matches!(
            status,
            BatchStatus::Processing | BatchStatus::Paused | BatchStatus::Completed
        ) {
            return Err(BatchError::InvalidState {
                status,
                operation: "retry_failed",
            });
        }

        // 重试项未被取消时，原失败项由它接续；重试项再失败会作为新的失败项参与重试
        let retries: Vec<_> = self
            .state
            .items
            .iter()
            .filter(|item| item.status == ItemStatus::Failed)
            .filter(|failed| {
                !self.state.items.iter().any(|other| {
                    other.retry_of == Some(failed.id) && other.status != ItemStatus::Cancelled
                })
            })
            .map(|failed| failed.retry())
            .collect();

        let count = retries.len();
        if count == 0 {
            return Ok(0);
        }

        self.state.items.extend(retries);
        if status == BatchStatus::Completed {
            self.state.status = BatchStatus::Processing;
            self.state.completed_at = None;
            info!("🔁 批次重新打开以重试失败项");
        }
        info!("🔁 已重新排队 {} 个失败文件", count);

        self.settle();
        Ok(count)
    }

    // ========== 放行与完成检测 ==========

    /// 每次转换之后调用：放行、完成检测、刷新聚合、发布快照
    fn settle(&mut self) {
        self.admit_queued();
        self.check_completion();
        self.state.recompute();
        self.publisher.send_replace(self.state.clone());
    }

    fn admit_queued(&mut self) {
        if self.state.status != BatchStatus::Processing {
            return;
        }

        while self.state.active_count() < self.state.max_concurrent_uploads {
            let Some(index) = self
                .state
                .items
                .iter()
                .position(|item| item.status == ItemStatus::Queued)
            else {
                break;
            };
            self.admit(index);
        }
    }

    fn admit(&mut self, index: usize) {
        let item = &mut self.state.items[index];
        if let Err(e) = item.start() {
            error!(error = %e, "放行上传项失败");
            return;
        }

        let ctx = ItemCtx::new(item.id, index + 1, item.file_name.clone());
        info!("{} 📤 开始上传", ctx);

        let (events, canceller) = self.processor.process(item).into_parts();
        self.active.insert(item.id, canceller);

        let flow = ItemFlow::new(ctx, self.options.item_timeout);
        tokio::spawn(flow.run(events, self.signals.clone()));
    }

    fn check_completion(&mut self) {
        if !matches!(
            self.state.status,
            BatchStatus::Processing | BatchStatus::Paused
        ) {
            return;
        }
        if self.state.items.is_empty() || !self.state.all_terminal() {
            return;
        }

        self.state.status = BatchStatus::Completed;
        self.state.completed_at = Some(Utc::now());

        let stats = self.state.stats();
        info!(
            completed = stats.completed,
            failed = stats.failed,
            cancelled = stats.cancelled,
            "🏁 批次处理完成"
        );
    }

    /// 句柄被丢弃：请求所有进行中的处理停止
    fn abandon_in_flight(&mut self) {
        if !self.active.is_empty() {
            info!("句柄已释放，取消 {} 个进行中的处理", self.active.len());
        }
        for (_, canceller) in self.active.drain() {
            canceller.cancel();
        }
    }
}
