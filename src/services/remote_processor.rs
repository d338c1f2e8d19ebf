//! 远程处理接口 - 业务能力层
//!
//! 描述"把一个文件上传并交给 AI 识别"这一能力，编排层只依赖这里的 trait，
//! 真正的存储上传 / AI 调用由外部实现

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::{mpsc, watch};

use crate::models::{ProcessingStage, UploadItem};

/// 处理事件通道容量
const EVENT_BUFFER: usize = 16;

/// 远程处理方上报的事件
///
/// 终止事件（Success / Failure）之前可以有任意多个 StageUpdate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessorEvent {
    StageUpdate {
        stage: ProcessingStage,
        progress_percent: i32,
    },
    Success {
        result_id: String,
        #[serde(default)]
        data: Option<JsonValue>,
    },
    Failure {
        error_message: String,
    },
}

impl ProcessorEvent {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::StageUpdate { .. })
    }
}

/// 远程处理方
///
/// 约定：
/// - 每个上传项 id 最多调用一次 `process`
/// - 返回的句柄最终必须发出且只发出一个 Success 或 Failure（除非先被取消）
pub trait RemoteProcessor: Send + Sync {
    fn process(&self, item: &UploadItem) -> ProcessHandle;
}

/// 单次处理的句柄：事件流 + 尽力而为的取消
pub struct ProcessHandle {
    events: mpsc::Receiver<ProcessorEvent>,
    canceller: Canceller,
}

impl ProcessHandle {
    /// 创建一对句柄与上报端，实现方持有上报端，调用方持有句柄
    pub fn channel() -> (Self, ProcessReporter) {
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let handle = Self {
            events: event_rx,
            canceller: Canceller(cancel_tx),
        };
        let reporter = ProcessReporter {
            events: event_tx,
            cancel: cancel_rx,
        };
        (handle, reporter)
    }

    /// 请求取消（处理已结束时为空操作）
    pub fn cancel(&self) {
        self.canceller.cancel();
    }

    pub fn into_parts(self) -> (mpsc::Receiver<ProcessorEvent>, Canceller) {
        (self.events, self.canceller)
    }
}

/// 取消请求发送端
///
/// 被丢弃时处理方同样会观察到取消
#[derive(Debug)]
pub struct Canceller(watch::Sender<bool>);

impl Canceller {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// 处理方使用的上报端
pub struct ProcessReporter {
    events: mpsc::Sender<ProcessorEvent>,
    cancel: watch::Receiver<bool>,
}

impl ProcessReporter {
    /// 上报阶段进度，调用方已不再监听时返回 false
    pub async fn stage(&self, stage: ProcessingStage, progress_percent: i32) -> bool {
        self.events
            .send(ProcessorEvent::StageUpdate {
                stage,
                progress_percent,
            })
            .await
            .is_ok()
    }

    pub async fn succeed(self, result_id: impl Into<String>, data: Option<JsonValue>) {
        let _ = self
            .events
            .send(ProcessorEvent::Success {
                result_id: result_id.into(),
                data,
            })
            .await;
    }

    pub async fn fail(self, error_message: impl Into<String>) {
        let _ = self
            .events
            .send(ProcessorEvent::Failure {
                error_message: error_message.into(),
            })
            .await;
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// 等待取消请求；调用方丢弃取消端也视为取消
    pub async fn cancelled(&mut self) {
        loop {
            if *self.cancel.borrow_and_update() {
                return;
            }
            if self.cancel.changed().await.is_err() {
                return;
            }
        }
    }
}
