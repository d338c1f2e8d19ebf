//! 单个上传项处理流程 - 流程层
//!
//! 核心职责：把一个上传项的远程处理事件转发给编排层，并负责超时
//!
//! 流程顺序：
//! 1. 逐个读取处理方事件，原样转发
//! 2. 遇到终止事件（成功/失败）后结束
//! 3. 超过截止时间 → 转发 TimedOut
//! 4. 事件通道提前关闭 → 转发 Disconnected

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::services::ProcessorEvent;
use crate::workflow::item_ctx::ItemCtx;

/// 流程发给编排层的信号
#[derive(Debug, Clone, PartialEq)]
pub enum FlowSignal {
    /// 处理方事件
    Event(ProcessorEvent),
    /// 活跃阶段超时
    TimedOut(Duration),
    /// 处理方在发出终止事件之前关闭了通道
    Disconnected,
}

/// 带上传项 id 的信号
#[derive(Debug, Clone, PartialEq)]
pub struct FlowMessage {
    pub item_id: Uuid,
    pub signal: FlowSignal,
}

/// 超时错误文案
pub fn timeout_message(timeout: Duration) -> String {
    format!("处理超时（超过 {} 秒）", timeout.as_secs_f64())
}

/// 单个上传项处理流程
///
/// - 不修改任何状态，只转发
/// - 截止时间从被放行（开始上传）那一刻算起
pub struct ItemFlow {
    ctx: ItemCtx,
    deadline: Instant,
    timeout: Duration,
}

impl ItemFlow {
    pub fn new(ctx: ItemCtx, timeout: Duration) -> Self {
        Self {
            ctx,
            deadline: Instant::now() + timeout,
            timeout,
        }
    }

    pub async fn run(
        self,
        mut events: mpsc::Receiver<ProcessorEvent>,
        out: mpsc::Sender<FlowMessage>,
    ) {
        loop {
            let signal = match timeout_at(self.deadline, events.recv()).await {
                Ok(Some(event)) => FlowSignal::Event(event),
                Ok(None) => {
                    warn!("{} ⚠️ 处理通道在返回结果前关闭", self.ctx);
                    FlowSignal::Disconnected
                }
                Err(_) => {
                    warn!("{} ⏰ 处理超时 ({:?})", self.ctx, self.timeout);
                    FlowSignal::TimedOut(self.timeout)
                }
            };

            let finished = match &signal {
                FlowSignal::Event(event) => event.is_terminal(),
                FlowSignal::TimedOut(_) | FlowSignal::Disconnected => true,
            };

            let message = FlowMessage {
                item_id: self.ctx.item_id,
                signal,
            };
            if out.send(message).await.is_err() {
                debug!("{} 编排层已停止，流程退出", self.ctx);
                return;
            }
            if finished {
                return;
            }
        }
    }
}
