//! 模拟处理服务 - 业务能力层
//!
//! 在进程内模拟"上传图片 → 创建记录 → AI 识别 → 保存"的完整阶段序列，
//! 用于演示程序和测试，不做任何网络请求

use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;
use tracing::debug;
use uuid::Uuid;

use crate::models::{ProcessingStage, UploadItem};
use crate::services::remote_processor::{ProcessHandle, ProcessReporter, RemoteProcessor};

/// 模拟的阶段序列及对应进度
const STAGES: [(ProcessingStage, i32); 5] = [
    (ProcessingStage::Initializing, 5),
    (ProcessingStage::UploadingImage, 25),
    (ProcessingStage::CreatingRecord, 45),
    (ProcessingStage::AiProcessing, 70),
    (ProcessingStage::Finalizing, 90),
];

/// 单个文件的模拟结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedOutcome {
    /// 走完所有阶段后成功
    Succeed,
    /// 走完 `after_steps` 个阶段后失败
    Fail { message: String, after_steps: usize },
    /// 永远不返回结果，直到被取消
    Hang,
}

impl SimulatedOutcome {
    /// 立即失败
    pub fn fail(message: impl Into<String>) -> Self {
        Self::Fail {
            message: message.into(),
            after_steps: 0,
        }
    }

    pub fn fail_after(message: impl Into<String>, after_steps: usize) -> Self {
        Self::Fail {
            message: message.into(),
            after_steps,
        }
    }
}

/// 模拟处理服务
///
/// 按文件名指定结果，未指定的文件使用默认结果；
/// 同时记录调用情况，方便测试检查并发上限
#[derive(Clone)]
pub struct SimulatedProcessor {
    step_delay: Duration,
    outcomes: HashMap<String, SimulatedOutcome>,
    default_outcome: SimulatedOutcome,
    fail_every: usize,
    probe: Arc<Probe>,
}

#[derive(Default)]
struct Probe {
    calls: Mutex<Vec<Uuid>>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl Probe {
    /// 记录一次调用，返回调用序号（从 1 开始）
    fn enter(&self, id: Uuid) -> usize {
        let call_number = match self.calls.lock() {
            Ok(mut calls) => {
                calls.push(id);
                calls.len()
            }
            Err(_) => 0,
        };
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        call_number
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SimulatedProcessor {
    pub fn new(step_delay: Duration) -> Self {
        Self {
            step_delay,
            outcomes: HashMap::new(),
            default_outcome: SimulatedOutcome::Succeed,
            fail_every: 0,
            probe: Arc::new(Probe::default()),
        }
    }

    /// 为指定文件名设置结果
    pub fn with_outcome(mut self, file_name: impl Into<String>, outcome: SimulatedOutcome) -> Self {
        self.outcomes.insert(file_name.into(), outcome);
        self
    }

    pub fn with_default_outcome(mut self, outcome: SimulatedOutcome) -> Self {
        self.default_outcome = outcome;
        self
    }

    /// 每第 n 次调用在 AI 识别阶段失败（0 表示从不）
    pub fn with_fail_every(mut self, n: usize) -> Self {
        self.fail_every = n;
        self
    }

    /// 已调用 `process` 的上传项 id（按调用顺序）
    pub fn calls(&self) -> Vec<Uuid> {
        self.probe
            .calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn in_flight(&self) -> usize {
        self.probe.in_flight.load(Ordering::SeqCst)
    }

    /// 同时处理中的最大数量
    pub fn peak_in_flight(&self) -> usize {
        self.probe.peak_in_flight.load(Ordering::SeqCst)
    }

    fn outcome_for(&self, item: &UploadItem, call_number: usize) -> SimulatedOutcome {
        if let Some(outcome) = self.outcomes.get(&item.file_name) {
            return outcome.clone();
        }
        if self.fail_every > 0 && call_number % self.fail_every == 0 {
            return SimulatedOutcome::fail_after("AI 未能识别收据内容", 4);
        }
        self.default_outcome.clone()
    }
}

impl RemoteProcessor for SimulatedProcessor {
    fn process(&self, item: &UploadItem) -> ProcessHandle {
        let (handle, reporter) = ProcessHandle::channel();
        let call_number = self.probe.enter(item.id);
        let outcome = self.outcome_for(item, call_number);

        debug!(
            item_id = %item.id,
            file = %item.file_name,
            ?outcome,
            "模拟处理开始"
        );

        let job = SimulatedJob {
            item_id: item.id,
            file_name: item.file_name.clone(),
            step_delay: self.step_delay,
            outcome,
            probe: self.probe.clone(),
        };
        tokio::spawn(job.run(reporter));

        handle
    }
}

struct SimulatedJob {
    item_id: Uuid,
    file_name: String,
    step_delay: Duration,
    outcome: SimulatedOutcome,
    probe: Arc<Probe>,
}

impl SimulatedJob {
    async fn run(self, mut reporter: ProcessReporter) {
        let steps = match &self.outcome {
            SimulatedOutcome::Fail { after_steps, .. } => (*after_steps).min(STAGES.len()),
            _ => STAGES.len(),
        };

        for (stage, percent) in STAGES.iter().take(steps) {
            tokio::select! {
                _ = reporter.cancelled() => {
                    debug!(item_id = %self.item_id, "模拟处理被取消");
                    self.probe.leave();
                    return;
                }
                _ = sleep(self.step_delay) => {}
            }
            if !reporter.stage(*stage, *percent).await {
                self.probe.leave();
                return;
            }
        }

        // 先释放计数再发送终止事件，编排层收到终止事件后才会放行下一个
        match self.outcome {
            SimulatedOutcome::Succeed => {
                self.probe.leave();
                let data = json!({
                    "file_name": self.file_name,
                    "merchant": "模拟商户",
                    "total_amount": 42.0,
                    "currency": "CNY",
                });
                reporter
                    .succeed(format!("receipt-{}", self.item_id.simple()), Some(data))
                    .await;
            }
            SimulatedOutcome::Fail { message, .. } => {
                self.probe.leave();
                reporter.fail(message).await;
            }
            SimulatedOutcome::Hang => {
                reporter.cancelled().await;
                self.probe.leave();
            }
        }
    }
}
