//! # Batch Upload
//!
//! 收据批量上传编排器：有限并发地上传并识别一批本地文件，
//! 跟踪每个文件的阶段进度，并汇总批次状态供界面展示
//!
//! ## 架构设计
//!
//! 本系统采用四层架构：
//!
//! ### ① 模型层（Models）
//! - `models/` - `UploadItem` 状态机、`BatchState` 聚合、目录加载
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个上传项
//! - `RemoteProcessor` - 上传 + AI 识别能力（外部实现）
//! - `SimulatedProcessor` - 进程内模拟实现
//! - `FailureWriter` - 写失败报告能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个文件"的事件转发与超时
//! - `ItemCtx` - 上下文封装（上传项 id + 位置 + 文件名）
//! - `ItemFlow` - 转发处理事件，超时或断开时给出信号
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/session` - 选择阶段与启动校验
//! - `orchestrator/batch_notifier` - 批次编排器，唯一的状态写入方
//! - `orchestrator/batch_processor` - 应用入口，扫描目录并汇总统计
//!
//! ## 模块结构

pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use config::Config;
pub use error::{AppError, AppResult, BatchError, BatchResult, ItemError};
pub use models::{BatchState, BatchStatus, ItemStatus, ProcessingStage, SourceFile, UploadItem};
pub use orchestrator::{App, BatchHandle, BatchNotifier, BatchOptions, UploadSession};
pub use services::{ProcessorEvent, RemoteProcessor, SimulatedOutcome, SimulatedProcessor};
