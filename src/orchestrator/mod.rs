//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责批次调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `session` - 上传会话
//! - 选择阶段的生命周期（idle → selecting → ready）
//! - 启动校验，失败时记录批次级错误
//!
//! ### `batch_notifier` - 批次编排器
//! - 批次状态的唯一写入方
//! - 并发上限下按 FIFO 放行
//! - 暂停 / 恢复 / 取消 / 重试
//!
//! ### `batch_processor` - 批量上传处理器
//! - 应用生命周期（初始化、运行、统计）
//! - 扫描目录、跟踪进度、记录失败
//!
//! ## 层次关系
//!
//! ```text
//! batch_processor (App：处理一个目录)
//!     ↓
//! session → batch_notifier (处理 Vec<UploadItem>)
//!     ↓
//! workflow::ItemFlow (处理单个 UploadItem 的事件与超时)
//!     ↓
//! services (能力层：RemoteProcessor / FailureWriter)
//! ```

pub mod batch_notifier;
pub mod batch_processor;
pub mod session;

// 重新导出主要类型
pub use batch_notifier::{BatchHandle, BatchNotifier, BatchOptions, DEFAULT_ITEM_TIMEOUT};
pub use batch_processor::App;
pub use session::UploadSession;
