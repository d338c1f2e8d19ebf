use thiserror::Error;
use uuid::Uuid;

use crate::models::{BatchStatus, ItemStatus};

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 批次相关错误
    #[error("批次错误: {0}")]
    Batch(#[from] BatchError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    Io(#[from] std::io::Error),
}

/// 批次级错误
///
/// 只描述"批次本身"出的问题，单个文件的失败记录在 `UploadItem::error` 上，不走这里
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// 没有选择任何文件
    #[error("没有选择任何文件")]
    NoItems,
    /// 并发数配置非法
    #[error("最大并发数必须至少为 1 (当前: {0})")]
    InvalidConcurrency(usize),
    /// 当前批次状态不允许该操作
    #[error("批次状态为 {status:?}，无法执行 {operation}")]
    InvalidState {
        status: BatchStatus,
        operation: &'static str,
    },
    /// 找不到上传项
    #[error("找不到上传项: {0}")]
    ItemNotFound(Uuid),
    /// 上传项拒绝了该操作
    #[error(transparent)]
    Item(#[from] ItemError),
    /// 编排任务已经退出
    #[error("批次编排任务已停止")]
    OrchestratorGone,
}

/// 上传项状态转换错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ItemError {
    /// 非法的状态转换
    #[error("上传项 {id} 无法从 {from:?} 转换到 {to}")]
    InvalidTransition {
        id: Uuid,
        from: ItemStatus,
        to: &'static str,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: &'static str,
    },
    /// 配置值非法
    #[error("配置项 {key} 非法: {reason}")]
    InvalidValue { key: &'static str, reason: String },
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

/// 批次操作结果类型
pub type BatchResult<T> = Result<T, BatchError>;
