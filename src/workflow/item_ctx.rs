//! 上传项处理上下文
//!
//! 封装"我正在处理批次里的哪一个文件"这一信息

use std::fmt::Display;
use uuid::Uuid;

/// 上传项处理上下文
#[derive(Debug, Clone)]
pub struct ItemCtx {
    /// 上传项ID
    pub item_id: Uuid,

    /// 在批次中的位置（从1开始，仅用于日志显示）
    pub position: usize,

    /// 文件名
    pub file_name: String,
}

impl ItemCtx {
    pub fn new(item_id: Uuid, position: usize, file_name: impl Into<String>) -> Self {
        Self {
            item_id,
            position,
            file_name: file_name.into(),
        }
    }
}

impl Display for ItemCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[文件 #{} {}]", self.position, self.file_name)
    }
}
