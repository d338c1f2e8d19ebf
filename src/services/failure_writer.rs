//! 失败记录服务 - 业务能力层
//!
//! 只负责"把失败的上传项写进报告文件"能力，不关心流程

use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::AppResult;
use crate::models::UploadItem;

/// 失败记录服务
///
/// 职责：
/// - 将失败的上传项追加写入报告文件
/// - 不修改上传项
/// - 不关心批次状态
pub struct FailureWriter {
    report_file_path: String,
}

impl FailureWriter {
    /// 使用指定的报告文件路径创建
    pub fn with_path(path: impl Into<String>) -> Self {
        Self {
            report_file_path: path.into(),
        }
    }

    pub fn path(&self) -> &str {
        &self.report_file_path
    }

    /// 写入单个失败项
    pub async fn write(&self, item: &UploadItem) -> AppResult<()> {
        self.write_all(&[item]).await
    }

    /// 批量写入失败项，空列表不创建文件
    pub async fn write_all(&self, items: &[&UploadItem]) -> AppResult<()> {
        if items.is_empty() {
            return Ok(());
        }

        debug!("写入 {} 条失败记录到 {}", items.len(), self.report_file_path);

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.report_file_path)
            .await?;

        let mut report = String::new();
        for item in items {
            report.push_str(&format!(
                "{} | {} | {} | 错误: {}\n",
                item.id,
                item.file_name,
                item.source.path().display(),
                item.error.as_deref().unwrap_or("未知错误")
            ));
        }

        file.write_all(report.as_bytes()).await?;
        file.flush().await?;

        Ok(())
    }
}
