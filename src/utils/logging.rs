/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use std::fs;
use tracing::info;

use crate::error::AppResult;
use crate::models::{BatchState, BatchStats};

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n收据批量上传日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `max_concurrent`: 最大并发数
/// - `timeout_secs`: 单个文件超时（秒）
pub fn log_startup(max_concurrent: usize, timeout_secs: u64) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 收据批量上传模式");
    info!("📊 最大并发数: {}", max_concurrent);
    info!("⏱️ 单个文件超时: {} 秒", timeout_secs);
    info!("{}", "=".repeat(60));
}

/// 记录文件加载信息
pub fn log_files_loaded(total: usize, max_concurrent: usize) {
    info!("✓ 找到 {} 个待上传的收据", total);
    info!("📋 最多同时处理 {} 个，完成一个放行一个\n", max_concurrent);
}

/// 记录批次进度
pub fn log_progress(state: &BatchState) {
    let stats = state.stats();
    info!(
        "📈 总进度 {:>3}% | 处理中 {} | 排队 {} | 完成 {} | 失败 {}",
        state.total_progress, stats.active, stats.queued, stats.completed, stats.failed
    );
}

/// 打印最终统计信息
///
/// # 参数
/// - `stats`: 批次统计
/// - `success_rate`: 成功率（百分比）
/// - `report_file_path`: 失败报告路径
pub fn print_final_stats(stats: &BatchStats, success_rate: f64, report_file_path: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{} ({:.1}%)", stats.completed, stats.total, success_rate);
    info!("❌ 失败: {}", stats.failed);
    info!("🛑 取消: {}", stats.cancelled);
    info!("{}", "=".repeat(60));
    if stats.failed > 0 {
        info!("\n失败文件已记录至: {}", report_file_path);
    }
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("收据-超市-2024.jpg", 5), "收据-超市...");
        assert_eq!(truncate_text("short", 10), "short");
    }
}
