//! 批量上传处理器 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责把一个目录里的收据批量上传。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：写日志文件头、创建处理服务
//! 2. **批量加载**：扫描目录下所有收据文件（`Vec<SourceFile>`）
//! 3. **启动批次**：创建 `UploadSession`，交给 `BatchNotifier` 编排
//! 4. **进度跟踪**：订阅状态快照，输出总进度变化
//! 5. **失败记录**：把失败项写入报告文件
//! 6. **全局统计**：汇总成功/失败/取消数量

use crate::config::Config;
use crate::error::AppResult;
use crate::models::{load_source_files, BatchState, BatchStatus, SourceFile};
use crate::orchestrator::session::UploadSession;
use crate::services::{FailureWriter, RemoteProcessor, SimulatedProcessor};
use crate::utils::logging;
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    processor: Arc<dyn RemoteProcessor>,
    failure_writer: FailureWriter,
}

impl App {
    /// 初始化应用（使用模拟处理服务）
    pub fn initialize(config: Config) -> AppResult<Self> {
        let processor =
            SimulatedProcessor::new(Duration::from_millis(config.simulated_step_delay_ms))
                .with_fail_every(config.simulated_fail_every);
        Self::with_processor(config, Arc::new(processor))
    }

    /// 使用指定的处理服务初始化
    pub fn with_processor(
        config: Config,
        processor: Arc<dyn RemoteProcessor>,
    ) -> AppResult<Self> {
        config.validate()?;

        // 初始化日志文件
        logging::init_log_file(&config.output_log_file)?;

        logging::log_startup(config.max_concurrent_uploads, config.item_timeout_secs);

        let failure_writer = FailureWriter::with_path(config.failure_report_file.clone());

        Ok(Self {
            config,
            processor,
            failure_writer,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(&self) -> Result<()> {
        let files = self.load_files().await?;

        if files.is_empty() {
            warn!("⚠️ 没有找到待上传的收据文件，程序结束");
            return Ok(());
        }

        logging::log_files_loaded(files.len(), self.config.max_concurrent_uploads);

        let final_state = self.process_files(files).await?;

        logging::print_final_stats(
            &final_state.stats(),
            final_state.success_rate(),
            self.failure_writer.path(),
        );

        Ok(())
    }

    /// 加载文件
    async fn load_files(&self) -> Result<Vec<SourceFile>> {
        info!("\n📁 正在扫描待上传的收据...");
        load_source_files(&self.config.source_folder).await
    }

    /// 上传并处理一批文件，返回最终状态
    pub async fn process_files(&self, files: Vec<SourceFile>) -> AppResult<BatchState> {
        let mut session = UploadSession::new(self.config.max_concurrent_uploads);
        session.begin_selection();
        session.add_files(files);

        let handle = session.start(self.processor.clone(), self.config.batch_options())?;

        // 跟踪进度，直到批次结束
        let mut updates = handle.subscribe();
        let mut last_progress = None;
        loop {
            let settled = {
                let state = updates.borrow_and_update();
                if last_progress != Some(state.total_progress) {
                    last_progress = Some(state.total_progress);
                    logging::log_progress(&state);
                }
                if self.config.verbose_logging {
                    for item in state.active_items() {
                        info!("   {}", item);
                    }
                }
                state.status.is_settled()
            };
            if settled || updates.changed().await.is_err() {
                break;
            }
        }

        let final_state = handle.wait_until_settled().await?;
        handle.shutdown().await;

        if final_state.status == BatchStatus::Cancelled {
            warn!("⚠️ 批次被取消");
        }

        let failed = final_state.failed_items();
        self.failure_writer.write_all(&failed).await?;

        Ok(final_state)
    }
}
