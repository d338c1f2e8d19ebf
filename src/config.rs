use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::models::DEFAULT_MAX_CONCURRENT_UPLOADS;
use crate::orchestrator::{BatchOptions, DEFAULT_ITEM_TIMEOUT};

/// 默认配置文件路径
pub const DEFAULT_CONFIG_FILE: &str = "batch_upload.toml";

/// 程序配置文件
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时上传的文件数量
    pub max_concurrent_uploads: usize,
    /// 单个文件上传 + 识别的超时（秒）
    pub item_timeout_secs: u64,
    /// 待上传收据所在目录
    pub source_folder: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
    /// 失败文件报告
    pub failure_report_file: String,
    // --- 模拟处理服务 ---
    pub simulated_step_delay_ms: u64,
    /// 每第 N 个文件模拟识别失败，0 表示不失败
    pub simulated_fail_every: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            item_timeout_secs: DEFAULT_ITEM_TIMEOUT.as_secs(),
            source_folder: "receipts".to_string(),
            verbose_logging: false,
            output_log_file: "upload_log.txt".to_string(),
            failure_report_file: "failed_uploads.txt".to_string(),
            simulated_step_delay_ms: 300,
            simulated_fail_every: 0,
        }
    }
}

impl Config {
    /// 加载配置：配置文件（如存在）→ 环境变量覆盖 → 校验
    pub fn load() -> Result<Self> {
        let path = std::env::var("BATCH_UPLOAD_CONFIG")
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());

        let config = if Path::new(&path).exists() {
            Self::from_file(&path)?.with_overrides(|key| std::env::var(key).ok())?
        } else {
            Self::from_env()?
        };
        config.validate()?;
        Ok(config)
    }

    /// 默认值 + 环境变量覆盖
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// 从 TOML 文件读取，缺失的字段使用默认值
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("无法解析配置文件: {}", path.display()))?;
        Ok(config)
    }

    /// 用环境变量覆盖配置项
    pub fn with_overrides(
        self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            max_concurrent_uploads: parse_var(
                &lookup,
                "MAX_CONCURRENT_UPLOADS",
                "usize",
                self.max_concurrent_uploads,
            )?,
            item_timeout_secs: parse_var(&lookup, "ITEM_TIMEOUT_SECS", "u64", self.item_timeout_secs)?,
            source_folder: lookup("SOURCE_FOLDER").unwrap_or(self.source_folder),
            verbose_logging: parse_var(&lookup, "VERBOSE_LOGGING", "bool", self.verbose_logging)?,
            output_log_file: lookup("OUTPUT_LOG_FILE").unwrap_or(self.output_log_file),
            failure_report_file: lookup("FAILURE_REPORT_FILE").unwrap_or(self.failure_report_file),
            simulated_step_delay_ms: parse_var(
                &lookup,
                "SIMULATED_STEP_DELAY_MS",
                "u64",
                self.simulated_step_delay_ms,
            )?,
            simulated_fail_every: parse_var(
                &lookup,
                "SIMULATED_FAIL_EVERY",
                "usize",
                self.simulated_fail_every,
            )?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_uploads == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_concurrent_uploads",
                reason: "必须至少为 1".to_string(),
            });
        }
        if self.item_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "item_timeout_secs",
                reason: "必须大于 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn item_timeout(&self) -> Duration {
        Duration::from_secs(self.item_timeout_secs)
    }

    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            item_timeout: self.item_timeout(),
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    expected_type: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(var_name) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type,
            }),
    }
}
