//! 日志初始化

use tracing_subscriber::EnvFilter;

/// 初始化全局日志（`RUST_LOG` 优先，默认 info）
///
/// 重复调用是安全的，测试中可以多次调用
pub fn init() {
    init_with_default("info");
}

/// 详细模式下默认输出 debug 日志
pub fn init_verbose(verbose: bool) {
    init_with_default(if verbose { "debug" } else { "info" });
}

fn init_with_default(default_directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
