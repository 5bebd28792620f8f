/// 日志工具模块
///
/// 初始化 tracing 订阅者，并提供各阶段通用的日志格式辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅者
///
/// 日志级别由 `RUST_LOG` 环境变量控制，默认 `info`。
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `run_id`: 本次运行的编号
/// - `paper_count`: 待处理论文数量
pub fn log_startup(run_id: &str, paper_count: usize) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - arXiv 论文采集流水线");
    info!("📋 运行编号: {}", run_id);
    info!("📊 待处理论文: {} 篇", paper_count);
    info!("{}", "=".repeat(60));
}

/// 记录阶段开始信息
pub fn log_stage_start(stage_name: &str) {
    info!("\n{}", "─".repeat(60));
    info!("📦 {} 开始", stage_name);
    info!("{}", "─".repeat(60));
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
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("a longer title here", 8), "a longer...");
    }
}
