/// 日志工具模块
///
/// 提供日志初始化与格式化输出的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::models::QcResult;
use crate::services::Verdict;

/// 初始化日志输出
///
/// `RUST_LOG` 存在时以其为准，否则按 `verbose` 选择 debug 或 info 级别。
///
/// # 参数
/// - `verbose`: 是否显示详细日志
pub fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    // 重复初始化（如测试中）时忽略错误
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 当前配置
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!(
        "🚀 程序启动 - 纺织品质检 ({})",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    match config.sample_id {
        Some(id) => info!("🎭 演示模式: 示例 #{}", id),
        None => {
            info!("🌐 分析服务: {}", config.server_url);
            info!("⏱️ 分析截止时间: {}ms", config.analyze_timeout_ms);
        }
    }
    info!("{}", "=".repeat(60));
}

/// 打印最终结果
///
/// # 参数
/// - `result`: 分析结果
/// - `verdict`: 分档结果
/// - `report_url`: 报告下载地址（如有）
pub fn log_verdict(result: &QcResult, verdict: &Verdict, report_url: Option<&str>) {
    info!("\n{}", "=".repeat(60));
    info!("📊 质检结果: {} ({:?})", result.decision, verdict.decision_band);
    info!("{}", verdict.headline);
    info!("{}", "=".repeat(60));
    info!(
        "🎨 颜色评分: {:.1} [{:?}]",
        result.color_score, verdict.color_band
    );
    info!(
        "🧵 图案评分: {:.1} [{:?}]",
        result.pattern_score, verdict.pattern_band
    );
    info!(
        "⭐ 总分:     {:.1} [{:?}]",
        result.overall_score, verdict.overall_band
    );
    if let Some(url) = report_url {
        info!("📄 报告下载: {}", url);
    }
    info!("{}", "=".repeat(60));
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
