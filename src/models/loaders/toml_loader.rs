use crate::models::settings::QcSettings;
use anyhow::{Context, Result};
use std::path::Path;
use tokio::fs;

/// 从 TOML 文件加载分析设置
///
/// 文件中未出现的字段使用默认值，未知字段原样保留并随分析请求透传。
pub async fn load_settings_file(toml_file_path: &Path) -> Result<QcSettings> {
    let content = fs::read_to_string(toml_file_path)
        .await
        .with_context(|| format!("无法读取设置文件: {}", toml_file_path.display()))?;

    let settings = parse_settings(&content)
        .with_context(|| format!("无法解析设置文件: {}", toml_file_path.display()))?;

    tracing::info!(
        "已加载设置文件: {} (总分阈值 {})",
        toml_file_path.display(),
        settings.overall_score_threshold
    );

    Ok(settings)
}

/// 解析 TOML 格式的设置文本
pub fn parse_settings(content: &str) -> Result<QcSettings> {
    let settings: QcSettings = toml::from_str(content)?;
    Ok(settings)
}
