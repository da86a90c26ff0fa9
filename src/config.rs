use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// 程序配置
#[derive(Clone, Debug, PartialEq)]
pub struct Config {
    /// 分析服务地址
    pub server_url: String,
    /// 分析请求截止时间（毫秒）
    pub analyze_timeout_ms: u64,
    /// 建立连接超时（毫秒）
    pub connect_timeout_ms: u64,
    /// 启动阶段健康检查与默认设置请求的截止时间（毫秒）
    pub startup_timeout_ms: u64,
    /// 进度到达 100% 后展示结果前的停顿（毫秒）
    pub settle_delay_ms: u64,
    /// 参考图像路径
    pub reference_image: Option<PathBuf>,
    /// 样品图像路径
    pub sample_image: Option<PathBuf>,
    /// 分析设置 TOML 文件
    pub settings_file: Option<PathBuf>,
    /// 设置后进入演示模式，按编号回放预置结果
    pub sample_id: Option<u32>,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_url: "http://127.0.0.1:5000".to_string(),
            analyze_timeout_ms: 300_000,
            connect_timeout_ms: 10_000,
            startup_timeout_ms: 5_000,
            settle_delay_ms: 1_000,
            reference_image: None,
            sample_image: None,
            settings_file: None,
            sample_id: None,
            verbose_logging: false,
        }
    }
}

impl Config {
    /// 从环境变量读取配置，未设置的项使用默认值
    ///
    /// # 返回
    /// 变量存在但无法解析时返回 `EnvVarParseFailed`
    pub fn from_env() -> Result<Self, ConfigError> {
        let default = Self::default();
        Ok(Self {
            server_url: std::env::var("QC_SERVER_URL").unwrap_or(default.server_url),
            analyze_timeout_ms: parse_var("QC_ANALYZE_TIMEOUT_MS", "u64")?
                .unwrap_or(default.analyze_timeout_ms),
            connect_timeout_ms: parse_var("QC_CONNECT_TIMEOUT_MS", "u64")?
                .unwrap_or(default.connect_timeout_ms),
            startup_timeout_ms: parse_var("QC_STARTUP_TIMEOUT_MS", "u64")?
                .unwrap_or(default.startup_timeout_ms),
            settle_delay_ms: parse_var("QC_SETTLE_DELAY_MS", "u64")?
                .unwrap_or(default.settle_delay_ms),
            reference_image: std::env::var_os("QC_REFERENCE_IMAGE").map(PathBuf::from),
            sample_image: std::env::var_os("QC_SAMPLE_IMAGE").map(PathBuf::from),
            settings_file: std::env::var_os("QC_SETTINGS_FILE").map(PathBuf::from),
            sample_id: parse_var("QC_SAMPLE_ID", "u32")?,
            verbose_logging: parse_var("VERBOSE_LOGGING", "bool")?
                .unwrap_or(default.verbose_logging),
        })
    }

    pub fn analyze_deadline(&self) -> Duration {
        Duration::from_millis(self.analyze_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

fn parse_var<T: FromStr>(
    var_name: &'static str,
    expected_type: &'static str,
) -> Result<Option<T>, ConfigError> {
    match std::env::var(var_name) {
        Ok(value) => parse_value(var_name, &value, expected_type).map(Some),
        Err(_) => Ok(None),
    }
}

fn parse_value<T: FromStr>(
    var_name: &str,
    value: &str,
    expected_type: &str,
) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::EnvVarParseFailed {
            var_name: var_name.to_string(),
            value: value.to_string(),
            expected_type: expected_type.to_string(),
        })
}
