use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::StageId;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// API 调用错误
    #[error("API错误: {0}")]
    Api(#[from] ApiError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 会话失败
    #[error("会话失败: {0}")]
    Session(#[from] Failure),
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 阶段权重之和不是 100
    #[error("阶段权重之和为 {total}，应为 100")]
    WeightSumMismatch { total: u32 },
    /// 单个阶段权重超出 1..=100
    #[error("阶段 {stage} 的权重 {weight} 超出范围 [1, 100]")]
    WeightOutOfRange { stage: StageId, weight: u8 },
    /// 阶段顺序与协议顺序不一致
    #[error("第 {position} 个阶段应为 {expected}，实际为 {found}")]
    StageOrder {
        position: usize,
        expected: StageId,
        found: StageId,
    },
    /// 阶段数量不对
    #[error("阶段数量为 {found}，应为 {expected}")]
    StageCount { expected: usize, found: usize },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// API 调用错误（传输层）
#[derive(Debug, Error)]
pub enum ApiError {
    /// 网络请求失败
    #[error("API请求失败 ({endpoint}): {message}")]
    RequestFailed { endpoint: String, message: String },
    /// 读取响应体失败
    #[error("读取响应失败 ({endpoint}): {message}")]
    BodyReadFailed { endpoint: String, message: String },
    /// HTTP 客户端创建失败
    #[error("HTTP客户端创建失败 ({base_url}): {message}")]
    ClientBuildFailed { base_url: String, message: String },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 文件不存在
    #[error("文件不存在: {path}")]
    NotFound { path: String },
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 会话失败的分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 开始前的校验失败（缺少图像、已有会话），不会创建会话
    Validation,
    /// 分析请求超过截止时间
    Timeout,
    /// 非成功响应或连接失败
    Transport,
    /// 响应为空、无法解析，或成功响应中嵌入了错误
    Protocol,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Validation => "校验失败",
            FailureKind::Timeout => "超时",
            FailureKind::Transport => "传输失败",
            FailureKind::Protocol => "协议错误",
        };
        f.write_str(name)
    }
}

/// 会话的终止失败
///
/// 一个会话最多产生一个 `Failure`，产生后会话即结束，不会再有部分结果。
///
/// 对传输失败，`message` 只保存服务器给出的文本（可能为空）；
/// 本地诊断信息（连接错误、状态码）放在 `detail`，只写入日志，不展示给操作员。
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {}", describe(.message, .detail))]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

fn describe(message: &str, detail: &Option<String>) -> String {
    match detail {
        Some(detail) if message.trim().is_empty() => detail.clone(),
        Some(detail) => format!("{} ({})", message, detail),
        None => message.to_string(),
    }
}

/// 传输失败且服务器没有给出错误文本时使用
pub const GENERIC_FAILURE_MESSAGE: &str = "分析失败，请稍后重试";
const TIMEOUT_MESSAGE: &str = "分析耗时过长，请尝试使用更小的图像";
const PROTOCOL_MESSAGE: &str = "服务器响应异常";

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            detail: None,
        }
    }

    /// 附加本地诊断信息
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Validation, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Timeout, message)
    }

    /// 服务器返回了错误，`message` 为服务器给出的文本
    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, message)
    }

    /// 请求未得到服务器响应（连接失败、读取失败），没有可展示的服务器文本
    pub fn unreachable(detail: impl Into<String>) -> Self {
        Self::new(FailureKind::Transport, String::new()).with_detail(detail)
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(FailureKind::Protocol, message)
    }

    /// 面向操作员的提示文本
    ///
    /// 超时和协议错误使用固定文案；传输失败原样展示服务器给出的文本，
    /// 没有文本时使用通用文案；校验失败直接展示原因。
    pub fn user_message(&self) -> String {
        match self.kind {
            FailureKind::Timeout => TIMEOUT_MESSAGE.to_string(),
            FailureKind::Protocol => PROTOCOL_MESSAGE.to_string(),
            FailureKind::Transport if self.message.trim().is_empty() => {
                GENERIC_FAILURE_MESSAGE.to_string()
            }
            FailureKind::Transport | FailureKind::Validation => self.message.clone(),
        }
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
