/// 质检分析服务客户端
///
/// 封装所有与远程分析服务相关的调用逻辑：截止时间、响应分类与解码
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{json, Value as JsonValue};
use tracing::{debug, warn};

use crate::error::Failure;
use crate::infrastructure::{FilePart, Transport, WireRequest, WireResponse};
use crate::models::{
    AnalyzeResponse, HealthStatus, ImagePair, QcResult, QcSettings, ReportHandle, UploadResponse,
};
use crate::utils::logging::truncate_text;

/// 分析请求的默认截止时间
pub const DEFAULT_ANALYZE_DEADLINE: Duration = Duration::from_millis(300_000);

/// 发往分析服务的请求
#[derive(Debug, Clone)]
pub enum QcRequest {
    /// 上传参考图像与样品图像
    Upload(ImagePair),
    /// 对已上传的会话执行完整分析
    Analyze {
        session_id: String,
        settings: QcSettings,
    },
    /// 健康检查
    Health,
    /// 获取服务器默认设置
    DefaultSettings,
}

impl QcRequest {
    fn endpoint(&self) -> &'static str {
        match self {
            QcRequest::Upload(_) => "/api/upload",
            QcRequest::Analyze { .. } => "/api/analyze",
            QcRequest::Health => "/api/health",
            QcRequest::DefaultSettings => "/api/settings/default",
        }
    }

    fn to_wire(&self) -> WireRequest {
        let endpoint = self.endpoint();
        match self {
            QcRequest::Upload(images) => WireRequest::post_multipart(
                endpoint,
                vec![
                    FilePart {
                        field: "reference".to_string(),
                        file_name: images.reference.file_name().to_string(),
                        data: images.reference.bytes().into(),
                    },
                    FilePart {
                        field: "sample".to_string(),
                        file_name: images.sample.file_name().to_string(),
                        data: images.sample.bytes().into(),
                    },
                ],
            ),
            QcRequest::Analyze {
                session_id,
                settings,
            } => WireRequest::post_json(
                endpoint,
                json!({
                    "session_id": session_id,
                    "settings": settings,
                }),
            ),
            QcRequest::Health | QcRequest::DefaultSettings => WireRequest::get(endpoint),
        }
    }
}

/// 分析服务的类型化响应
#[derive(Debug, Clone, PartialEq)]
pub enum QcResponse {
    Uploaded { session_id: String },
    Analyzed(QcResult),
    Health(HealthStatus),
    DefaultSettings(QcSettings),
}

/// 分析服务客户端
pub struct QcClient<T: Transport> {
    transport: T,
    analyze_deadline: Duration,
}

impl<T: Transport> QcClient<T> {
    /// 创建新的客户端
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            analyze_deadline: DEFAULT_ANALYZE_DEADLINE,
        }
    }

    /// 设置分析请求的截止时间
    pub fn with_analyze_deadline(mut self, deadline: Duration) -> Self {
        self.analyze_deadline = deadline;
        self
    }

    pub fn analyze_deadline(&self) -> Duration {
        self.analyze_deadline
    }

    /// 发送一个请求
    ///
    /// # 参数
    /// - `request`: 请求内容
    /// - `deadline`: 截止时间；到期时丢弃底层网络操作并返回 `Timeout`
    ///
    /// # 返回
    /// 类型化的响应，或 `Timeout` / `Transport` / `Protocol` 失败
    pub async fn invoke(
        &self,
        request: &QcRequest,
        deadline: Option<Duration>,
    ) -> Result<QcResponse, Failure> {
        let endpoint = request.endpoint();
        let exchange = self.transport.send(request.to_wire());

        let outcome = match deadline {
            Some(limit) => match tokio::time::timeout(limit, exchange).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!("请求 {} 超过截止时间 {}ms", endpoint, limit.as_millis());
                    return Err(Failure::timeout(format!(
                        "{} 超过截止时间 {}ms",
                        endpoint,
                        limit.as_millis()
                    )));
                }
            },
            None => exchange.await,
        };

        let response = outcome.map_err(|e| {
            warn!("请求 {} 失败: {}", endpoint, e);
            Failure::unreachable(e.to_string())
        })?;

        decode_response(request, response)
    }

    /// 上传图像，返回服务器分配的 session_id
    pub async fn upload(&self, images: &ImagePair) -> Result<String, Failure> {
        match self.invoke(&QcRequest::Upload(images.clone()), None).await? {
            QcResponse::Uploaded { session_id } => Ok(session_id),
            other => Err(unexpected(&other)),
        }
    }

    /// 执行分析（受截止时间约束）
    pub async fn analyze(
        &self,
        session_id: &str,
        settings: &QcSettings,
    ) -> Result<QcResult, Failure> {
        let request = QcRequest::Analyze {
            session_id: session_id.to_string(),
            settings: settings.clone(),
        };
        match self.invoke(&request, Some(self.analyze_deadline)).await? {
            QcResponse::Analyzed(result) => Ok(result),
            other => Err(unexpected(&other)),
        }
    }

    /// 健康检查
    pub async fn health(&self) -> Result<HealthStatus, Failure> {
        match self.invoke(&QcRequest::Health, None).await? {
            QcResponse::Health(status) => Ok(status),
            other => Err(unexpected(&other)),
        }
    }

    /// 获取服务器默认设置
    pub async fn default_settings(&self) -> Result<QcSettings, Failure> {
        match self.invoke(&QcRequest::DefaultSettings, None).await? {
            QcResponse::DefaultSettings(settings) => Ok(settings),
            other => Err(unexpected(&other)),
        }
    }

    /// 报告的完整下载地址
    pub fn report_url(&self, report: &ReportHandle) -> String {
        format!("{}{}", self.transport.base_url(), report.download_path())
    }
}

fn unexpected(response: &QcResponse) -> Failure {
    Failure::protocol(format!("响应类型不符: {:?}", response))
}

/// 按请求类型解码原始响应
///
/// - 非成功状态码 → `Transport`，优先使用服务器给出的 `error` 文本
/// - 响应体为空或无法解析 → `Protocol`
pub fn decode_response(request: &QcRequest, response: WireResponse) -> Result<QcResponse, Failure> {
    let endpoint = request.endpoint();

    if !response.is_success() {
        let message = server_error_text(&response.body).unwrap_or_default();
        warn!(
            "{} 返回错误状态 {}: {}",
            endpoint,
            response.status,
            truncate_text(&response.body, 200)
        );
        return Err(
            Failure::transport(message).with_detail(format!("HTTP {}", response.status)),
        );
    }

    if response.body.trim().is_empty() {
        return Err(Failure::protocol(format!("{} 返回空响应", endpoint)));
    }

    debug!("{} 响应: {}", endpoint, truncate_text(&response.body, 200));

    match request {
        QcRequest::Upload(_) => {
            let parsed: UploadResponse = parse_body(endpoint, &response.body)?;
            Ok(QcResponse::Uploaded {
                session_id: parsed.into_session_id()?,
            })
        }
        QcRequest::Analyze { session_id, .. } => {
            let parsed: AnalyzeResponse = parse_body(endpoint, &response.body)?;
            Ok(QcResponse::Analyzed(parsed.into_result(session_id)?))
        }
        QcRequest::Health => Ok(QcResponse::Health(parse_body(endpoint, &response.body)?)),
        QcRequest::DefaultSettings => Ok(QcResponse::DefaultSettings(parse_body(
            endpoint,
            &response.body,
        )?)),
    }
}

fn parse_body<D: DeserializeOwned>(endpoint: &str, body: &str) -> Result<D, Failure> {
    serde_json::from_str(body).map_err(|e| {
        warn!("{} 响应无法解析: {}", endpoint, e);
        Failure::protocol(format!("{} 响应无法解析: {}", endpoint, e))
    })
}

/// 提取错误响应中的 `error` 字段
fn server_error_text(body: &str) -> Option<String> {
    let value: JsonValue = serde_json::from_str(body).ok()?;
    value
        .get("error")
        .and_then(|v| v.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
