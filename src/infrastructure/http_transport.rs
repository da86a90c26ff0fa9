//! HTTP 传输 - 基础设施层
//!
//! 持有唯一的 HTTP 连接池，只暴露"发送一个请求"的能力

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::error::ApiError;

/// 请求方法
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

/// 多部分表单中的一个文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub field: String,
    pub file_name: String,
    pub data: Arc<[u8]>,
}

/// 请求体
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(JsonValue),
    Multipart(Vec<FilePart>),
}

/// 一个待发送的请求
#[derive(Debug, Clone, PartialEq)]
pub struct WireRequest {
    pub method: Method,
    pub path: String,
    pub body: RequestBody,
}

impl WireRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: RequestBody::Empty,
        }
    }

    pub fn post_json(path: impl Into<String>, body: JsonValue) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: RequestBody::Json(body),
        }
    }

    pub fn post_multipart(path: impl Into<String>, parts: Vec<FilePart>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: RequestBody::Multipart(parts),
        }
    }
}

/// 原始响应：状态码与未解析的响应体
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireResponse {
    pub status: u16,
    pub body: String,
}

impl WireResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 传输能力
///
/// 每次 `send` 恰好对应一次底层网络操作；丢弃返回的 future 即取消该操作。
pub trait Transport: Send + Sync {
    fn send(&self, request: WireRequest) -> BoxFuture<'_, Result<WireResponse, ApiError>>;

    /// 服务器根地址（用于拼接下载链接）
    fn base_url(&self) -> &str;
}

/// 基于 reqwest 的 HTTP 传输
///
/// 职责：
/// - 持有唯一的 reqwest Client
/// - 不认识 Session / 分析结果
/// - 不设置总超时，截止时间由调用方控制
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// 创建新的 HTTP 传输
    ///
    /// # 参数
    /// - `base_url`: 服务器根地址，例如 `http://127.0.0.1:5000`
    /// - `connect_timeout`: 建立连接的超时
    ///
    /// # 返回
    /// reqwest 客户端无法创建（如 TLS 后端初始化失败）时返回 `ClientBuildFailed`
    pub fn new(base_url: impl Into<String>, connect_timeout: Duration) -> Result<Self, ApiError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .build()
            .map_err(|e| ApiError::ClientBuildFailed {
                base_url: base_url.clone(),
                message: e.to_string(),
            })?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, request: WireRequest) -> Result<WireResponse, ApiError> {
        let url = self.url(&request.path);
        debug!("发送请求: {:?} {}", request.method, url);

        let builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
        };

        let builder = match request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(body) => builder.json(&body),
            RequestBody::Multipart(parts) => {
                let form = parts.into_iter().fold(Form::new(), |form, part| {
                    let file = Part::bytes(part.data.to_vec()).file_name(part.file_name);
                    form.part(part.field, file)
                });
                builder.multipart(form)
            }
        };

        let response = builder
            .header("Accept", "application/json, text/plain, */*")
            .send()
            .await
            .map_err(|e| ApiError::RequestFailed {
                endpoint: request.path.clone(),
                message: e.to_string(),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| ApiError::BodyReadFailed {
            endpoint: request.path.clone(),
            message: e.to_string(),
        })?;

        debug!("收到响应: {} {} ({} 字节)", status, url, body.len());

        Ok(WireResponse { status, body })
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: WireRequest) -> BoxFuture<'_, Result<WireResponse, ApiError>> {
        self.execute(request).boxed()
    }

    fn base_url(&self) -> &str {
        &self.base_url
    }
}
