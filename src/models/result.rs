//! 分析结果与服务器响应结构

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Failure;

/// 最终判定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accept,
    ConditionalAccept,
    Reject,
}

impl Decision {
    /// 解析服务器返回的判定标签
    ///
    /// `"ACCEPT"` 为接受，包含 `"CONDITIONAL"` 的标签为有条件接受，其余一律视为拒绝。
    /// `"ERROR"` 不在此处处理，由响应解码转换为协议错误。
    pub fn from_label(label: &str) -> Self {
        let label = label.trim().to_ascii_uppercase();
        if label == "ACCEPT" {
            Decision::Accept
        } else if label.contains("CONDITIONAL") {
            Decision::ConditionalAccept
        } else {
            Decision::Reject
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Decision::Accept => "ACCEPT",
            Decision::ConditionalAccept => "CONDITIONAL ACCEPT",
            Decision::Reject => "REJECT",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 报告下载引用，由 (session_id, pdf_filename) 唯一确定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportHandle {
    pub session_id: String,
    pub pdf_filename: String,
}

impl ReportHandle {
    /// 相对于服务器根地址的下载路径
    pub fn download_path(&self) -> String {
        format!("/api/download/{}/{}", self.session_id, self.pdf_filename)
    }
}

/// 服务器附带的各单元指标（只含标量值），客户端不做解释
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMetrics {
    pub color: BTreeMap<String, JsonValue>,
    pub pattern: BTreeMap<String, JsonValue>,
    pub repetition: BTreeMap<String, JsonValue>,
}

impl AnalysisMetrics {
    pub fn is_empty(&self) -> bool {
        self.color.is_empty() && self.pattern.is_empty() && self.repetition.is_empty()
    }
}

/// 一次完成的会话产出的结果，产出后不再修改
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcResult {
    pub decision: Decision,
    pub color_score: f64,
    pub pattern_score: f64,
    pub overall_score: f64,
    pub report: Option<ReportHandle>,
    #[serde(default)]
    pub metrics: AnalysisMetrics,
}

// ========== 服务器响应结构 ==========

/// `POST /api/upload` 的响应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UploadResponse {
    pub session_id: Option<String>,
    pub error: Option<String>,
}

impl UploadResponse {
    pub fn into_session_id(self) -> Result<String, Failure> {
        match self.session_id {
            Some(id) if !id.trim().is_empty() => Ok(id),
            _ => Err(Failure::protocol(
                self.error
                    .unwrap_or_else(|| "上传响应缺少 session_id".to_string()),
            )),
        }
    }
}

/// `POST /api/analyze` 的响应
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnalyzeResponse {
    pub session_id: Option<String>,
    pub decision: Option<String>,
    pub color_score: Option<f64>,
    pub pattern_score: Option<f64>,
    pub overall_score: Option<f64>,
    pub pdf_filename: Option<String>,
    pub error: Option<String>,
    pub color_metrics: Option<BTreeMap<String, JsonValue>>,
    pub pattern_metrics: Option<BTreeMap<String, JsonValue>>,
    pub pattern_repetition: Option<BTreeMap<String, JsonValue>>,
}

impl AnalyzeResponse {
    /// 转换为结果
    ///
    /// # 参数
    /// - `session_id`: 请求时使用的会话 ID（响应中缺失时用于构造报告引用）
    ///
    /// # 返回
    /// `decision == "ERROR"`、缺少判定或缺少评分时返回协议错误
    pub fn into_result(self, session_id: &str) -> Result<QcResult, Failure> {
        let label = self
            .decision
            .ok_or_else(|| Failure::protocol("分析响应缺少 decision"))?;

        if label.trim().eq_ignore_ascii_case("ERROR") {
            return Err(Failure::protocol(
                self.error.unwrap_or_else(|| "分析失败".to_string()),
            ));
        }

        let score = |value: Option<f64>, name: &str| {
            value
                .map(|v| v.clamp(0.0, 100.0))
                .ok_or_else(|| Failure::protocol(format!("分析响应缺少 {}", name)))
        };
        let color_score = score(self.color_score, "color_score")?;
        let pattern_score = score(self.pattern_score, "pattern_score")?;
        let overall_score = score(self.overall_score, "overall_score")?;

        let report = self
            .pdf_filename
            .filter(|name| !name.trim().is_empty())
            .map(|pdf_filename| ReportHandle {
                session_id: self
                    .session_id
                    .filter(|id| !id.is_empty())
                    .unwrap_or_else(|| session_id.to_string()),
                pdf_filename,
            });

        Ok(QcResult {
            decision: Decision::from_label(&label),
            color_score,
            pattern_score,
            overall_score,
            report,
            metrics: AnalysisMetrics {
                color: self.color_metrics.unwrap_or_default(),
                pattern: self.pattern_metrics.unwrap_or_default(),
                repetition: self.pattern_repetition.unwrap_or_default(),
            },
        })
    }
}

/// `GET /api/health` 的响应
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status.eq_ignore_ascii_case("healthy")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use serde_json::json;

    fn decode(raw: JsonValue) -> Result<QcResult, Failure> {
        let response: AnalyzeResponse = serde_json::from_value(raw).unwrap();
        response.into_result("abc")
    }

    #[test]
    fn decision_labels() {
        assert_eq!(Decision::from_label("ACCEPT"), Decision::Accept);
        assert_eq!(
            Decision::from_label("CONDITIONAL ACCEPT"),
            Decision::ConditionalAccept
        );
        assert_eq!(Decision::from_label("REJECT"), Decision::Reject);
        assert_eq!(Decision::from_label("N/A"), Decision::Reject);
    }

    #[test]
    fn decodes_successful_analysis() {
        let result = decode(json!({
            "session_id": "abc",
            "decision": "ACCEPT",
            "color_score": 92.5,
            "pattern_score": 88.3,
            "overall_score": 90.4,
            "pdf_filename": "qc_report.pdf",
            "color_metrics": { "mean_de76": 1.2, "status": "PASS" }
        }))
        .unwrap();

        assert_eq!(result.decision, Decision::Accept);
        assert_eq!(result.overall_score, 90.4);
        let report = result.report.unwrap();
        assert_eq!(report.download_path(), "/api/download/abc/qc_report.pdf");
        assert_eq!(result.metrics.color["status"], json!("PASS"));
        assert!(result.metrics.pattern.is_empty());
    }

    #[test]
    fn embedded_error_is_protocol_failure() {
        let failure = decode(json!({
            "decision": "ERROR",
            "error": "Analysis returned no results",
            "color_score": 0,
            "pattern_score": 0,
            "overall_score": 0,
            "pdf_filename": ""
        }))
        .unwrap_err();

        assert_eq!(failure.kind, FailureKind::Protocol);
        assert_eq!(failure.message, "Analysis returned no results");
    }

    #[test]
    fn empty_pdf_filename_yields_no_report() {
        let result = decode(json!({
            "decision": "REJECT",
            "color_score": 40.0,
            "pattern_score": 45.0,
            "overall_score": 42.5,
            "pdf_filename": ""
        }))
        .unwrap();
        assert!(result.report.is_none());
    }

    #[test]
    fn missing_score_is_protocol_failure() {
        let failure = decode(json!({ "decision": "ACCEPT", "color_score": 90.0 })).unwrap_err();
        assert_eq!(failure.kind, FailureKind::Protocol);
    }
}
