//! 分析设置（随分析请求原样发送给服务器）

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// 分析设置记录
///
/// 客户端只关心其中的评分阈值（用于分档显示），其余字段原样透传。
/// 未知字段保存在 `extra` 中，序列化时一并发送。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QcSettings {
    // --- 裁剪参数 ---
    pub use_crop: bool,
    pub crop_shape: String,
    pub crop_center_x: f64,
    pub crop_center_y: f64,
    pub crop_width: f64,
    pub crop_height: f64,

    // --- 阈值 ---
    pub delta_e_threshold: f64,
    pub delta_e_conditional: f64,
    pub ssim_pass_threshold: f64,
    pub ssim_conditional_threshold: f64,
    pub color_score_threshold: f64,
    pub pattern_score_threshold: f64,
    pub overall_score_threshold: f64,

    // --- 功能开关 ---
    pub enable_color_unit: bool,
    pub enable_pattern_unit: bool,
    pub enable_pattern_repetition: bool,
    pub enable_spectrophotometer: bool,
    pub enable_analysis_settings: bool,

    // --- 分析参数 ---
    pub cmc_l_c_ratio: String,
    pub observer_angle: String,
    pub geometry_mode: String,
    pub wavelet_type: String,
    pub keypoint_detector: String,

    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl Default for QcSettings {
    fn default() -> Self {
        Self {
            use_crop: false,
            crop_shape: "rectangle".to_string(),
            crop_center_x: 0.5,
            crop_center_y: 0.5,
            crop_width: 1.0,
            crop_height: 1.0,
            delta_e_threshold: 2.0,
            delta_e_conditional: 3.5,
            ssim_pass_threshold: 0.95,
            ssim_conditional_threshold: 0.90,
            color_score_threshold: 70.0,
            pattern_score_threshold: 70.0,
            overall_score_threshold: 70.0,
            enable_color_unit: true,
            enable_pattern_unit: true,
            enable_pattern_repetition: true,
            enable_spectrophotometer: false,
            enable_analysis_settings: false,
            cmc_l_c_ratio: "2:1".to_string(),
            observer_angle: "2".to_string(),
            geometry_mode: "d/8 SCI".to_string(),
            wavelet_type: "db4".to_string(),
            keypoint_detector: "ORB".to_string(),
            extra: Map::new(),
        }
    }
}

/// 三项评分的合格阈值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreThresholds {
    pub color: f64,
    pub pattern: f64,
    pub overall: f64,
}

impl QcSettings {
    pub fn score_thresholds(&self) -> ScoreThresholds {
        ScoreThresholds {
            color: self.color_score_threshold,
            pattern: self.pattern_score_threshold,
            overall: self.overall_score_threshold,
        }
    }
}
