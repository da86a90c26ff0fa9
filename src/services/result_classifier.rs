//! 结果分档服务 - 业务能力层
//!
//! 只负责把结果映射为展示用的档位，不关心流程

use serde::Serialize;

use crate::models::{Decision, QcResult, ScoreThresholds};

/// 判定档位（徽章样式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionBand {
    Accept,
    Conditional,
    Reject,
}

/// 评分档位（进度条样式）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreBand {
    Success,
    Warning,
    Danger,
}

/// 评分分档的下限
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BandLimits {
    /// 不低于此值为 success
    pub success_min: f64,
    /// 不低于此值为 warning，否则为 danger
    pub warning_min: f64,
}

impl BandLimits {
    /// 未提供设置时的通用分档：70 / 50
    pub const DEFAULT: BandLimits = BandLimits {
        success_min: 70.0,
        warning_min: 50.0,
    };

    /// 由合格阈值推导：warning 区间宽度与默认分档相同
    pub fn from_threshold(threshold: f64) -> Self {
        let width = Self::DEFAULT.success_min - Self::DEFAULT.warning_min;
        Self {
            success_min: threshold,
            warning_min: (threshold - width).max(0.0),
        }
    }

    pub fn band(&self, score: f64) -> ScoreBand {
        if score >= self.success_min {
            ScoreBand::Success
        } else if score >= self.warning_min {
            ScoreBand::Warning
        } else {
            ScoreBand::Danger
        }
    }
}

/// 分档结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Verdict {
    pub decision_band: DecisionBand,
    pub color_band: ScoreBand,
    pub pattern_band: ScoreBand,
    pub overall_band: ScoreBand,
    /// 面向操作员的合格/不合格措辞
    pub headline: &'static str,
}

/// 结果分档器
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResultClassifier {
    color: BandLimits,
    pattern: BandLimits,
    overall: BandLimits,
}

impl ResultClassifier {
    /// 使用通用分档（70 / 50）
    pub fn new() -> Self {
        Self {
            color: BandLimits::DEFAULT,
            pattern: BandLimits::DEFAULT,
            overall: BandLimits::DEFAULT,
        }
    }

    /// 使用设置中的评分阈值
    pub fn with_thresholds(thresholds: ScoreThresholds) -> Self {
        Self {
            color: BandLimits::from_threshold(thresholds.color),
            pattern: BandLimits::from_threshold(thresholds.pattern),
            overall: BandLimits::from_threshold(thresholds.overall),
        }
    }

    /// 设置存在时使用设置中的阈值，否则使用通用分档
    pub fn for_settings(thresholds: Option<ScoreThresholds>) -> Self {
        thresholds.map(Self::with_thresholds).unwrap_or_default()
    }

    pub fn decision_band(decision: Decision) -> DecisionBand {
        match decision {
            Decision::Accept => DecisionBand::Accept,
            Decision::ConditionalAccept => DecisionBand::Conditional,
            Decision::Reject => DecisionBand::Reject,
        }
    }

    /// 总分的档位
    pub fn score_band(&self, score: f64) -> ScoreBand {
        self.overall.band(score)
    }

    pub fn classify(&self, result: &QcResult) -> Verdict {
        let decision_band = Self::decision_band(result.decision);
        Verdict {
            decision_band,
            color_band: self.color.band(result.color_score),
            pattern_band: self.pattern.band(result.pattern_score),
            overall_band: self.overall.band(result.overall_score),
            headline: headline(decision_band),
        }
    }
}

impl Default for ResultClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn headline(band: DecisionBand) -> &'static str {
    match band {
        DecisionBand::Accept => "合格：样品与参考一致",
        DecisionBand::Conditional => "有条件合格：存在轻微差异，请人工复核",
        DecisionBand::Reject => "不合格：样品与参考差异过大",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnalysisMetrics;

    fn result(decision: Decision, color: f64, pattern: f64, overall: f64) -> QcResult {
        QcResult {
            decision,
            color_score: color,
            pattern_score: pattern,
            overall_score: overall,
            report: None,
            metrics: AnalysisMetrics::default(),
        }
    }

    #[test]
    fn default_bands() {
        let classifier = ResultClassifier::new();
        assert_eq!(classifier.score_band(90.4), ScoreBand::Success);
        assert_eq!(classifier.score_band(70.0), ScoreBand::Success);
        assert_eq!(classifier.score_band(69.9), ScoreBand::Warning);
        assert_eq!(classifier.score_band(50.0), ScoreBand::Warning);
        assert_eq!(classifier.score_band(49.9), ScoreBand::Danger);
    }

    #[test]
    fn classifies_each_score_independently() {
        let verdict =
            ResultClassifier::new().classify(&result(Decision::Reject, 92.0, 55.0, 40.0));
        assert_eq!(verdict.decision_band, DecisionBand::Reject);
        assert_eq!(verdict.color_band, ScoreBand::Success);
        assert_eq!(verdict.pattern_band, ScoreBand::Warning);
        assert_eq!(verdict.overall_band, ScoreBand::Danger);
    }

    #[test]
    fn configured_thresholds_override_defaults() {
        let classifier = ResultClassifier::for_settings(Some(ScoreThresholds {
            color: 70.0,
            pattern: 70.0,
            overall: 85.0,
        }));
        assert_eq!(classifier.score_band(80.2), ScoreBand::Warning);
        assert_eq!(classifier.score_band(85.0), ScoreBand::Success);
        assert_eq!(classifier.score_band(64.9), ScoreBand::Danger);

        let generic = ResultClassifier::for_settings(None);
        assert_eq!(generic.score_band(80.2), ScoreBand::Success);
    }

    #[test]
    fn conditional_decision_band() {
        let verdict = ResultClassifier::new().classify(&result(
            Decision::ConditionalAccept,
            78.2,
            82.1,
            80.2,
        ));
        assert_eq!(verdict.decision_band, DecisionBand::Conditional);
        assert_eq!(verdict.overall_band, ScoreBand::Success);
        assert!(verdict.headline.starts_with("有条件合格"));
    }
}
