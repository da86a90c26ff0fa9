//! 示例结果服务 - 业务能力层
//!
//! 演示/示例运行不访问服务器，按示例编号从固定列表中循环选取结果

use crate::models::{AnalysisMetrics, Decision, QcResult};

/// 一个预置结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CannedOutcome {
    pub decision: Decision,
    pub color_score: f64,
    pub pattern_score: f64,
    pub overall_score: f64,
}

/// 固定的结果列表，示例编号从 1 开始依次对应
pub const CANNED_OUTCOMES: [CannedOutcome; 3] = [
    CannedOutcome {
        decision: Decision::Accept,
        color_score: 92.5,
        pattern_score: 88.3,
        overall_score: 90.4,
    },
    CannedOutcome {
        decision: Decision::ConditionalAccept,
        color_score: 78.2,
        pattern_score: 82.1,
        overall_score: 80.2,
    },
    CannedOutcome {
        decision: Decision::Reject,
        color_score: 45.6,
        pattern_score: 52.3,
        overall_score: 48.9,
    },
];

/// 按示例编号选取预置结果
///
/// 编号 1 对应第一项，编号 2 对应第二项，依此循环；编号 0 视为列表末项。
pub fn canned_outcome(sample_id: u32) -> CannedOutcome {
    let n = CANNED_OUTCOMES.len();
    let index = (sample_id as usize % n + n - 1) % n;
    CANNED_OUTCOMES[index]
}

impl CannedOutcome {
    pub fn to_result(self) -> QcResult {
        QcResult {
            decision: self.decision,
            color_score: self.color_score,
            pattern_score: self.pattern_score,
            overall_score: self.overall_score,
            report: None,
            metrics: AnalysisMetrics::default(),
        }
    }
}
