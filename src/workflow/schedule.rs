//! 本地阶段时间表
//!
//! 分析请求在服务器端是一次调用，客户端看不到真实的子阶段进度。
//! 时间表按固定的时间偏移推进阶段标记，只用于让操作员看到进展，
//! 偏移量本身不代表服务器的真实进度。

use std::time::Duration;

use crate::models::StageId;

/// 时间表中的一个标记
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum StageMark {
    Begin(StageId),
    /// 进行中阶段的部分进度（0.0..1.0）
    Progress(StageId, f64),
    Complete(StageId),
}

/// 相对于分析开始时刻的一个标记
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduleStep {
    pub offset: Duration,
    pub mark: StageMark,
}

/// 阶段时间表，偏移量单调不减
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StageSchedule {
    steps: Vec<ScheduleStep>,
}

/// 实时模式的阶段开始偏移
const LIVE_OFFSETS_MS: [(StageId, u64); 5] = [
    (StageId::Color, 0),
    (StageId::Pattern, 500),
    (StageId::Repetition, 1000),
    (StageId::Scoring, 1500),
    (StageId::Report, 2000),
];

/// 模拟模式每个阶段的持续时间
const SIMULATED_DURATIONS_MS: [(StageId, u64); 5] = [
    (StageId::Color, 800),
    (StageId::Pattern, 800),
    (StageId::Repetition, 600),
    (StageId::Scoring, 400),
    (StageId::Report, 400),
];

impl StageSchedule {
    /// 实时模式的时间表
    ///
    /// 颜色立即开始，之后每 500ms 推进一个阶段；报告阶段保持进行中，
    /// 直到真实请求返回后统一完成。
    pub fn live() -> Self {
        Self::advancing(&LIVE_OFFSETS_MS.map(|(stage, ms)| (stage, Duration::from_millis(ms))))
    }

    /// 模拟模式的时间表
    pub fn simulated() -> Self {
        Self::sequential(
            &SIMULATED_DURATIONS_MS.map(|(stage, ms)| (stage, Duration::from_millis(ms))),
        )
    }

    /// 由阶段开始偏移构造：每个阶段开始时完成上一个阶段，最后一个阶段不完成
    pub fn advancing(begins: &[(StageId, Duration)]) -> Self {
        let mut steps = Vec::with_capacity(begins.len() * 2);
        let mut previous: Option<StageId> = None;
        let mut floor = Duration::ZERO;

        for &(stage, offset) in begins {
            let offset = offset.max(floor);
            floor = offset;
            if let Some(prev) = previous {
                steps.push(ScheduleStep {
                    offset,
                    mark: StageMark::Complete(prev),
                });
            }
            steps.push(ScheduleStep {
                offset,
                mark: StageMark::Begin(stage),
            });
            previous = Some(stage);
        }

        Self { steps }
    }

    /// 由每个阶段的持续时间构造：开始、过半、完成依次排列
    pub fn sequential(durations: &[(StageId, Duration)]) -> Self {
        let mut steps = Vec::with_capacity(durations.len() * 3);
        let mut at = Duration::ZERO;

        for &(stage, duration) in durations {
            steps.push(ScheduleStep {
                offset: at,
                mark: StageMark::Begin(stage),
            });
            steps.push(ScheduleStep {
                offset: at + duration / 2,
                mark: StageMark::Progress(stage, 0.5),
            });
            at += duration;
            steps.push(ScheduleStep {
                offset: at,
                mark: StageMark::Complete(stage),
            });
        }

        Self { steps }
    }

    pub fn steps(&self) -> &[ScheduleStep] {
        &self.steps
    }

    pub fn step(&self, index: usize) -> Option<&ScheduleStep> {
        self.steps.get(index)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// 最后一个标记的偏移
    pub fn total_duration(&self) -> Duration {
        self.steps.last().map(|s| s.offset).unwrap_or_default()
    }
}
