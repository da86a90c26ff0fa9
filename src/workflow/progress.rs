//! 进度跟踪
//!
//! 阶段状态机：Pending → Active → Completed，严格按注册表顺序推进。
//! 每次变更都返回完整快照，由上层作为通知转发给展示层。

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::models::{StageId, StageRegistry};

const IDLE_TEXT: &str = "等待开始";
const DONE_TEXT: &str = "分析完成";

/// 单个阶段的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Active,
    Completed,
}

/// 进度快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressSnapshot {
    /// 0..=100
    pub percentage: u8,
    pub status_text: String,
    pub stage_states: BTreeMap<StageId, StageState>,
}

impl ProgressSnapshot {
    pub fn state_of(&self, stage: StageId) -> StageState {
        self.stage_states
            .get(&stage)
            .copied()
            .unwrap_or(StageState::Pending)
    }

    pub fn all_pending(&self) -> bool {
        self.stage_states
            .values()
            .all(|s| *s == StageState::Pending)
    }

    pub fn all_completed(&self) -> bool {
        self.stage_states
            .values()
            .all(|s| *s == StageState::Completed)
    }
}

/// 被拒绝的状态变更；被拒绝时跟踪器状态不变
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProgressError {
    #[error("阶段 {stage} 无法开始: 前置阶段 {blocking} 尚未完成")]
    OutOfOrder { stage: StageId, blocking: StageId },
    #[error("阶段 {stage} 无法开始: 当前状态为 {state:?}")]
    NotPending { stage: StageId, state: StageState },
    #[error("阶段 {stage} 未处于进行中: 当前状态为 {state:?}")]
    NotActive { stage: StageId, state: StageState },
}

/// 进度跟踪器
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    registry: StageRegistry,
    states: [StageState; 6],
    /// 当前进行中阶段已完成的比例（仅模拟模式使用）
    partial: f64,
    status_text: String,
}

impl ProgressTracker {
    pub fn new(registry: StageRegistry) -> Self {
        Self {
            registry,
            states: [StageState::Pending; 6],
            partial: 0.0,
            status_text: IDLE_TEXT.to_string(),
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    pub fn state(&self, stage: StageId) -> StageState {
        self.states[stage.index()]
    }

    /// 当前进行中的阶段
    pub fn active_stage(&self) -> Option<StageId> {
        StageId::ALL
            .into_iter()
            .find(|s| self.state(*s) == StageState::Active)
    }

    /// 已完成阶段的权重之和
    pub fn completed_weight(&self) -> u32 {
        StageId::ALL
            .into_iter()
            .filter(|s| self.state(*s) == StageState::Completed)
            .map(|s| u32::from(self.registry.weight(s)))
            .sum()
    }

    /// 当前百分比：已完成阶段权重 + 进行中阶段的部分权重
    pub fn percentage(&self) -> u8 {
        let partial = self
            .active_stage()
            .map(|s| (f64::from(self.registry.weight(s)) * self.partial).floor() as u32)
            .unwrap_or(0);
        (self.completed_weight() + partial).min(100) as u8
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            percentage: self.percentage(),
            status_text: self.status_text.clone(),
            stage_states: StageId::ALL
                .into_iter()
                .map(|s| (s, self.state(s)))
                .collect(),
        }
    }

    /// 开始一个阶段
    ///
    /// 要求所有前置阶段已完成，且该阶段尚未开始
    pub fn begin(&mut self, stage: StageId) -> Result<ProgressSnapshot, ProgressError> {
        let state = self.state(stage);
        if state != StageState::Pending {
            return Err(ProgressError::NotPending { stage, state });
        }

        if let Some(blocking) = StageId::ALL[..stage.index()]
            .iter()
            .copied()
            .find(|s| self.state(*s) != StageState::Completed)
        {
            return Err(ProgressError::OutOfOrder { stage, blocking });
        }

        self.states[stage.index()] = StageState::Active;
        self.partial = 0.0;
        self.status_text = self.registry.get(stage).display_name.to_string();
        Ok(self.snapshot())
    }

    /// 报告进行中阶段的部分进度（0.0..1.0）
    ///
    /// 只会增加，不会回退；完成需调用 [`complete`](Self::complete)
    pub fn advance(
        &mut self,
        stage: StageId,
        fraction: f64,
    ) -> Result<ProgressSnapshot, ProgressError> {
        let state = self.state(stage);
        if state != StageState::Active {
            return Err(ProgressError::NotActive { stage, state });
        }

        let fraction = if fraction.is_nan() {
            0.0
        } else {
            fraction.clamp(0.0, 0.99)
        };
        self.partial = self.partial.max(fraction);
        Ok(self.snapshot())
    }

    /// 完成一个进行中的阶段
    pub fn complete(&mut self, stage: StageId) -> Result<ProgressSnapshot, ProgressError> {
        let state = self.state(stage);
        if state != StageState::Active {
            return Err(ProgressError::NotActive { stage, state });
        }

        self.states[stage.index()] = StageState::Completed;
        self.partial = 0.0;
        if self.states.iter().all(|s| *s == StageState::Completed) {
            self.status_text = DONE_TEXT.to_string();
        }
        Ok(self.snapshot())
    }

    /// 将所有剩余阶段强制标记为完成
    ///
    /// 重复调用不会改变状态
    pub fn complete_all(&mut self) -> ProgressSnapshot {
        self.states = [StageState::Completed; 6];
        self.partial = 0.0;
        self.status_text = DONE_TEXT.to_string();
        self.snapshot()
    }

    /// 回到全部 Pending、0%
    pub fn reset(&mut self) -> ProgressSnapshot {
        self.states = [StageState::Pending; 6];
        self.partial = 0.0;
        self.status_text = IDLE_TEXT.to_string();
        self.snapshot()
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(StageRegistry::standard())
    }
}
