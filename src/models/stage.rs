//! 分析阶段定义
//!
//! 阶段顺序（上传 → 颜色 → 图案 → 重复性 → 评分 → 报告）是协议的一部分，不可配置。

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// 阶段标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Upload,
    Color,
    Pattern,
    Repetition,
    Scoring,
    Report,
}

impl StageId {
    /// 按协议顺序排列的全部阶段
    pub const ALL: [StageId; 6] = [
        StageId::Upload,
        StageId::Color,
        StageId::Pattern,
        StageId::Repetition,
        StageId::Scoring,
        StageId::Report,
    ];

    /// 在协议顺序中的位置（从 0 开始）
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StageId::Upload => "upload",
            StageId::Color => "color",
            StageId::Pattern => "pattern",
            StageId::Repetition => "repetition",
            StageId::Scoring => "scoring",
            StageId::Report => "report",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个阶段：标识、显示名和权重
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stage {
    pub id: StageId,
    pub display_name: &'static str,
    pub weight: u8,
}

impl Stage {
    pub const fn new(id: StageId, display_name: &'static str, weight: u8) -> Self {
        Self {
            id,
            display_name,
            weight,
        }
    }
}

const STANDARD_STAGES: [Stage; 6] = [
    Stage::new(StageId::Upload, "正在上传图像...", 10),
    Stage::new(StageId::Color, "正在分析颜色...", 25),
    Stage::new(StageId::Pattern, "正在分析图案...", 25),
    Stage::new(StageId::Repetition, "正在检测图案重复性...", 20),
    Stage::new(StageId::Scoring, "正在计算评分...", 10),
    Stage::new(StageId::Report, "正在生成报告...", 10),
];

/// 阶段注册表
///
/// 权重之和必须正好为 100；违反时属于启动期的致命配置错误。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRegistry {
    stages: Vec<Stage>,
}

impl StageRegistry {
    /// 标准的六阶段注册表
    pub fn standard() -> Self {
        Self {
            stages: STANDARD_STAGES.to_vec(),
        }
    }

    /// 使用自定义显示名或权重创建注册表，创建时即校验
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        let registry = Self { stages };
        registry.validate()?;
        Ok(registry)
    }

    /// 校验阶段数量、顺序与权重
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.stages.len() != StageId::ALL.len() {
            return Err(ConfigError::StageCount {
                expected: StageId::ALL.len(),
                found: self.stages.len(),
            });
        }

        for (position, (stage, expected)) in self.stages.iter().zip(StageId::ALL).enumerate() {
            if stage.id != expected {
                return Err(ConfigError::StageOrder {
                    position,
                    expected,
                    found: stage.id,
                });
            }
            if !(1..=100).contains(&stage.weight) {
                return Err(ConfigError::WeightOutOfRange {
                    stage: stage.id,
                    weight: stage.weight,
                });
            }
        }

        let total = self.total_weight();
        if total != 100 {
            return Err(ConfigError::WeightSumMismatch { total });
        }

        Ok(())
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// 按标识查找阶段；注册表经过校验，每个标识都恰好出现一次
    pub fn get(&self, id: StageId) -> &Stage {
        &self.stages[id.index()]
    }

    pub fn weight(&self, id: StageId) -> u8 {
        self.get(id).weight
    }

    pub fn total_weight(&self) -> u32 {
        self.stages.iter().map(|s| u32::from(s.weight)).sum()
    }
}

impl Default for StageRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
