//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责单次质检会话的调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `machine` - 会话状态机
//! - 事件 → 新状态 + 副作用描述
//! - 会话标记校验，丢弃过期回调
//! - 不持有任何运行时资源，可逐事件测试
//!
//! ### `driver` - 阶段驱动
//! - `LiveDriver`：通过 `QcClient` 访问分析服务
//! - `SimulatedDriver`：按固定延迟回放预置结果
//!
//! ### `session_runner` - 会话执行器
//! - 把副作用落实为 tokio 任务与定时器
//! - 每个会话一个取消令牌
//! - 把进度与结果转交展示层（`Presenter`）
//!
//! ## 层次关系
//!
//! ```text
//! session_runner (执行副作用、管理取消)
//!     ↓
//! machine (会话状态机)
//!     ↓
//! workflow (ProgressTracker / StageSchedule / Session)
//!     ↓
//! driver → clients::QcClient → infrastructure::Transport
//! ```
//!
//! ## 设计原则
//!
//! 1. **决策与执行分离**：machine 只描述要做什么，session_runner 负责去做
//! 2. **单一活动会话**：同一时间最多一个会话持有取消令牌
//! 3. **向下依赖**：编排层 → workflow → services → clients → infrastructure

pub mod driver;
pub mod machine;
pub mod session_runner;

// 重新导出主要类型
pub use driver::{LiveDriver, SimulatedDriver, StageDriver};
pub use machine::{Effect, Event, Phase, SessionMachine, SessionOutcome};
pub use session_runner::{Presenter, ProcessingOrchestrator};
