//! # Textile QC Client
//!
//! 纺织品质检分析服务的客户端：上传参考图像与样品图像，驱动服务器端分析，
//! 向操作员展示分阶段进度与最终判定。
//!
//! ## 架构设计
//!
//! 本系统采用严格的分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有 HTTP 连接，只暴露"发送一个请求"的能力
//! - `HttpTransport` - 基于 reqwest 的 `Transport` 实现
//!
//! ### ② 客户端层（Clients）
//! - `clients/` - 把类型化请求映射到接口，负责截止时间与响应分类
//! - `QcClient` - 上传 / 分析 / 健康检查 / 默认设置
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `ResultClassifier` - 结果分档
//! - `canned_outcome` - 演示模式的预置结果
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义"一次会话"由哪些部分组成
//! - `ProgressTracker` - 分阶段进度
//! - `StageSchedule` - 本地阶段时间表
//! - `Session` - 会话上下文
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/machine` - 会话状态机
//! - `orchestrator/driver` - 实时 / 模拟阶段驱动
//! - `orchestrator/session_runner` - 执行副作用、管理取消
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use app::{App, ConsolePresenter};
pub use clients::QcClient;
pub use config::Config;
pub use error::{AppError, AppResult, Failure, FailureKind};
pub use infrastructure::{HttpTransport, Transport};
pub use models::{Decision, ImageHandle, QcResult, QcSettings, StageId, StageRegistry};
pub use orchestrator::{
    LiveDriver, Presenter, ProcessingOrchestrator, SessionOutcome, SimulatedDriver, StageDriver,
};
pub use services::ResultClassifier;
pub use workflow::{ProgressSnapshot, ProgressTracker, StartRequest};
