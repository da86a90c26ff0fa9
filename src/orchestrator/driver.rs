//! 阶段驱动
//!
//! 编排器不关心当前是实时运行还是演示运行，只通过 [`StageDriver`] 获取上传/分析结果
//! 与本地时间表。两种实现共用同一套进度与结果契约，展示层无法从结构上区分。

use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use tracing::{debug, info};

use crate::clients::QcClient;
use crate::error::Failure;
use crate::infrastructure::Transport;
use crate::models::{ImagePair, QcResult, QcSettings};
use crate::services::canned_outcome;
use crate::workflow::StageSchedule;

/// 阶段驱动能力
pub trait StageDriver: Send + Sync {
    /// 用于日志的名称
    fn name(&self) -> &'static str;

    /// 分析期间推进阶段标记的本地时间表
    fn schedule(&self) -> StageSchedule;

    /// 上传图像，返回会话 ID
    fn upload<'a>(&'a self, images: &'a ImagePair) -> BoxFuture<'a, Result<String, Failure>>;

    /// 对会话执行分析
    fn analyze<'a>(
        &'a self,
        session_id: &'a str,
        settings: &'a QcSettings,
    ) -> BoxFuture<'a, Result<QcResult, Failure>>;
}

/// 实时驱动：真实网络请求
pub struct LiveDriver<T: Transport> {
    client: Arc<QcClient<T>>,
    schedule: StageSchedule,
}

impl<T: Transport> LiveDriver<T> {
    pub fn new(client: Arc<QcClient<T>>) -> Self {
        Self {
            client,
            schedule: StageSchedule::live(),
        }
    }
}

impl<T: Transport> StageDriver for LiveDriver<T> {
    fn name(&self) -> &'static str {
        "live"
    }

    fn schedule(&self) -> StageSchedule {
        self.schedule.clone()
    }

    fn upload<'a>(&'a self, images: &'a ImagePair) -> BoxFuture<'a, Result<String, Failure>> {
        async move {
            info!(
                "📤 正在上传图像: {} ({} 字节) / {} ({} 字节)",
                images.reference.file_name(),
                images.reference.len(),
                images.sample.file_name(),
                images.sample.len()
            );
            self.client.upload(images).await
        }
        .boxed()
    }

    fn analyze<'a>(
        &'a self,
        session_id: &'a str,
        settings: &'a QcSettings,
    ) -> BoxFuture<'a, Result<QcResult, Failure>> {
        async move {
            info!(
                "🔍 正在请求分析: session_id={}, 截止时间 {}ms",
                session_id,
                self.client.analyze_deadline().as_millis()
            );
            self.client.analyze(session_id, settings).await
        }
        .boxed()
    }
}

/// 模拟驱动：不访问服务器，按固定延迟表回放预置结果
#[derive(Debug, Clone)]
pub struct SimulatedDriver {
    sample_id: u32,
    upload_delay: Duration,
    schedule: StageSchedule,
}

impl SimulatedDriver {
    pub fn new(sample_id: u32) -> Self {
        Self {
            sample_id,
            upload_delay: Duration::from_millis(500),
            schedule: StageSchedule::simulated(),
        }
    }
}

impl StageDriver for SimulatedDriver {
    fn name(&self) -> &'static str {
        "simulated"
    }

    fn schedule(&self) -> StageSchedule {
        self.schedule.clone()
    }

    fn upload<'a>(&'a self, _images: &'a ImagePair) -> BoxFuture<'a, Result<String, Failure>> {
        async move {
            tokio::time::sleep(self.upload_delay).await;
            Ok(format!("sample-{}", self.sample_id))
        }
        .boxed()
    }

    fn analyze<'a>(
        &'a self,
        session_id: &'a str,
        _settings: &'a QcSettings,
    ) -> BoxFuture<'a, Result<QcResult, Failure>> {
        async move {
            tokio::time::sleep(self.schedule.total_duration()).await;
            let outcome = canned_outcome(self.sample_id);
            debug!("示例 {} ({}) 使用预置结果: {:?}", self.sample_id, session_id, outcome);
            Ok(outcome.to_result())
        }
        .boxed()
    }
}
