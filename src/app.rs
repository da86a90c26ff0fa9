//! 应用入口 - 编排层之上
//!
//! 负责资源装配：读取配置、加载设置与图像、选择实时或演示驱动，
//! 然后交给 `ProcessingOrchestrator` 跑完一次会话。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::clients::QcClient;
use crate::config::Config;
use crate::error::{AppError, FailureKind};
use crate::infrastructure::{HttpTransport, Transport};
use crate::models::{load_settings_file, ImageHandle, QcSettings, StageRegistry};
use crate::orchestrator::{
    LiveDriver, Presenter, ProcessingOrchestrator, SessionOutcome, SimulatedDriver, StageDriver,
};
use crate::services::ResultClassifier;
use crate::utils::logging::{log_startup, log_verdict};
use crate::workflow::{ProgressSnapshot, StartRequest};

/// 控制台展示层
pub struct ConsolePresenter {
    classifier: ResultClassifier,
    client: Option<Arc<QcClient<HttpTransport>>>,
    last_line: Option<(u8, String)>,
}

impl ConsolePresenter {
    pub fn new(classifier: ResultClassifier, client: Option<Arc<QcClient<HttpTransport>>>) -> Self {
        Self {
            classifier,
            client,
            last_line: None,
        }
    }

    /// 生成一行进度文本；百分比与状态文本都未变化时返回 `None`
    fn progress_line(&mut self, snapshot: &ProgressSnapshot) -> Option<String> {
        let key = (snapshot.percentage, snapshot.status_text.clone());
        if self.last_line.as_ref() == Some(&key) {
            return None;
        }
        let line = format!("⏳ [{:>3}%] {}", key.0, key.1);
        self.last_line = Some(key);
        Some(line)
    }
}

impl Presenter for ConsolePresenter {
    fn on_progress(&mut self, snapshot: &ProgressSnapshot) {
        if let Some(line) = self.progress_line(snapshot) {
            info!("{}", line);
        }
    }

    fn on_finished(&mut self, outcome: &SessionOutcome) {
        match outcome {
            Ok(result) => {
                let verdict = self.classifier.classify(result);
                let report_url = match (&self.client, &result.report) {
                    (Some(client), Some(report)) => Some(client.report_url(report)),
                    _ => None,
                };
                log_verdict(result, &verdict, report_url.as_deref());
            }
            Err(failure) => {
                error!("❌ {}", failure.user_message());
            }
        }
    }
}

/// 应用主结构
pub struct App {
    config: Config,
    registry: StageRegistry,
    driver: Arc<dyn StageDriver>,
    client: Option<Arc<QcClient<HttpTransport>>>,
    request: StartRequest,
}

impl App {
    /// 初始化应用
    pub async fn initialize(config: Config) -> Result<Self> {
        log_startup(&config);

        let registry = StageRegistry::standard();
        registry.validate().context("阶段注册表配置无效")?;

        let reference = load_optional_image(config.reference_image.as_deref()).await?;
        let sample = load_optional_image(config.sample_image.as_deref()).await?;

        let (driver, client, reference, sample) = match config.sample_id {
            Some(sample_id) => {
                // 演示模式不访问服务器，缺少图像时使用占位图
                let reference = reference
                    .or_else(|| Some(ImageHandle::new("demo-reference.png", b"demo".to_vec())));
                let sample =
                    sample.or_else(|| Some(ImageHandle::new("demo-sample.png", b"demo".to_vec())));
                let driver: Arc<dyn StageDriver> = Arc::new(SimulatedDriver::new(sample_id));
                (driver, None, reference, sample)
            }
            None => {
                let transport =
                    HttpTransport::new(config.server_url.clone(), config.connect_timeout())?;
                let client = Arc::new(
                    QcClient::new(transport).with_analyze_deadline(config.analyze_deadline()),
                );
                if !check_health(&client, config.startup_timeout()).await {
                    warn!("⚠️ 分析服务当前不可用，后续请求可能失败");
                }
                let driver: Arc<dyn StageDriver> = Arc::new(LiveDriver::new(Arc::clone(&client)));
                (driver, Some(client), reference, sample)
            }
        };

        let settings = load_settings(&config, client.as_deref()).await?;

        Ok(Self {
            config,
            registry,
            driver,
            client,
            request: StartRequest {
                reference,
                sample,
                settings: Some(settings),
            },
        })
    }

    /// 运行一次完整的质检会话
    pub async fn run(self) -> Result<()> {
        let thresholds = self
            .request
            .settings
            .as_ref()
            .map(QcSettings::score_thresholds);
        let presenter =
            ConsolePresenter::new(ResultClassifier::for_settings(thresholds), self.client);

        let mut orchestrator = ProcessingOrchestrator::new(
            self.driver,
            presenter,
            self.registry,
            self.config.settle_delay(),
        );

        match orchestrator.process(self.request).await {
            Ok(result) => {
                info!("✅ 会话结束: {}", result.decision);
                Ok(())
            }
            Err(failure) => {
                // 开始请求被拒绝时展示层不会收到通知
                if failure.kind == FailureKind::Validation {
                    error!("❌ {}", failure.user_message());
                }
                Err(AppError::Session(failure).into())
            }
        }
    }
}

async fn load_optional_image(path: Option<&Path>) -> Result<Option<ImageHandle>> {
    match path {
        Some(path) => Ok(Some(ImageHandle::load(path).await?)),
        None => Ok(None),
    }
}

/// 设置来源优先级：TOML 文件 → 服务器默认设置 → 内置默认值
async fn load_settings<T: Transport>(
    config: &Config,
    client: Option<&QcClient<T>>,
) -> Result<QcSettings> {
    if let Some(path) = &config.settings_file {
        let settings = load_settings_file(path).await?;
        info!("✓ 已加载分析设置: {}", path.display());
        return Ok(settings);
    }

    if let Some(client) = client {
        let deadline = config.startup_timeout();
        match tokio::time::timeout(deadline, client.default_settings()).await {
            Ok(Ok(settings)) => {
                info!("✓ 使用服务器默认设置");
                return Ok(settings);
            }
            Ok(Err(failure)) => warn!("⚠️ 获取服务器默认设置失败，使用内置默认值: {}", failure),
            Err(_) => warn!(
                "⚠️ 获取服务器默认设置超过 {}ms，使用内置默认值",
                deadline.as_millis()
            ),
        }
    }

    Ok(QcSettings::default())
}

/// 启动时的健康检查，只记录日志，不阻止后续流程
///
/// # 返回
/// 服务器在截止时间内报告 healthy 时返回 `true`
async fn check_health<T: Transport>(client: &QcClient<T>, deadline: Duration) -> bool {
    match tokio::time::timeout(deadline, client.health()).await {
        Ok(Ok(status)) if status.is_healthy() => {
            info!(
                "✓ 分析服务在线 (版本 {})",
                status.version.as_deref().unwrap_or("未知")
            );
            true
        }
        Ok(Ok(status)) => {
            warn!("⚠️ 分析服务状态异常: {}", status.status);
            false
        }
        Ok(Err(failure)) => {
            warn!("⚠️ 健康检查失败: {}", failure);
            false
        }
        Err(_) => {
            warn!("⚠️ 健康检查超过 {}ms 未响应", deadline.as_millis());
            false
        }
    }
}
