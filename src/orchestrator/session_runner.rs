//! 会话执行器 - 编排层
//!
//! ## 职责
//!
//! 持有 [`SessionMachine`]，把它产生的副作用落实为真实的网络任务与定时器，
//! 再把任务的返回作为事件送回状态机。
//!
//! ## 取消
//!
//! 每个会话对应一个 `CancellationToken`。会话结束、失败或被重置时取消令牌，
//! 所有挂起的上传/分析请求与时间表定时器随之被丢弃，不会再投递任何事件。
//! 即使有事件在取消前已进入队列，也会因会话标记不一致被状态机丢弃。

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Failure;
use crate::models::{ImagePair, QcSettings, StageRegistry};
use crate::orchestrator::driver::StageDriver;
use crate::orchestrator::machine::{Effect, Event, Phase, SessionMachine, SessionOutcome};
use crate::workflow::{ProgressSnapshot, Session, SessionTag, StageSchedule, StartRequest};

/// 展示层回调
///
/// 编排器在每次进度变更和会话结束时调用；实现方只负责渲染。
pub trait Presenter: Send {
    fn on_progress(&mut self, snapshot: &ProgressSnapshot);
    fn on_finished(&mut self, outcome: &SessionOutcome);
}

/// 处理编排器
pub struct ProcessingOrchestrator<P: Presenter> {
    machine: SessionMachine,
    driver: Arc<dyn StageDriver>,
    presenter: P,
    events_tx: mpsc::UnboundedSender<Event>,
    events_rx: mpsc::UnboundedReceiver<Event>,
    active: Option<(SessionTag, CancellationToken)>,
}

impl<P: Presenter> ProcessingOrchestrator<P> {
    /// 创建编排器
    ///
    /// # 参数
    /// - `driver`: 阶段驱动（实时或模拟）
    /// - `presenter`: 展示层
    /// - `registry`: 阶段注册表
    /// - `settle_delay`: 进度到达 100% 后展示结果前的停顿
    pub fn new(
        driver: Arc<dyn StageDriver>,
        presenter: P,
        registry: StageRegistry,
        settle_delay: Duration,
    ) -> Self {
        let machine = SessionMachine::new(registry, driver.schedule(), settle_delay);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        info!("🧭 编排器已创建，驱动: {}", driver.name());
        Self {
            machine,
            driver,
            presenter,
            events_tx,
            events_rx,
            active: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.machine.phase()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.machine.snapshot()
    }

    pub fn is_active(&self) -> bool {
        self.machine.is_active()
    }

    pub fn session(&self) -> Option<&Session> {
        self.machine.session()
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// 开始一次处理
    ///
    /// 校验失败或已有活动会话时同步返回 `Validation` 失败，状态不变。
    ///
    /// # 返回
    /// 新会话的标记
    pub fn start(&mut self, request: StartRequest) -> Result<SessionTag, Failure> {
        let effects = self.machine.handle(Event::Start(request));
        if let Some(failure) = effects.iter().find_map(|e| match e {
            Effect::Rejected(f) => Some(f.clone()),
            _ => None,
        }) {
            return Err(failure);
        }
        self.execute(effects);
        self.machine
            .active_tag()
            .ok_or_else(|| Failure::validation("会话未能启动"))
    }

    /// 丢弃当前会话并回到空闲状态
    pub fn reset(&mut self) {
        let effects = self.machine.handle(Event::Reset);
        self.execute(effects);
    }

    /// 等待并处理下一个事件
    ///
    /// # 返回
    /// 该事件使会话结束时返回结果，否则返回 `None`
    pub async fn next_event(&mut self) -> Option<SessionOutcome> {
        let event = self.events_rx.recv().await?;
        let effects = self.machine.handle(event);
        self.execute(effects)
    }

    /// 处理已经到达的事件，不等待
    pub fn drain_ready(&mut self) -> Option<SessionOutcome> {
        let mut finished = None;
        while let Ok(event) = self.events_rx.try_recv() {
            let effects = self.machine.handle(event);
            if let Some(outcome) = self.execute(effects) {
                finished = Some(outcome);
            }
        }
        finished
    }

    /// 驱动当前会话直至结束
    pub async fn run_to_completion(&mut self) -> SessionOutcome {
        if !self.machine.is_active() {
            return Err(Failure::validation("没有正在进行的分析"));
        }
        loop {
            if let Some(outcome) = self.next_event().await {
                return outcome;
            }
        }
    }

    /// 开始并等待一次完整处理
    pub async fn process(&mut self, request: StartRequest) -> SessionOutcome {
        self.start(request)?;
        self.run_to_completion().await
    }

    /// 执行状态机产生的副作用
    fn execute(&mut self, effects: Vec<Effect>) -> Option<SessionOutcome> {
        let mut finished = None;
        for effect in effects {
            match effect {
                Effect::Upload { tag, images } => self.spawn_upload(tag, images),
                Effect::Analyze {
                    tag,
                    session_id,
                    settings,
                } => self.spawn_analyze(tag, session_id, settings),
                Effect::RunSchedule { tag, schedule } => self.spawn_schedule(tag, schedule),
                Effect::Settle { tag, delay } => self.spawn_settle(tag, delay),
                Effect::CancelSession { tag } => self.cancel(tag),
                Effect::Progress(snapshot) => {
                    debug!("进度 {}%: {}", snapshot.percentage, snapshot.status_text);
                    self.presenter.on_progress(&snapshot);
                }
                Effect::Finished { tag, outcome } => {
                    debug!("[会话 {}] 通知展示层", tag);
                    self.presenter.on_finished(&outcome);
                    finished = Some(outcome);
                }
                Effect::Rejected(failure) => {
                    warn!("请求被拒绝: {}", failure);
                }
            }
        }
        finished
    }

    /// 获取会话的取消令牌；新会话会替换并取消旧令牌
    fn token_for(&mut self, tag: SessionTag) -> CancellationToken {
        match &self.active {
            Some((active, token)) if *active == tag => token.clone(),
            _ => {
                if let Some((stale, token)) = self.active.take() {
                    debug!("[会话 {}] 被新会话替换，取消遗留任务", stale);
                    token.cancel();
                }
                let token = CancellationToken::new();
                self.active = Some((tag, token.clone()));
                token
            }
        }
    }

    fn cancel(&mut self, tag: SessionTag) {
        if let Some((active, token)) = &self.active {
            if *active == tag {
                debug!("[会话 {}] 取消所有挂起的任务", tag);
                token.cancel();
                self.active = None;
            }
        }
    }

    fn spawn_upload(&mut self, tag: SessionTag, images: ImagePair) {
        let token = self.token_for(tag);
        let driver = Arc::clone(&self.driver);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("[会话 {}] 上传已取消", tag);
                }
                outcome = driver.upload(&images) => {
                    let _ = tx.send(Event::UploadSettled { tag, outcome });
                }
            }
        });
    }

    fn spawn_analyze(&mut self, tag: SessionTag, session_id: String, settings: Arc<QcSettings>) {
        let token = self.token_for(tag);
        let driver = Arc::clone(&self.driver);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!("[会话 {}] 分析请求已取消", tag);
                }
                outcome = driver.analyze(&session_id, &settings) => {
                    let _ = tx.send(Event::AnalysisSettled { tag, outcome });
                }
            }
        });
    }

    fn spawn_schedule(&mut self, tag: SessionTag, schedule: StageSchedule) {
        let token = self.token_for(tag);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let origin = Instant::now();
            for (step, entry) in schedule.steps().iter().enumerate() {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("[会话 {}] 时间表已取消（停在第 {} 步）", tag, step);
                        return;
                    }
                    _ = tokio::time::sleep_until(origin + entry.offset) => {}
                }
                if tx.send(Event::ScheduleTick { tag, step }).is_err() {
                    return;
                }
            }
        });
    }

    fn spawn_settle(&mut self, tag: SessionTag, delay: Duration) {
        let token = self.token_for(tag);
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    let _ = tx.send(Event::SettleElapsed { tag });
                }
            }
        });
    }
}
