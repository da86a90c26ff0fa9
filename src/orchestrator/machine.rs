//! 会话状态机
//!
//! ## 职责
//!
//! 把每一个外部事件（网络返回、定时器触发、用户操作）转换为新的状态和一组待执行的副作用。
//! 本模块不发起网络请求、不启动定时器，副作用由 `session_runner` 执行，因此可以在没有真实
//! 时钟的情况下逐事件测试。
//!
//! ## 状态
//!
//! ```text
//! Idle → Uploading → Analyzing → Finalizing → Succeeded
//!           ↓            ↓
//!         Failed       Failed
//! ```

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Failure;
use crate::models::{ImagePair, QcResult, QcSettings, StageId, StageRegistry};
use crate::workflow::{
    ProgressError, ProgressSnapshot, ProgressTracker, Session, SessionTag, StageMark,
    StageSchedule, StartRequest,
};

/// 会话的终止结果
pub type SessionOutcome = Result<QcResult, Failure>;

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Uploading,
    Analyzing,
    Finalizing,
    Succeeded,
    Failed,
}

/// 输入事件
#[derive(Debug, Clone)]
pub enum Event {
    /// 操作员请求开始
    Start(StartRequest),
    /// 上传请求返回
    UploadSettled {
        tag: SessionTag,
        outcome: Result<String, Failure>,
    },
    /// 分析请求返回
    AnalysisSettled {
        tag: SessionTag,
        outcome: Result<QcResult, Failure>,
    },
    /// 时间表中第 `step` 个标记到时
    ScheduleTick { tag: SessionTag, step: usize },
    /// 完成后的停顿结束
    SettleElapsed { tag: SessionTag },
    /// 操作员删除/重置
    Reset,
}

/// 待执行的副作用
#[derive(Debug, Clone)]
pub enum Effect {
    Upload {
        tag: SessionTag,
        images: ImagePair,
    },
    Analyze {
        tag: SessionTag,
        session_id: String,
        settings: Arc<QcSettings>,
    },
    /// 按时间表依次投递 `ScheduleTick`
    RunSchedule {
        tag: SessionTag,
        schedule: StageSchedule,
    },
    /// 延迟后投递 `SettleElapsed`
    Settle { tag: SessionTag, delay: Duration },
    /// 取消该会话所有未完成的定时器与网络请求
    CancelSession { tag: SessionTag },
    /// 进度变更通知
    Progress(ProgressSnapshot),
    /// 会话结束
    Finished {
        tag: SessionTag,
        outcome: SessionOutcome,
    },
    /// 开始请求被拒绝，状态未变
    Rejected(Failure),
}

/// 会话状态机
#[derive(Debug)]
pub struct SessionMachine {
    phase: Phase,
    session: Option<Session>,
    tracker: ProgressTracker,
    schedule: StageSchedule,
    settle_delay: Duration,
    next_tag: u64,
    /// 下一个待执行的时间表标记
    cursor: usize,
    /// 分析已返回但时间表尚未走完时暂存的结果
    pending_result: Option<QcResult>,
}

impl SessionMachine {
    /// 创建状态机
    ///
    /// # 参数
    /// - `registry`: 阶段注册表
    /// - `schedule`: 分析期间使用的本地时间表
    /// - `settle_delay`: 全部完成后展示结果前的停顿
    pub fn new(registry: StageRegistry, schedule: StageSchedule, settle_delay: Duration) -> Self {
        Self {
            phase: Phase::Idle,
            session: None,
            tracker: ProgressTracker::new(registry),
            schedule,
            settle_delay,
            next_tag: 1,
            cursor: 0,
            pending_result: None,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.is_active)
    }

    pub fn active_tag(&self) -> Option<SessionTag> {
        self.session
            .as_ref()
            .filter(|s| s.is_active)
            .map(|s| s.tag)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }

    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    /// 处理一个事件，返回需要执行的副作用
    pub fn handle(&mut self, event: Event) -> Vec<Effect> {
        match event {
            Event::Start(request) => self.on_start(request),
            Event::Reset => self.on_reset(),
            Event::UploadSettled { tag, outcome } => {
                if !self.accepts(tag, Phase::Uploading, "上传结果") {
                    return Vec::new();
                }
                match outcome {
                    Ok(session_id) => self.on_uploaded(session_id),
                    Err(failure) => self.fail(failure),
                }
            }
            Event::AnalysisSettled { tag, outcome } => {
                if !self.accepts(tag, Phase::Analyzing, "分析结果") {
                    return Vec::new();
                }
                match outcome {
                    Ok(result) => self.on_analyzed(result),
                    Err(failure) => self.fail(failure),
                }
            }
            Event::ScheduleTick { tag, step } => {
                if !self.accepts(tag, Phase::Analyzing, "时间表标记") {
                    return Vec::new();
                }
                self.on_tick(step)
            }
            Event::SettleElapsed { tag } => {
                if !self.accepts(tag, Phase::Finalizing, "结束停顿") {
                    return Vec::new();
                }
                self.on_settled()
            }
        }
    }

    /// 事件是否属于当前活动会话且处于期望阶段
    fn accepts(&self, tag: SessionTag, expected: Phase, what: &str) -> bool {
        if self.active_tag() != Some(tag) {
            debug!("[会话 {}] 会话已失效，丢弃{}", tag, what);
            return false;
        }
        if self.phase != expected {
            debug!("[会话 {}] 当前阶段 {:?}，丢弃{}", tag, self.phase, what);
            return false;
        }
        true
    }

    fn on_start(&mut self, request: StartRequest) -> Vec<Effect> {
        if let Some(active) = &self.session {
            if active.is_active {
                warn!("{} 已有分析正在进行，拒绝新的开始请求", active);
                return vec![Effect::Rejected(Failure::validation(
                    "已有分析正在进行，请等待完成或先重置",
                ))];
            }
        }

        let (images, settings) = match request.validate() {
            Ok(parts) => parts,
            Err(failure) => {
                warn!("开始请求校验失败: {}", failure.message);
                return vec![Effect::Rejected(failure)];
            }
        };

        let tag = SessionTag(self.next_tag);
        self.next_tag += 1;

        let session = Session::new(tag, images.clone(), settings);
        info!("{} 🚀 开始分析", session);
        self.session = Some(session);
        self.phase = Phase::Uploading;
        self.cursor = 0;
        self.pending_result = None;

        self.tracker.reset();
        let mut effects = Vec::with_capacity(2);
        self.push_progress(&mut effects, StageId::Upload, |t| t.begin(StageId::Upload));
        effects.push(Effect::Upload { tag, images });
        effects
    }

    fn on_uploaded(&mut self, session_id: String) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.session_id = Some(session_id.clone());
        let tag = session.tag;
        let settings = Arc::clone(&session.settings);
        info!("{} ✓ 图像上传成功", session);

        self.phase = Phase::Analyzing;
        self.cursor = 0;

        let mut effects = Vec::with_capacity(3);
        self.push_progress(&mut effects, StageId::Upload, |t| t.complete(StageId::Upload));
        effects.push(Effect::Analyze {
            tag,
            session_id,
            settings,
        });
        if !self.schedule.is_empty() {
            effects.push(Effect::RunSchedule {
                tag,
                schedule: self.schedule.clone(),
            });
        }
        effects
    }

    fn on_tick(&mut self, step: usize) -> Vec<Effect> {
        if step != self.cursor {
            debug!("时间表标记 {} 与预期 {} 不符，忽略", step, self.cursor);
            return Vec::new();
        }
        let Some(mark) = self.schedule.step(step).map(|s| s.mark) else {
            return Vec::new();
        };
        self.cursor += 1;

        let mut effects = Vec::new();
        match mark {
            StageMark::Begin(stage) => {
                self.push_progress(&mut effects, stage, |t| t.begin(stage));
            }
            StageMark::Progress(stage, fraction) => {
                self.push_progress(&mut effects, stage, |t| t.advance(stage, fraction));
            }
            StageMark::Complete(stage) => {
                self.push_progress(&mut effects, stage, |t| t.complete(stage));
            }
        }

        if self.schedule_done() && self.pending_result.is_some() {
            effects.extend(self.finalize());
        }
        effects
    }

    fn on_analyzed(&mut self, result: QcResult) -> Vec<Effect> {
        if let Some(session) = &self.session {
            info!(
                "{} ✓ 分析返回: {} (总分 {:.1})",
                session, result.decision, result.overall_score
            );
        }
        self.pending_result = Some(result);

        if self.schedule_done() {
            self.finalize()
        } else {
            debug!(
                "分析先于时间表返回，等待剩余 {} 个标记",
                self.schedule.len() - self.cursor
            );
            Vec::new()
        }
    }

    fn schedule_done(&self) -> bool {
        self.cursor >= self.schedule.len()
    }

    fn finalize(&mut self) -> Vec<Effect> {
        let Some(tag) = self.active_tag() else {
            return Vec::new();
        };
        self.phase = Phase::Finalizing;
        vec![
            Effect::Progress(self.tracker.complete_all()),
            Effect::Settle {
                tag,
                delay: self.settle_delay,
            },
        ]
    }

    fn on_settled(&mut self) -> Vec<Effect> {
        let Some(result) = self.pending_result.take() else {
            return Vec::new();
        };
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.is_active = false;
        let tag = session.tag;
        info!("{} ✅ 分析完成: {}", session, result.decision);

        self.phase = Phase::Succeeded;
        vec![
            Effect::CancelSession { tag },
            Effect::Finished {
                tag,
                outcome: Ok(result),
            },
        ]
    }

    fn fail(&mut self, failure: Failure) -> Vec<Effect> {
        let Some(session) = self.session.as_mut() else {
            return Vec::new();
        };
        session.is_active = false;
        let tag = session.tag;
        warn!("{} ❌ 分析失败: {}", session, failure);

        self.phase = Phase::Failed;
        self.pending_result = None;
        vec![
            Effect::CancelSession { tag },
            Effect::Progress(self.tracker.reset()),
            Effect::Finished {
                tag,
                outcome: Err(failure),
            },
        ]
    }

    fn on_reset(&mut self) -> Vec<Effect> {
        let mut effects = Vec::with_capacity(2);
        if let Some(tag) = self.active_tag() {
            info!("[会话 {}] 操作员重置，丢弃当前会话", tag);
            effects.push(Effect::CancelSession { tag });
        }

        self.session = None;
        self.phase = Phase::Idle;
        self.cursor = 0;
        self.pending_result = None;
        effects.push(Effect::Progress(self.tracker.reset()));
        effects
    }

    /// 执行一次跟踪器变更；被拒绝的变更只记录日志，不会让会话失败
    fn push_progress<F>(&mut self, effects: &mut Vec<Effect>, stage: StageId, change: F)
    where
        F: FnOnce(&mut ProgressTracker) -> Result<ProgressSnapshot, ProgressError>,
    {
        match change(&mut self.tracker) {
            Ok(snapshot) => effects.push(Effect::Progress(snapshot)),
            Err(e) => warn!("阶段 {} 进度变更被拒绝: {}", stage, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FailureKind;
    use crate::models::{AnalysisMetrics, Decision, ImageHandle};
    use crate::workflow::StageState;

    fn machine() -> SessionMachine {
        SessionMachine::new(
            StageRegistry::standard(),
            StageSchedule::live(),
            Duration::from_millis(1000),
        )
    }

    fn request() -> StartRequest {
        StartRequest::new(
            ImageHandle::new("ref.png", b"ref".to_vec()),
            ImageHandle::new("sample.png", b"sample".to_vec()),
            QcSettings::default(),
        )
    }

    fn accepted() -> QcResult {
        QcResult {
            decision: Decision::Accept,
            color_score: 92.5,
            pattern_score: 88.3,
            overall_score: 90.4,
            report: None,
            metrics: AnalysisMetrics::default(),
        }
    }

    fn start(m: &mut SessionMachine) -> SessionTag {
        let effects = m.handle(Event::Start(request()));
        effects
            .iter()
            .find_map(|e| match e {
                Effect::Upload { tag, .. } => Some(*tag),
                _ => None,
            })
            .expect("start should emit an upload")
    }

    fn upload(m: &mut SessionMachine, tag: SessionTag) -> Vec<Effect> {
        m.handle(Event::UploadSettled {
            tag,
            outcome: Ok("abc".to_string()),
        })
    }

    fn run_schedule(m: &mut SessionMachine, tag: SessionTag) -> Vec<Effect> {
        let steps = StageSchedule::live().len();
        (0..steps)
            .flat_map(|step| m.handle(Event::ScheduleTick { tag, step }))
            .collect()
    }

    fn percentages(effects: &[Effect]) -> Vec<u8> {
        effects
            .iter()
            .filter_map(|e| match e {
                Effect::Progress(s) => Some(s.percentage),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn happy_path_reaches_succeeded() {
        let mut m = machine();
        let tag = start(&mut m);
        assert_eq!(m.phase(), Phase::Uploading);
        assert_eq!(m.tracker().state(StageId::Upload), StageState::Active);

        let effects = upload(&mut m, tag);
        assert_eq!(m.phase(), Phase::Analyzing);
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::Analyze { session_id, .. } if session_id == "abc")));
        assert!(effects
            .iter()
            .any(|e| matches!(e, Effect::RunSchedule { .. })));
        assert_eq!(m.snapshot().percentage, 10);

        let ticks = run_schedule(&mut m, tag);
        let seen = percentages(&ticks);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(m.snapshot().percentage, 90);
        assert_eq!(m.tracker().state(StageId::Report), StageState::Active);

        let effects = m.handle(Event::AnalysisSettled {
            tag,
            outcome: Ok(accepted()),
        });
        assert_eq!(m.phase(), Phase::Finalizing);
        assert_eq!(percentages(&effects), vec![100]);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Settle { delay, .. } if *delay == Duration::from_millis(1000)
        )));

        let effects = m.handle(Event::SettleElapsed { tag });
        assert_eq!(m.phase(), Phase::Succeeded);
        assert!(!m.is_active());
        assert_eq!(m.tracker().completed_weight(), 100);
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Finished { outcome: Ok(r), .. } if r.decision == Decision::Accept
        )));
    }

    #[test]
    fn early_result_waits_for_schedule() {
        let mut m = machine();
        let tag = start(&mut m);
        upload(&mut m, tag);

        let effects = m.handle(Event::AnalysisSettled {
            tag,
            outcome: Ok(accepted()),
        });
        assert!(effects.is_empty());
        assert_eq!(m.phase(), Phase::Analyzing);

        let effects = run_schedule(&mut m, tag);
        assert_eq!(m.phase(), Phase::Finalizing);
        assert_eq!(percentages(&effects).last(), Some(&100));
    }

    #[test]
    fn second_start_is_rejected_without_state_change() {
        let mut m = machine();
        let tag = start(&mut m);
        let before = m.snapshot();

        let effects = m.handle(Event::Start(request()));
        assert!(matches!(
            effects.as_slice(),
            [Effect::Rejected(f)] if f.kind == FailureKind::Validation
        ));
        assert_eq!(m.active_tag(), Some(tag));
        assert_eq!(m.snapshot(), before);
    }

    #[test]
    fn missing_image_is_rejected_synchronously() {
        let mut m = machine();
        let effects = m.handle(Event::Start(StartRequest {
            sample: None,
            ..request()
        }));
        assert!(matches!(effects.as_slice(), [Effect::Rejected(_)]));
        assert_eq!(m.phase(), Phase::Idle);
        assert!(m.session().is_none());
    }

    #[test]
    fn failure_resets_progress_and_deactivates() {
        let mut m = machine();
        let tag = start(&mut m);
        upload(&mut m, tag);
        m.handle(Event::ScheduleTick { tag, step: 0 });

        let effects = m.handle(Event::AnalysisSettled {
            tag,
            outcome: Err(Failure::timeout("deadline")),
        });
        assert_eq!(m.phase(), Phase::Failed);
        assert!(!m.is_active());
        assert!(m.snapshot().all_pending());
        assert!(matches!(effects[0], Effect::CancelSession { tag: t } if t == tag));
        assert!(effects.iter().any(|e| matches!(
            e,
            Effect::Finished { outcome: Err(f), .. } if f.kind == FailureKind::Timeout
        )));
    }

    #[test]
    fn upload_failure_fails_session() {
        let mut m = machine();
        let tag = start(&mut m);
        m.handle(Event::UploadSettled {
            tag,
            outcome: Err(Failure::transport("Both reference and sample images required")),
        });
        assert_eq!(m.phase(), Phase::Failed);
        assert!(m.snapshot().all_pending());

        // 失败后可以重新开始
        let next = start(&mut m);
        assert_ne!(next, tag);
        assert_eq!(m.phase(), Phase::Uploading);
    }

    #[test]
    fn stale_events_after_reset_are_ignored() {
        let mut m = machine();
        let tag = start(&mut m);
        upload(&mut m, tag);
        m.handle(Event::ScheduleTick { tag, step: 0 });

        let effects = m.handle(Event::Reset);
        assert!(matches!(effects[0], Effect::CancelSession { tag: t } if t == tag));
        assert_eq!(m.phase(), Phase::Idle);
        let idle = m.snapshot();
        assert!(idle.all_pending());

        assert!(m
            .handle(Event::AnalysisSettled {
                tag,
                outcome: Ok(accepted()),
            })
            .is_empty());
        assert!(m.handle(Event::ScheduleTick { tag, step: 1 }).is_empty());
        assert!(m.handle(Event::SettleElapsed { tag }).is_empty());
        assert_eq!(m.snapshot(), idle);
        assert_eq!(m.phase(), Phase::Idle);
    }

    #[test]
    fn out_of_order_tick_is_ignored() {
        let mut m = machine();
        let tag = start(&mut m);
        upload(&mut m, tag);

        assert!(m.handle(Event::ScheduleTick { tag, step: 3 }).is_empty());
        assert_eq!(m.tracker().state(StageId::Color), StageState::Pending);
    }
}
