use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, BoxFuture};
use futures::FutureExt;
use tokio::time::Instant;
use tokio_test::{assert_err, assert_ok};

use textile_qc_client::error::{ApiError, GENERIC_FAILURE_MESSAGE};
use textile_qc_client::infrastructure::{WireRequest, WireResponse};
use textile_qc_client::models::StageId;
use textile_qc_client::orchestrator::Phase;
use textile_qc_client::services::{DecisionBand, ScoreBand};
use textile_qc_client::workflow::StageState;
use textile_qc_client::{
    Decision, FailureKind, ImageHandle, LiveDriver, Presenter, ProcessingOrchestrator,
    ProgressSnapshot, QcClient, QcSettings, ResultClassifier, SessionOutcome, SimulatedDriver,
    StageRegistry, StartRequest, Transport,
};

const SETTLE: Duration = Duration::from_millis(1000);

/// 按接口路径返回预设响应的传输
#[derive(Clone)]
enum Reply {
    Respond(u16, &'static str),
    Refuse,
    Hang,
}

struct ScriptedTransport {
    upload: Reply,
    analyze: Reply,
    calls: Arc<AtomicUsize>,
}

impl ScriptedTransport {
    fn new(upload: Reply, analyze: Reply) -> Self {
        Self {
            upload,
            analyze,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: WireRequest) -> BoxFuture<'_, Result<WireResponse, ApiError>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let reply = match request.path.as_str() {
            "/api/upload" => self.upload.clone(),
            "/api/analyze" => self.analyze.clone(),
            other => panic!("unexpected endpoint {other}"),
        };
        match reply {
            Reply::Respond(status, body) => future::ready(Ok(WireResponse {
                status,
                body: body.to_string(),
            }))
            .boxed(),
            Reply::Refuse => future::ready(Err(ApiError::RequestFailed {
                endpoint: request.path.clone(),
                message: "error sending request: connection refused".to_string(),
            }))
            .boxed(),
            Reply::Hang => future::pending().boxed(),
        }
    }

    fn base_url(&self) -> &str {
        "http://qc.test"
    }
}

#[derive(Default)]
struct Recorder {
    snapshots: Vec<ProgressSnapshot>,
    finished: Vec<SessionOutcome>,
}

impl Recorder {
    fn percentages(&self) -> Vec<u8> {
        self.snapshots.iter().map(|s| s.percentage).collect()
    }
}

impl Presenter for Recorder {
    fn on_progress(&mut self, snapshot: &ProgressSnapshot) {
        self.snapshots.push(snapshot.clone());
    }

    fn on_finished(&mut self, outcome: &SessionOutcome) {
        self.finished.push(outcome.clone());
    }
}

const UPLOADED: Reply = Reply::Respond(200, r#"{"session_id": "abc"}"#);
const ACCEPTED: Reply = Reply::Respond(
    200,
    r#"{"session_id":"abc","decision":"ACCEPT","color_score":92.5,"pattern_score":88.3,
        "overall_score":90.4,"pdf_filename":"qc_report_abc.pdf",
        "color_metrics":{"avg_delta_e":1.2},"pattern_metrics":{"ssim":0.97}}"#,
);

fn request() -> StartRequest {
    StartRequest::new(
        ImageHandle::new("reference.png", b"reference-bytes".to_vec()),
        ImageHandle::new("sample.png", b"sample-bytes".to_vec()),
        QcSettings::default(),
    )
}

fn live(transport: ScriptedTransport, deadline: Duration) -> ProcessingOrchestrator<Recorder> {
    let client = QcClient::new(transport).with_analyze_deadline(deadline);
    ProcessingOrchestrator::new(
        Arc::new(LiveDriver::new(Arc::new(client))),
        Recorder::default(),
        StageRegistry::standard(),
        SETTLE,
    )
}

fn assert_monotonic(percentages: &[u8]) {
    assert!(
        percentages.windows(2).all(|w| w[0] <= w[1]),
        "percentages went backwards: {:?}",
        percentages
    );
}

#[tokio::test(start_paused = true)]
async fn live_session_accepts_after_schedule_and_settle() {
    let mut orchestrator = live(
        ScriptedTransport::new(UPLOADED, ACCEPTED),
        Duration::from_secs(300),
    );
    let started = Instant::now();

    let result = assert_ok!(orchestrator.process(request()).await);

    // 结果立即返回，仍需走完 2000ms 时间表和 1000ms 停顿
    assert!(started.elapsed() >= Duration::from_millis(3000));
    assert_eq!(result.decision, Decision::Accept);
    assert_eq!(result.overall_score, 90.4);
    let report = result.report.as_ref().expect("report handle");
    assert_eq!(report.download_path(), "/api/download/abc/qc_report_abc.pdf");

    let verdict = ResultClassifier::new().classify(&result);
    assert_eq!(verdict.decision_band, DecisionBand::Accept);
    assert_eq!(verdict.overall_band, ScoreBand::Success);

    assert_eq!(orchestrator.phase(), Phase::Succeeded);
    assert!(!orchestrator.is_active());
    assert!(orchestrator.snapshot().all_completed());

    let recorder = orchestrator.presenter();
    let seen = recorder.percentages();
    assert_monotonic(&seen);
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&100));
    assert_eq!(recorder.finished.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn hanging_analysis_times_out_and_resets_progress() {
    let mut orchestrator = live(
        ScriptedTransport::new(UPLOADED, Reply::Hang),
        Duration::from_secs(300),
    );
    let started = Instant::now();

    let failure = assert_err!(orchestrator.process(request()).await);

    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(started.elapsed() >= Duration::from_secs(300));
    assert!(!orchestrator.is_active());
    assert_eq!(orchestrator.phase(), Phase::Failed);

    let snapshot = orchestrator.snapshot();
    assert!(snapshot.all_pending());
    assert_eq!(snapshot.percentage, 0);

    // 失败前时间表已推进到报告阶段
    let recorder = orchestrator.presenter();
    assert!(recorder
        .snapshots
        .iter()
        .any(|s| s.state_of(StageId::Report) == StageState::Active));
    assert_eq!(recorder.percentages().last(), Some(&0));
}

#[tokio::test(start_paused = true)]
async fn empty_analysis_body_is_protocol_failure() {
    let mut orchestrator = live(
        ScriptedTransport::new(UPLOADED, Reply::Respond(200, "")),
        Duration::from_secs(300),
    );

    let failure = assert_err!(orchestrator.process(request()).await);

    assert_eq!(failure.kind, FailureKind::Protocol);
    assert!(orchestrator.snapshot().all_pending());
    assert_eq!(orchestrator.presenter().finished.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn upload_rejection_carries_server_message() {
    let mut orchestrator = live(
        ScriptedTransport::new(
            Reply::Respond(400, r#"{"error": "Both reference and sample images required"}"#),
            ACCEPTED,
        ),
        Duration::from_secs(300),
    );

    let failure = assert_err!(orchestrator.process(request()).await);

    assert_eq!(failure.kind, FailureKind::Transport);
    assert_eq!(
        failure.user_message(),
        "Both reference and sample images required"
    );
    assert_eq!(orchestrator.phase(), Phase::Failed);
}

#[tokio::test(start_paused = true)]
async fn unreachable_server_shows_generic_message() {
    let mut orchestrator = live(
        ScriptedTransport::new(Reply::Refuse, ACCEPTED),
        Duration::from_secs(300),
    );

    let failure = assert_err!(orchestrator.process(request()).await);

    assert_eq!(failure.kind, FailureKind::Transport);
    assert_eq!(failure.user_message(), GENERIC_FAILURE_MESSAGE);
    assert!(failure
        .detail
        .as_deref()
        .is_some_and(|d| d.contains("connection refused")));
    assert_eq!(orchestrator.phase(), Phase::Failed);
    assert!(orchestrator.snapshot().all_pending());
}

#[tokio::test(start_paused = true)]
async fn server_error_without_text_shows_generic_message() {
    let mut orchestrator = live(
        ScriptedTransport::new(UPLOADED, Reply::Respond(502, "<html>Bad Gateway</html>")),
        Duration::from_secs(300),
    );

    let failure = assert_err!(orchestrator.process(request()).await);

    assert_eq!(failure.kind, FailureKind::Transport);
    assert_eq!(failure.user_message(), GENERIC_FAILURE_MESSAGE);
}

#[tokio::test(start_paused = true)]
async fn analysis_error_decision_is_protocol_failure() {
    let mut orchestrator = live(
        ScriptedTransport::new(
            UPLOADED,
            Reply::Respond(200, r#"{"decision": "ERROR", "error": "Session not found"}"#),
        ),
        Duration::from_secs(300),
    );

    let failure = assert_err!(orchestrator.process(request()).await);
    assert_eq!(failure.kind, FailureKind::Protocol);
    assert!(failure.message.contains("Session not found"));
}

#[tokio::test(start_paused = true)]
async fn simulated_sample_two_is_conditional() {
    let mut orchestrator = ProcessingOrchestrator::new(
        Arc::new(SimulatedDriver::new(2)),
        Recorder::default(),
        StageRegistry::standard(),
        SETTLE,
    );

    let result = assert_ok!(orchestrator.process(request()).await);

    assert_eq!(result.decision, Decision::ConditionalAccept);
    assert_eq!(result.color_score, 78.2);
    assert_eq!(result.pattern_score, 82.1);
    assert_eq!(result.overall_score, 80.2);
    assert!(result.report.is_none());

    let verdict = ResultClassifier::for_settings(None).classify(&result);
    assert_eq!(verdict.decision_band, DecisionBand::Conditional);
    assert_eq!(verdict.overall_band, ScoreBand::Success);

    let seen = orchestrator.presenter().percentages();
    assert_monotonic(&seen);
    assert_eq!(seen.last(), Some(&100));
}

#[tokio::test(start_paused = true)]
async fn reset_during_analysis_drops_pending_work() {
    let transport = ScriptedTransport::new(UPLOADED, Reply::Hang);
    let calls = Arc::clone(&transport.calls);
    let mut orchestrator = live(transport, Duration::from_secs(300));

    assert_ok!(orchestrator.start(request()));
    while orchestrator.snapshot().state_of(StageId::Pattern) != StageState::Active {
        assert!(orchestrator.next_event().await.is_none());
    }
    assert_eq!(orchestrator.phase(), Phase::Analyzing);

    orchestrator.reset();
    assert_eq!(orchestrator.phase(), Phase::Idle);
    assert!(!orchestrator.is_active());
    assert!(orchestrator.snapshot().all_pending());

    let notified = orchestrator.presenter().snapshots.len();
    tokio::time::sleep(Duration::from_secs(600)).await;

    assert!(orchestrator.drain_ready().is_none());
    assert_eq!(orchestrator.presenter().snapshots.len(), notified);
    assert!(orchestrator.presenter().finished.is_empty());
    assert!(orchestrator.snapshot().all_pending());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // 重置后可以立即开始新会话
    assert_ok!(orchestrator.start(request()));
    assert!(orchestrator.is_active());
}

#[tokio::test(start_paused = true)]
async fn missing_sample_is_rejected_before_any_request() {
    let transport = ScriptedTransport::new(UPLOADED, ACCEPTED);
    let calls = Arc::clone(&transport.calls);
    let mut orchestrator = live(transport, Duration::from_secs(300));

    let failure = assert_err!(orchestrator.start(StartRequest {
        sample: None,
        ..request()
    }));

    assert_eq!(failure.kind, FailureKind::Validation);
    assert_eq!(orchestrator.phase(), Phase::Idle);
    assert!(orchestrator.presenter().snapshots.is_empty());
    tokio::task::yield_now().await;
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn client_deadline_applies_only_to_analysis() {
    let client = QcClient::new(ScriptedTransport::new(Reply::Hang, Reply::Hang))
        .with_analyze_deadline(Duration::from_secs(5));
    let started = Instant::now();

    let failure = assert_err!(client.analyze("abc", &QcSettings::default()).await);
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert!(started.elapsed() >= Duration::from_secs(5));

    // 上传没有截止时间
    let upload = tokio::time::timeout(
        Duration::from_secs(3600),
        client.upload(&textile_qc_client::models::ImagePair {
            reference: ImageHandle::new("r.png", b"r".to_vec()),
            sample: ImageHandle::new("s.png", b"s".to_vec()),
        }),
    )
    .await;
    assert!(upload.is_err());
}
