//! 수집 서비스 -- 워커 풀과 [`Pipeline`] 생명주기 구현
//!
//! [`IngestService`]는 제한된 크기의 mpsc 대기열에서 [`UploadJob`]을 꺼내
//! N개의 워커 task가 병렬로 처리하도록 합니다. 같은 프로젝트에 대한 업로드는
//! 트랜잭션 매니저의 프로젝트 잠금으로 직렬화되고, 다른 프로젝트는 서로 막지 않습니다.
//!
//! ```text
//! IngestHandle::submit ──mpsc──▶ worker 0..N ──▶ IngestCoordinator::ingest
//!        │                                              │
//!        └── PendingUpload ◀──────── oneshot ───────────┘
//! ```
//!
//! # 재시작 제한
//!
//! `stop()` 후 재시작이 필요하면 [`IngestServiceBuilder`]로 새 인스턴스를 생성해야 합니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use bomgate_core::error::{BomgateError, PipelineError};
use bomgate_core::pipeline::{HealthStatus, Pipeline};

use crate::bus::EventPublisher;
use crate::config::IngestConfig;
use crate::coordinator::{IngestCoordinator, IngestOutcome, UploadRequest};
use crate::error::IngestError;
use crate::parser::ParserRegistry;
use crate::store::ProjectStore;

/// 정지 시 워커가 진행 중인 업로드를 마무리할 수 있도록 기다리는 기본 시간
const STOP_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// 대기열에 들어가는 작업 단위
pub struct UploadJob {
    pub request: UploadRequest,
    pub cancel: CancellationToken,
    pub reply: oneshot::Sender<IngestOutcome>,
}

/// 제출된 업로드의 결과 대기 핸들
pub struct PendingUpload {
    outcome: oneshot::Receiver<IngestOutcome>,
    cancel: CancellationToken,
}

impl PendingUpload {
    /// 커밋 전이라면 업로드를 취소합니다.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// 업로드 취소 토큰
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// 최종 결과를 기다립니다.
    pub async fn wait(self) -> Result<IngestOutcome, IngestError> {
        self.outcome
            .await
            .map_err(|_| IngestError::Channel("upload dropped before completion".to_owned()))
    }
}

/// 업로드 제출 핸들 (복제 가능)
#[derive(Clone)]
pub struct IngestHandle {
    tx: mpsc::Sender<UploadJob>,
    shutdown: CancellationToken,
}

impl IngestHandle {
    /// 업로드를 대기열에 넣습니다.
    ///
    /// 대기열이 가득 차면 빈 자리가 생길 때까지 기다립니다.
    pub async fn submit(&self, request: UploadRequest) -> Result<PendingUpload, IngestError> {
        if self.shutdown.is_cancelled() {
            return Err(IngestError::Channel("ingest service is stopped".to_owned()));
        }

        // 서비스 정지 시 커밋 전 업로드는 함께 취소됨
        let cancel = self.shutdown.child_token();
        let (reply, outcome) = oneshot::channel();
        let job = UploadJob {
            request,
            cancel: cancel.clone(),
            reply,
        };

        self.tx
            .send(job)
            .await
            .map_err(|_| IngestError::Channel("ingest queue is closed".to_owned()))?;

        Ok(PendingUpload { outcome, cancel })
    }
}

/// 실행 중인 워커 task
struct Worker {
    task: tokio::task::JoinHandle<()>,
    /// 현재 업로드가 커밋을 지났는지
    committed: Arc<AtomicBool>,
}

/// 서비스 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ServiceState {
    Initialized,
    Running,
    Stopped,
}

/// BOM 수집 서비스
pub struct IngestService<S: ProjectStore, P: EventPublisher> {
    config: IngestConfig,
    coordinator: Arc<IngestCoordinator<S, P>>,
    state: ServiceState,
    tx: mpsc::Sender<UploadJob>,
    /// `start()`에서 워커에게 넘겨짐
    rx: Option<mpsc::Receiver<UploadJob>>,
    shutdown: CancellationToken,
    workers: Vec<Worker>,
    stop_grace_period: Duration,
    uploads_processed: Arc<AtomicU64>,
    uploads_failed: Arc<AtomicU64>,
}

impl<S: ProjectStore, P: EventPublisher> IngestService<S, P> {
    /// 빌더를 생성합니다.
    pub fn builder() -> IngestServiceBuilder<S, P> {
        IngestServiceBuilder::new()
    }

    /// 업로드 제출 핸들을 반환합니다.
    ///
    /// 시작 전에 제출된 업로드는 대기열에서 기다립니다.
    pub fn handle(&self) -> IngestHandle {
        IngestHandle {
            tx: self.tx.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// 현재 상태 이름
    pub fn state_name(&self) -> &'static str {
        match self.state {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        }
    }

    /// 성공한 업로드 수
    pub fn uploads_processed(&self) -> u64 {
        self.uploads_processed.load(Ordering::Relaxed)
    }

    /// 실패한 업로드 수
    pub fn uploads_failed(&self) -> u64 {
        self.uploads_failed.load(Ordering::Relaxed)
    }

    /// 코디네이터
    pub fn coordinator(&self) -> &Arc<IngestCoordinator<S, P>> {
        &self.coordinator
    }
}

impl<S: ProjectStore, P: EventPublisher> Pipeline for IngestService<S, P> {
    async fn start(&mut self) -> Result<(), BomgateError> {
        if self.state == ServiceState::Running {
            return Err(PipelineError::AlreadyRunning.into());
        }

        let rx = self.rx.take().ok_or_else(|| {
            PipelineError::InitFailed(
                "ingest service cannot be restarted, build a new instance".to_owned(),
            )
        })?;
        let rx = Arc::new(Mutex::new(rx));

        info!(workers = self.config.workers, "starting ingest service");

        for worker in 0..self.config.workers {
            let committed = Arc::new(AtomicBool::new(false));
            let task = tokio::spawn(run_worker(
                worker,
                Arc::clone(&rx),
                Arc::clone(&self.coordinator),
                self.shutdown.clone(),
                Arc::clone(&committed),
                Arc::clone(&self.uploads_processed),
                Arc::clone(&self.uploads_failed),
            ));
            self.workers.push(Worker { task, committed });
        }

        self.state = ServiceState::Running;
        info!("ingest service started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), BomgateError> {
        if self.state != ServiceState::Running {
            return Err(PipelineError::NotRunning.into());
        }

        info!("stopping ingest service");
        self.shutdown.cancel();

        for Worker { mut task, committed } in self.workers.drain(..) {
            if tokio::time::timeout(self.stop_grace_period, &mut task)
                .await
                .is_ok()
            {
                continue;
            }

            // 커밋된 업로드는 종료 이벤트까지 진행해야 함
            if committed.load(Ordering::Acquire) {
                warn!("ingest worker is finishing a committed upload, waiting");
                let _ = task.await;
            } else {
                warn!("ingest worker did not finish in time, aborting");
                task.abort();
                let _ = task.await;
            }
        }

        self.state = ServiceState::Stopped;
        info!(
            processed = self.uploads_processed(),
            failed = self.uploads_failed(),
            "ingest service stopped"
        );
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ServiceState::Running => {
                let exited = self.workers.iter().filter(|w| w.task.is_finished()).count();
                if exited == self.workers.len() {
                    HealthStatus::Unhealthy("all workers exited".to_owned())
                } else if exited > 0 {
                    HealthStatus::Degraded(format!(
                        "{exited} of {} workers exited",
                        self.workers.len()
                    ))
                } else if self.tx.capacity() == 0 {
                    HealthStatus::Degraded("upload queue is full".to_owned())
                } else {
                    HealthStatus::Healthy
                }
            }
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

async fn run_worker<S: ProjectStore, P: EventPublisher>(
    worker: usize,
    rx: Arc<Mutex<mpsc::Receiver<UploadJob>>>,
    coordinator: Arc<IngestCoordinator<S, P>>,
    shutdown: CancellationToken,
    committed: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
) {
    debug!(worker, "ingest worker started");

    loop {
        let job = {
            let mut rx = rx.lock().await;
            tokio::select! {
                () = shutdown.cancelled() => None,
                job = rx.recv() => job,
            }
        };
        let Some(job) = job else { break };
        handle_job(&coordinator, job, &committed, &processed, &failed).await;
    }

    // 정지 후 남은 작업도 결과(취소)를 받아야 함
    loop {
        let job = rx.lock().await.try_recv();
        let Ok(job) = job else { break };
        handle_job(&coordinator, job, &committed, &processed, &failed).await;
    }

    debug!(worker, "ingest worker stopped");
}

async fn handle_job<S: ProjectStore, P: EventPublisher>(
    coordinator: &IngestCoordinator<S, P>,
    job: UploadJob,
    committed: &AtomicBool,
    processed: &AtomicU64,
    failed: &AtomicU64,
) {
    committed.store(false, Ordering::Release);
    let outcome = coordinator
        .ingest_tracked(job.request, &job.cancel, committed)
        .await;
    if outcome.is_processed() {
        processed.fetch_add(1, Ordering::Relaxed);
    } else {
        failed.fetch_add(1, Ordering::Relaxed);
    }

    if job.reply.send(outcome).is_err() {
        debug!("upload submitter went away before the outcome was ready");
    }
    committed.store(false, Ordering::Release);
}

/// [`IngestService`] 빌더
pub struct IngestServiceBuilder<S: ProjectStore, P: EventPublisher> {
    config: IngestConfig,
    store: Option<Arc<S>>,
    publisher: Option<Arc<P>>,
    parsers: Option<ParserRegistry>,
    stop_grace_period: Duration,
}

impl<S: ProjectStore, P: EventPublisher> IngestServiceBuilder<S, P> {
    /// 기본 설정으로 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: IngestConfig::default(),
            store: None,
            publisher: None,
            parsers: None,
            stop_grace_period: STOP_GRACE_PERIOD,
        }
    }

    /// 설정을 지정합니다.
    pub fn config(mut self, config: IngestConfig) -> Self {
        self.config = config;
        self
    }

    /// 프로젝트 저장소를 지정합니다 (필수).
    pub fn store(mut self, store: Arc<S>) -> Self {
        self.store = Some(store);
        self
    }

    /// 이벤트 발행자를 지정합니다 (필수).
    pub fn publisher(mut self, publisher: Arc<P>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// 파서 레지스트리를 교체합니다.
    pub fn parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = Some(parsers);
        self
    }

    /// 정지 시 커밋 전 업로드를 기다리는 시간을 지정합니다.
    ///
    /// 커밋을 지난 업로드는 이 시간과 관계없이 끝까지 기다립니다.
    pub fn stop_grace_period(mut self, period: Duration) -> Self {
        self.stop_grace_period = period;
        self
    }

    /// 서비스를 빌드합니다.
    pub fn build(self) -> Result<IngestService<S, P>, IngestError> {
        self.config.validate()?;

        let store = self.store.ok_or_else(|| IngestError::Config {
            field: "store".to_owned(),
            reason: "a project store is required".to_owned(),
        })?;
        let publisher = self.publisher.ok_or_else(|| IngestError::Config {
            field: "publisher".to_owned(),
            reason: "an event publisher is required".to_owned(),
        })?;

        let mut coordinator = IngestCoordinator::new(self.config.clone(), store, publisher);
        if let Some(parsers) = self.parsers {
            coordinator = coordinator.with_parsers(parsers);
        }

        let (tx, rx) = mpsc::channel(self.config.queue_capacity);

        Ok(IngestService {
            coordinator: Arc::new(coordinator),
            state: ServiceState::Initialized,
            tx,
            rx: Some(rx),
            shutdown: CancellationToken::new(),
            workers: Vec::new(),
            stop_grace_period: self.stop_grace_period,
            uploads_processed: Arc::new(AtomicU64::new(0)),
            uploads_failed: Arc::new(AtomicU64::new(0)),
            config: self.config,
        })
    }
}

impl<S: ProjectStore, P: EventPublisher> Default for IngestServiceBuilder<S, P> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::MockPublisher;
    use crate::config::IngestConfigBuilder;
    use crate::error::FailureKind;
    use crate::event::Topic;
    use crate::store::memory::MemoryStore;
    use uuid::Uuid;

    const DOC: &str = r#"{
        "bomFormat": "CycloneDX",
        "specVersion": "1.5",
        "components": [{"bom-ref": "a", "name": "a", "version": "1.0.0"}]
    }"#;

    fn service(workers: usize) -> IngestService<MemoryStore, MockPublisher> {
        IngestServiceBuilder::new()
            .config(IngestConfigBuilder::new().workers(workers).build().unwrap())
            .store(Arc::new(MemoryStore::new()))
            .publisher(Arc::new(MockPublisher::new()))
            .build()
            .unwrap()
    }

    fn request(project: Uuid) -> UploadRequest {
        UploadRequest::new(project, "application/vnd.cyclonedx+json", DOC)
    }

    #[tokio::test]
    async fn lifecycle_states() {
        let mut svc = service(2);
        assert_eq!(svc.state_name(), "initialized");
        assert!(svc.health_check().await.is_unhealthy());

        svc.start().await.unwrap();
        assert_eq!(svc.state_name(), "running");
        assert!(svc.health_check().await.is_healthy());

        svc.stop().await.unwrap();
        assert_eq!(svc.state_name(), "stopped");
        assert_eq!(
            svc.health_check().await,
            HealthStatus::Unhealthy("stopped".to_owned())
        );
    }

    #[tokio::test]
    async fn start_twice_fails() {
        let mut svc = service(1);
        svc.start().await.unwrap();
        let err = svc.start().await.unwrap_err();
        assert!(matches!(
            err,
            BomgateError::Pipeline(PipelineError::AlreadyRunning)
        ));
        svc.stop().await.unwrap();
    }

    #[tokio::test]
    async fn stop_without_start_fails() {
        let mut svc = service(1);
        let err = svc.stop().await.unwrap_err();
        assert!(matches!(err, BomgateError::Pipeline(PipelineError::NotRunning)));
    }

    #[tokio::test]
    async fn restart_after_stop_is_rejected() {
        let mut svc = service(1);
        svc.start().await.unwrap();
        svc.stop().await.unwrap();
        assert!(svc.start().await.is_err());
    }

    #[tokio::test]
    async fn submitted_upload_is_processed() {
        let mut svc = service(2);
        svc.start().await.unwrap();

        let pending = svc.handle().submit(request(Uuid::new_v4())).await.unwrap();
        let outcome = pending.wait().await.unwrap();
        assert!(outcome.is_processed());
        assert_eq!(svc.uploads_processed(), 1);
        assert_eq!(svc.uploads_failed(), 0);

        svc.stop().await.unwrap();
    }

    #[tokio::test]
    async fn failed_upload_is_counted() {
        let mut svc = service(1);
        svc.start().await.unwrap();

        let bad = UploadRequest::new(Uuid::new_v4(), "application/vnd.cyclonedx+json", "{");
        let outcome = svc.handle().submit(bad).await.unwrap().wait().await.unwrap();
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Parse));
        assert_eq!(svc.uploads_failed(), 1);

        svc.stop().await.unwrap();
    }

    #[tokio::test]
    async fn upload_submitted_before_start_waits_in_queue() {
        let mut svc = service(1);
        let pending = svc.handle().submit(request(Uuid::new_v4())).await.unwrap();
        svc.start().await.unwrap();
        assert!(pending.wait().await.unwrap().is_processed());
        svc.stop().await.unwrap();
    }

    #[tokio::test]
    async fn cancelled_upload_reports_cancelled() {
        let svc = service(1);
        let pending = svc.handle().submit(request(Uuid::new_v4())).await.unwrap();
        pending.cancel();

        let mut svc = svc;
        svc.start().await.unwrap();
        let outcome = pending.wait().await.unwrap();
        assert_eq!(outcome.failure_kind(), Some(FailureKind::Cancelled));
        svc.stop().await.unwrap();
    }

    #[tokio::test]
    async fn submit_after_stop_is_rejected() {
        let mut svc = service(1);
        let handle = svc.handle();
        svc.start().await.unwrap();
        svc.stop().await.unwrap();

        let err = handle.submit(request(Uuid::new_v4())).await.err().unwrap();
        assert!(matches!(err, IngestError::Channel(_)));
    }

    #[tokio::test]
    async fn stop_waits_for_committed_upload_to_publish_terminal_event() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(MockPublisher::new().with_delay(Duration::from_millis(200)));
        let mut svc = IngestServiceBuilder::new()
            .config(IngestConfigBuilder::new().workers(1).build().unwrap())
            .store(Arc::clone(&store))
            .publisher(Arc::clone(&publisher))
            .stop_grace_period(Duration::from_millis(50))
            .build()
            .unwrap();
        svc.start().await.unwrap();

        let pending = svc.handle().submit(request(Uuid::new_v4())).await.unwrap();
        while store.applied_count() == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        // 커밋 이후 발행이 남아 있는 상태에서 정지
        svc.stop().await.unwrap();

        let outcome = pending.wait().await.unwrap();
        assert!(outcome.is_processed());
        assert_eq!(outcome.events().last(), Some(&Topic::BomProcessed));
        assert_eq!(
            publisher.topics().await.last().map(String::as_str),
            Some("BOM_PROCESSED")
        );
    }

    #[tokio::test]
    async fn stop_aborts_uncommitted_upload_after_grace_period() {
        let store = Arc::new(MemoryStore::new());
        let publisher = Arc::new(MockPublisher::new().with_delay(Duration::from_millis(500)));
        let mut svc = IngestServiceBuilder::new()
            .config(IngestConfigBuilder::new().workers(1).build().unwrap())
            .store(Arc::clone(&store))
            .publisher(Arc::clone(&publisher))
            .stop_grace_period(Duration::from_millis(50))
            .build()
            .unwrap();
        svc.start().await.unwrap();

        let pending = svc.handle().submit(request(Uuid::new_v4())).await.unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        svc.stop().await.unwrap();

        assert_eq!(store.applied_count(), 0);
        assert!(pending.wait().await.is_err());
    }

    #[test]
    fn builder_requires_store() {
        let result = IngestServiceBuilder::<MemoryStore, MockPublisher>::new()
            .publisher(Arc::new(MockPublisher::new()))
            .build();
        assert!(matches!(result, Err(IngestError::Config { ref field, .. }) if field == "store"));
    }

    #[test]
    fn builder_requires_publisher() {
        let result = IngestServiceBuilder::<MemoryStore, MockPublisher>::new()
            .store(Arc::new(MemoryStore::new()))
            .build();
        assert!(
            matches!(result, Err(IngestError::Config { ref field, .. }) if field == "publisher")
        );
    }

    #[test]
    fn builder_validates_config() {
        let mut config = IngestConfig::default();
        config.workers = 0;
        let result = IngestServiceBuilder::<MemoryStore, MockPublisher>::new()
            .config(config)
            .store(Arc::new(MemoryStore::new()))
            .publisher(Arc::new(MockPublisher::new()))
            .build();
        assert!(result.is_err());
    }
}
