//! 수집 코디네이터 -- 업로드 하나의 전체 처리 흐름
//!
//! ```text
//! UploadRequest
//!   │  수락 정책 (content type → 형식, 활성화 여부, 파서, 크기)
//!   ▼
//! parse (spawn_blocking + timeout)
//!   │
//!   ▼
//! begin(project) ── ensure_project ── [PROJECT_CREATED] ── BOM_CONSUMED
//!   │
//!   ▼
//! snapshot ── reconcile ── (마지막 취소 지점) ── commit ── 잠금 해제
//!                                                   │
//!                                                   ▼
//!                         REPO_META* ── VULN* ── BOM_PROCESSED
//!
//! 어느 단계든 실패 → BOM_PROCESSING_FAILED (버스 자체가 실패한 경우 제외)
//! ```
//!
//! 결과는 항상 [`IngestOutcome`]으로 보고되며, 실패한 업로드가 조용히 사라지지 않습니다.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Instant, SystemTime};

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use bomgate_core::event::{EventMetadata, MODULE_BOM_INGEST};
use bomgate_core::metrics as m;

use crate::bus::EventPublisher;
use crate::config::IngestConfig;
use crate::dispatch::{EventDispatcher, EventSequence};
use crate::error::{FailureKind, IngestError};
use crate::event::{BomProcessed, Topic};
use crate::model::{BomFormat, ParsedDocument};
use crate::parser::{BomParser, ParserRegistry};
use crate::reconcile::Reconciler;
use crate::store::ProjectStore;
use crate::store::transaction::TransactionManager;

/// 업로드 요청
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    /// 대상 프로젝트
    pub project: Uuid,
    /// 선언된 content type
    pub content_type: String,
    /// 원본 문서 바이트
    pub document: Bytes,
}

impl UploadRequest {
    /// 새 업로드 요청을 생성합니다.
    pub fn new(project: Uuid, content_type: impl Into<String>, document: impl Into<Bytes>) -> Self {
        Self {
            project,
            content_type: content_type.into(),
            document: document.into(),
        }
    }
}

/// 성공한 업로드 요약
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestSummary {
    pub project: Uuid,
    pub trace_id: String,
    /// 예: "CycloneDX 1.5"
    pub bom_format: String,
    /// 이번 업로드로 프로젝트가 생성되었는지
    pub project_created: bool,
    pub created: usize,
    pub updated: usize,
    pub removed: usize,
    /// 커밋 후 컴포넌트 수
    pub components: usize,
    /// 커밋 후 간선 수
    pub edges: usize,
    /// 커밋 시도 횟수
    pub commit_attempts: u32,
    /// 발행된 토픽 (순서대로)
    pub events: Vec<Topic>,
}

/// 실패한 업로드 사유
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureReason {
    pub kind: FailureKind,
    pub message: String,
    pub trace_id: String,
    /// 실패 전까지 발행된 토픽 (철회되지 않음)
    pub events: Vec<Topic>,
}

/// 업로드 처리 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Processed(IngestSummary),
    Failed(FailureReason),
}

impl IngestOutcome {
    /// 성공 여부
    pub fn is_processed(&self) -> bool {
        matches!(self, Self::Processed(_))
    }

    /// 실패 분류 (성공이면 `None`)
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Processed(_) => None,
            Self::Failed(reason) => Some(reason.kind),
        }
    }

    /// 발행된 토픽
    pub fn events(&self) -> &[Topic] {
        match self {
            Self::Processed(summary) => &summary.events,
            Self::Failed(reason) => &reason.events,
        }
    }

    /// 업로드 trace_id
    pub fn trace_id(&self) -> &str {
        match self {
            Self::Processed(summary) => &summary.trace_id,
            Self::Failed(reason) => &reason.trace_id,
        }
    }
}

/// 커밋까지 끝난 업로드의 중간 결과
struct Committed {
    bom_format: String,
    project_created: bool,
    created: usize,
    updated: usize,
    removed: usize,
    components: usize,
    edges: usize,
    commit_attempts: u32,
}

/// 수집 코디네이터
pub struct IngestCoordinator<S: ProjectStore, P: EventPublisher> {
    config: IngestConfig,
    parsers: ParserRegistry,
    reconciler: Reconciler,
    transactions: TransactionManager<S>,
    dispatcher: EventDispatcher<P>,
}

impl<S: ProjectStore, P: EventPublisher> IngestCoordinator<S, P> {
    /// 기본 파서 레지스트리로 코디네이터를 생성합니다.
    pub fn new(config: IngestConfig, store: Arc<S>, publisher: Arc<P>) -> Self {
        let transactions = TransactionManager::new(
            store,
            config.commit_max_retries,
            config.commit_backoff_base(),
        );
        let dispatcher = EventDispatcher::new(publisher, config.dispatch_settings());
        Self {
            reconciler: Reconciler::new(config.merge_policy),
            parsers: ParserRegistry::with_defaults(),
            transactions,
            dispatcher,
            config,
        }
    }

    /// 파서 레지스트리를 교체합니다.
    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    /// 설정을 반환합니다.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// 트랜잭션 매니저를 반환합니다.
    pub fn transactions(&self) -> &TransactionManager<S> {
        &self.transactions
    }

    /// 업로드 하나를 처리합니다.
    ///
    /// `cancel`은 커밋 전까지만 효과가 있습니다. 커밋 이후에는
    /// 종료 이벤트까지 시퀀스를 끝까지 진행합니다.
    pub async fn ingest(&self, request: UploadRequest, cancel: &CancellationToken) -> IngestOutcome {
        self.ingest_tracked(request, cancel, &AtomicBool::new(false))
            .await
    }

    /// [`ingest`](Self::ingest)와 같지만 커밋 직후 `committed`를 `true`로 설정합니다.
    ///
    /// 워커는 이 플래그로 중단해도 되는 업로드인지 판단합니다.
    pub(crate) async fn ingest_tracked(
        &self,
        request: UploadRequest,
        cancel: &CancellationToken,
        committed: &AtomicBool,
    ) -> IngestOutcome {
        let started = Instant::now();
        let trace_id = EventMetadata::with_new_trace(MODULE_BOM_INGEST).trace_id;
        let mut sequence = self.dispatcher.sequence(request.project, trace_id.clone());

        info!(
            project = %request.project,
            trace_id = %trace_id,
            content_type = %request.content_type,
            bytes = request.document.len(),
            "upload received"
        );

        let result = self
            .process(&request, cancel, &mut sequence, committed)
            .await;
        metrics::histogram!(m::INGEST_UPLOAD_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());

        match result {
            Ok(c) => {
                metrics::counter!(m::INGEST_UPLOADS_TOTAL, m::LABEL_RESULT => "processed")
                    .increment(1);
                let report = sequence.into_report();
                info!(
                    project = %request.project,
                    trace_id = %report.trace_id,
                    created = c.created,
                    updated = c.updated,
                    removed = c.removed,
                    components = c.components,
                    events = report.emitted.len(),
                    "upload processed"
                );
                IngestOutcome::Processed(IngestSummary {
                    project: request.project,
                    trace_id: report.trace_id,
                    bom_format: c.bom_format,
                    project_created: c.project_created,
                    created: c.created,
                    updated: c.updated,
                    removed: c.removed,
                    components: c.components,
                    edges: c.edges,
                    commit_attempts: c.commit_attempts,
                    events: report.emitted,
                })
            }
            Err(e) => self.fail(request.project, e, sequence).await,
        }
    }

    /// 실패 분기 -- 가능하면 `BOM_PROCESSING_FAILED`로 시퀀스를 끝냅니다.
    async fn fail(
        &self,
        project: Uuid,
        err: IngestError,
        mut sequence: EventSequence<P>,
    ) -> IngestOutcome {
        let kind = err.kind();
        let message = err.to_string();
        metrics::counter!(
            m::INGEST_UPLOADS_TOTAL,
            m::LABEL_RESULT => "failed",
            m::LABEL_KIND => kind.as_str()
        )
        .increment(1);
        error!(
            project = %project,
            trace_id = %sequence.trace_id(),
            kind = kind.as_str(),
            error = %message,
            "upload failed"
        );

        // 버스가 응답하지 않으면 더 발행할 수 없음
        if kind != FailureKind::Publish && !sequence.is_halted() && !sequence.is_terminated() {
            if let Err(e) = sequence.failed(kind, &message).await {
                error!(
                    project = %project,
                    trace_id = %sequence.trace_id(),
                    error = %e,
                    "failed to publish terminal failure event"
                );
            }
        }

        let report = sequence.into_report();
        IngestOutcome::Failed(FailureReason {
            kind,
            message,
            trace_id: report.trace_id,
            events: report.emitted,
        })
    }

    /// 프로젝트 잠금은 `begin`부터 `commit`까지 유지됩니다.
    ///
    /// `PROJECT_CREATED`와 `BOM_CONSUMED` 발행(재시도 포함)도 잠금 안에서 일어나므로
    /// 버스가 느리면 같은 프로젝트의 다음 업로드가 그만큼 기다립니다. 같은 프로젝트의
    /// 커밋 전 이벤트는 업로드 순서대로 나갑니다.
    async fn process(
        &self,
        request: &UploadRequest,
        cancel: &CancellationToken,
        sequence: &mut EventSequence<P>,
        committed_flag: &AtomicBool,
    ) -> Result<Committed, IngestError> {
        let parser = self.accept(request)?;
        check_cancelled(cancel)?;

        let document = self.parse(parser, request.document.clone()).await?;
        check_cancelled(cancel)?;

        let tx = tokio::select! {
            tx = self.transactions.begin(request.project) => tx,
            () = cancel.cancelled() => return Err(IngestError::Cancelled),
        };

        // 이후 단계가 실패해도 생성된 프로젝트는 남김 (PROJECT_CREATED는 철회되지 않음)
        let project_created = tx.ensure_project().await?;
        if project_created {
            sequence.project_created().await?;
        }

        let bom_format = document.import_format_label();
        sequence
            .bom_consumed(&bom_format, document.flatten().len())
            .await?;

        let snapshot = tx.snapshot().await?;
        let result = self
            .reconciler
            .reconcile(request.project, snapshot, &document, SystemTime::now())
            .inspect_err(|e| {
                if let IngestError::Reconciliation { identities, .. } = e {
                    warn!(
                        project = %request.project,
                        identities = ?identities,
                        "document rejected by reconciliation"
                    );
                }
            })?;

        // 커밋 이후에는 취소를 받지 않음
        check_cancelled(cancel)?;
        let committed = tx.commit(&result).await?;
        committed_flag.store(true, Ordering::Release);

        metrics::counter!(m::INGEST_COMPONENTS_CREATED_TOTAL).increment(result.created.len() as u64);
        metrics::counter!(m::INGEST_COMPONENTS_UPDATED_TOTAL).increment(result.updated.len() as u64);
        metrics::counter!(m::INGEST_COMPONENTS_REMOVED_TOTAL).increment(result.removed.len() as u64);

        sequence.analysis(&result, &committed.graph).await?;

        let done = Committed {
            bom_format,
            project_created,
            created: result.created.len(),
            updated: result.updated.len(),
            removed: result.removed.len(),
            components: committed.graph.component_count(),
            edges: committed.graph.edges.len(),
            commit_attempts: committed.attempts,
        };

        sequence
            .processed(BomProcessed {
                project: request.project,
                bom_format: done.bom_format.clone(),
                components: done.components,
                edges: done.edges,
                created: done.created,
                updated: done.updated,
                removed: done.removed,
            })
            .await?;

        Ok(done)
    }

    /// 수락 정책을 검사하고 사용할 파서를 고릅니다.
    fn accept(&self, request: &UploadRequest) -> Result<Arc<dyn BomParser>, IngestError> {
        let format = BomFormat::from_content_type(&request.content_type).ok_or_else(|| {
            IngestError::AcceptancePolicy(format!(
                "unsupported content type '{}'",
                request.content_type
            ))
        })?;

        if !self.config.accepts(format) {
            return Err(IngestError::AcceptancePolicy(format!(
                "format {format} is not enabled"
            )));
        }

        let parser = self.parsers.get(format).ok_or_else(|| {
            IngestError::AcceptancePolicy(format!("no parser registered for {format}"))
        })?;

        if request.document.len() > self.config.max_document_size {
            return Err(IngestError::DocumentTooLarge {
                size: request.document.len(),
                max: self.config.max_document_size,
            });
        }

        Ok(parser)
    }

    /// 파서를 blocking 스레드에서 타임아웃 안에 실행합니다.
    async fn parse(
        &self,
        parser: Arc<dyn BomParser>,
        bytes: Bytes,
    ) -> Result<ParsedDocument, IngestError> {
        let format = parser.format();
        let task = tokio::task::spawn_blocking(move || parser.parse(&bytes));

        match tokio::time::timeout(self.config.parse_timeout(), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(e)) => Err(IngestError::parse(
                format.as_str(),
                format!("parser task failed: {e}"),
            )),
            Err(_elapsed) => Err(IngestError::parse(
                format.as_str(),
                format!("timed out after {}ms", self.config.parse_timeout_ms),
            )),
        }
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), IngestError> {
    if cancel.is_cancelled() {
        Err(IngestError::Cancelled)
    } else {
        Ok(())
    }
}
