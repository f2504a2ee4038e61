//! 이벤트 디스패처 -- 업로드 하나에 대한 순서 보장 이벤트 시퀀스
//!
//! ```text
//! [PROJECT_CREATED] → BOM_CONSUMED → REPO_META_ANALYSIS* → VULN_ANALYSIS* → BOM_PROCESSED
//!                                                                   └─ 실패 시 ─→ BOM_PROCESSING_FAILED
//! ```
//!
//! 이벤트 N이 수락되거나 최종 실패하기 전에는 N+1을 시작하지 않습니다.
//! 각 발행 시도는 타임아웃 안에서 실행되고 선형 백오프로 재시도됩니다.
//! 재시도가 소진되면 시퀀스는 중단(halted)되어 이후 발행이 모두 거부됩니다.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};
use uuid::Uuid;

use bomgate_core::metrics as m;

use crate::bus::EventPublisher;
use crate::error::{FailureKind, IngestError};
use crate::event::{
    BomConsumed, BomProcessed, BomProcessingFailed, BusRecord, ComponentAnalysis, EventPayload,
    IngestEvent, ProjectCreated, Topic,
};
use crate::model::ProjectGraph;
use crate::reconcile::ReconciliationResult;

/// 발행 재시도 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    /// 발행 시도 하나의 타임아웃
    pub publish_timeout: Duration,
    /// 최초 시도 이후 재시도 횟수
    pub max_retries: u32,
    /// 재시도 백오프 기본 간격 (시도 번호만큼 곱해짐)
    pub retry_backoff_base: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            publish_timeout: Duration::from_secs(5),
            max_retries: 3,
            retry_backoff_base: Duration::from_millis(200),
        }
    }
}

/// 이벤트 시퀀스 팩토리
pub struct EventDispatcher<P: EventPublisher> {
    publisher: Arc<P>,
    settings: DispatchSettings,
}

impl<P: EventPublisher> EventDispatcher<P> {
    /// 새 디스패처를 생성합니다.
    pub fn new(publisher: Arc<P>, settings: DispatchSettings) -> Self {
        Self {
            publisher,
            settings,
        }
    }

    /// 업로드 하나에 대한 시퀀스를 시작합니다.
    pub fn sequence(&self, project: Uuid, trace_id: impl Into<String>) -> EventSequence<P> {
        EventSequence {
            publisher: Arc::clone(&self.publisher),
            settings: self.settings,
            project,
            trace_id: trace_id.into(),
            emitted: Vec::new(),
            halted: false,
        }
    }
}

/// 시퀀스 종료 시 보고
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceReport {
    pub trace_id: String,
    /// 버스가 수락한 토픽 (발행 순서)
    pub emitted: Vec<Topic>,
}

/// 업로드 하나의 이벤트 시퀀스
pub struct EventSequence<P: EventPublisher> {
    publisher: Arc<P>,
    settings: DispatchSettings,
    project: Uuid,
    trace_id: String,
    emitted: Vec<Topic>,
    halted: bool,
}

impl<P: EventPublisher> EventSequence<P> {
    /// 업로드 trace_id
    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    /// 지금까지 수락된 토픽
    pub fn emitted(&self) -> &[Topic] {
        &self.emitted
    }

    /// 발행 재시도가 소진되어 시퀀스가 중단되었는지 확인합니다.
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    /// 종료 이벤트가 이미 발행되었는지 확인합니다.
    pub fn is_terminated(&self) -> bool {
        self.emitted.last().is_some_and(Topic::is_terminal)
    }

    /// `PROJECT_CREATED`
    pub async fn project_created(&mut self) -> Result<(), IngestError> {
        let project = self.project;
        self.publish(EventPayload::ProjectCreated(ProjectCreated { project }))
            .await
    }

    /// `BOM_CONSUMED`
    pub async fn bom_consumed(
        &mut self,
        bom_format: &str,
        component_count: usize,
    ) -> Result<(), IngestError> {
        let payload = EventPayload::BomConsumed(BomConsumed {
            project: self.project,
            bom_format: bom_format.to_owned(),
            component_count,
        });
        self.publish(payload).await
    }

    /// 분석 요청 이벤트
    ///
    /// 생성되었거나 좌표가 바뀐 컴포넌트마다 `REPO_META_ANALYSIS_COMPONENT`,
    /// 이어서 커밋된 그래프의 모든 컴포넌트마다 `VULN_ANALYSIS_COMPONENT`를
    /// 식별자 순으로 발행합니다.
    pub async fn analysis(
        &mut self,
        result: &ReconciliationResult,
        committed: &ProjectGraph,
    ) -> Result<(), IngestError> {
        for component in result.repo_meta_targets() {
            self.publish(EventPayload::RepoMetaAnalysis(ComponentAnalysis::from(
                component,
            )))
            .await?;
        }

        let mut components: Vec<_> = committed.components.iter().collect();
        components.sort_by_cached_key(|c| c.identity());
        for component in components {
            self.publish(EventPayload::VulnAnalysis(ComponentAnalysis::from(component)))
                .await?;
        }
        Ok(())
    }

    /// `BOM_PROCESSED` -- 커밋 이후에만 호출됩니다.
    pub async fn processed(&mut self, summary: BomProcessed) -> Result<(), IngestError> {
        self.publish(EventPayload::BomProcessed(summary)).await
    }

    /// `BOM_PROCESSING_FAILED`
    pub async fn failed(&mut self, kind: FailureKind, reason: &str) -> Result<(), IngestError> {
        let payload = EventPayload::BomProcessingFailed(BomProcessingFailed {
            project: self.project,
            kind,
            reason: reason.to_owned(),
        });
        self.publish(payload).await
    }

    /// 시퀀스를 끝내고 보고를 반환합니다.
    pub fn into_report(self) -> SequenceReport {
        SequenceReport {
            trace_id: self.trace_id,
            emitted: self.emitted,
        }
    }

    async fn publish(&mut self, payload: EventPayload) -> Result<(), IngestError> {
        let topic = payload.topic();
        if self.halted {
            return Err(IngestError::Publish {
                topic: topic.as_str().to_owned(),
                reason: "sequence halted after publish failure".to_owned(),
            });
        }
        if self.is_terminated() {
            return Err(IngestError::Publish {
                topic: topic.as_str().to_owned(),
                reason: "sequence already terminated".to_owned(),
            });
        }

        let record = IngestEvent::new(payload, &self.trace_id).to_record()?;

        match self.publish_with_retry(topic, &record).await {
            Ok(()) => {
                metrics::counter!(
                    m::DISPATCH_EVENTS_PUBLISHED_TOTAL,
                    m::LABEL_TOPIC => topic.as_str()
                )
                .increment(1);
                debug!(
                    project = %self.project,
                    trace_id = %self.trace_id,
                    topic = topic.as_str(),
                    key = %record.key,
                    "event published"
                );
                self.emitted.push(topic);
                Ok(())
            }
            Err(e) => {
                self.halted = true;
                error!(
                    project = %self.project,
                    trace_id = %self.trace_id,
                    topic = topic.as_str(),
                    error = %e,
                    "event sequence halted"
                );
                Err(e)
            }
        }
    }

    /// 재시도 로직을 포함한 발행
    async fn publish_with_retry(
        &self,
        topic: Topic,
        record: &BusRecord,
    ) -> Result<(), IngestError> {
        let mut last_error = None;

        for attempt in 0..=self.settings.max_retries {
            if attempt > 0 {
                let backoff = self.settings.retry_backoff_base * attempt;
                warn!(
                    topic = topic.as_str(),
                    attempt = attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying publish"
                );
                metrics::counter!(
                    m::DISPATCH_PUBLISH_RETRIES_TOTAL,
                    m::LABEL_TOPIC => topic.as_str()
                )
                .increment(1);
                tokio::time::sleep(backoff).await;
            }

            match tokio::time::timeout(
                self.settings.publish_timeout,
                self.publisher.publish(record),
            )
            .await
            {
                Ok(Ok(())) => return Ok(()),
                Ok(Err(e)) if e.is_transient() => {
                    last_error = Some(e);
                }
                Ok(Err(e)) => return Err(e),
                Err(_elapsed) => {
                    last_error = Some(IngestError::Publish {
                        topic: topic.as_str().to_owned(),
                        reason: "publish timed out".to_owned(),
                    });
                }
            }
        }

        let attempts = self.settings.max_retries + 1;
        Err(IngestError::Publish {
            topic: topic.as_str().to_owned(),
            reason: match last_error {
                Some(e) => format!("gave up after {attempts} attempt(s): {e}"),
                None => format!("gave up after {attempts} attempt(s)"),
            },
        })
    }
}
