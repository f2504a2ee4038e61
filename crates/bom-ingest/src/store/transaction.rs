//! 트랜잭션 매니저 -- 프로젝트별 배타 구간과 재시도 커밋
//!
//! ```text
//! begin(project) ──► 잠금 획득 ──► snapshot() ──► (조정) ──► commit() ──► 잠금 해제
//!                     │                                        │
//!                     └─ 다른 프로젝트는 독립 진행             └─ transient 실패 시 선형 백오프 재시도
//! ```
//!
//! 잠금은 스냅샷 읽기부터 커밋까지 유지되어 같은 프로젝트에 대한
//! 업데이트 손실을 막습니다. [`ProjectTransaction`]이 drop 되면 잠금이 풀리므로
//! 커밋 전 취소나 실패 경로에서도 잠금이 남지 않습니다.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};
use uuid::Uuid;

use bomgate_core::metrics as m;

use crate::error::IngestError;
use crate::model::{Project, ProjectGraph};
use crate::reconcile::ReconciliationResult;
use crate::store::ProjectStore;

/// 커밋 결과
#[derive(Debug, Clone, PartialEq)]
pub struct CommittedProject {
    /// 커밋된 그래프
    pub graph: ProjectGraph,
    /// 커밋까지 걸린 시도 횟수 (1부터 시작)
    pub attempts: u32,
}

/// 프로젝트별 잠금과 재시도 커밋을 관리합니다.
pub struct TransactionManager<S: ProjectStore> {
    store: Arc<S>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    max_retries: u32,
    backoff_base: Duration,
}

impl<S: ProjectStore> TransactionManager<S> {
    /// 새 트랜잭션 매니저를 생성합니다.
    pub fn new(store: Arc<S>, max_retries: u32, backoff_base: Duration) -> Self {
        Self {
            store,
            locks: Mutex::new(HashMap::new()),
            max_retries,
            backoff_base,
        }
    }

    /// 내부 저장소를 반환합니다.
    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// 프로젝트 배타 구간을 시작합니다.
    ///
    /// 같은 프로젝트의 이전 트랜잭션이 끝날 때까지 대기합니다.
    pub async fn begin(&self, project: Uuid) -> ProjectTransaction<'_, S> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // 대기자도 보유자도 없는 잠금 정리
            locks.retain(|_, l| Arc::strong_count(l) > 1);
            Arc::clone(locks.entry(project).or_default())
        };

        let guard = lock.lock_owned().await;
        debug!(project = %project, "project lock acquired");

        ProjectTransaction {
            manager: self,
            project,
            _guard: guard,
        }
    }

    /// 현재 관리 중인 잠금 수를 반환합니다.
    pub async fn active_locks(&self) -> usize {
        self.locks
            .lock()
            .await
            .values()
            .filter(|l| Arc::strong_count(l) > 1)
            .count()
    }
}

/// 잠금을 보유한 프로젝트 트랜잭션
pub struct ProjectTransaction<'a, S: ProjectStore> {
    manager: &'a TransactionManager<S>,
    project: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl<S: ProjectStore> ProjectTransaction<'_, S> {
    /// 대상 프로젝트 UUID
    pub fn project(&self) -> Uuid {
        self.project
    }

    /// 프로젝트가 없으면 생성합니다. 새로 만들었으면 `true`.
    pub async fn ensure_project(&self) -> Result<bool, IngestError> {
        self.manager
            .store
            .create_project(Project::new(self.project))
            .await
    }

    /// 커밋된 그래프 스냅샷을 읽습니다.
    pub async fn snapshot(&self) -> Result<Option<ProjectGraph>, IngestError> {
        self.manager.store.load(self.project).await
    }

    /// 조정 결과를 원자적으로 커밋하고 잠금을 해제합니다.
    ///
    /// 일시적 저장소 실패는 `max_retries`회까지 선형 백오프로 재시도합니다.
    pub async fn commit(
        self,
        result: &ReconciliationResult,
    ) -> Result<CommittedProject, IngestError> {
        if result.project != self.project {
            return Err(IngestError::persistence(
                self.project,
                format!("result belongs to project {}", result.project),
            ));
        }

        let started = Instant::now();
        let mut last_error = None;

        for attempt in 0..=self.manager.max_retries {
            if attempt > 0 {
                let backoff = self.manager.backoff_base * attempt;
                warn!(
                    project = %self.project,
                    attempt = attempt,
                    backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                    "retrying commit"
                );
                metrics::counter!(m::STORE_COMMIT_RETRIES_TOTAL).increment(1);
                tokio::time::sleep(backoff).await;
            }

            match self.manager.store.apply(result).await {
                Ok(graph) => {
                    metrics::histogram!(m::STORE_COMMIT_DURATION_SECONDS)
                        .record(started.elapsed().as_secs_f64());
                    debug!(
                        project = %self.project,
                        components = graph.component_count(),
                        edges = graph.edges.len(),
                        attempts = attempt + 1,
                        "commit succeeded"
                    );
                    return Ok(CommittedProject {
                        graph,
                        attempts: attempt + 1,
                    });
                }
                Err(e) if e.is_transient() => {
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| {
            IngestError::persistence(self.project, "commit retries exhausted")
        }))
    }
}
