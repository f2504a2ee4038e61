//! 프로세스 내 프로젝트 저장소
//!
//! 적용은 복제한 그래프 위에서 수행하고 모든 검증을 통과한 뒤에만 교체하므로
//! 중간 상태가 외부에 보이지 않습니다.
//!
//! [`StoreFault`]를 큐에 넣어 다음 `apply` 호출의 실패를 흉내 낼 수 있습니다.
//! 통합 테스트와 CLI 시연에서 원자성과 재시도를 확인하는 데 사용합니다.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

use crate::error::IngestError;
use crate::model::{Project, ProjectGraph};
use crate::reconcile::ReconciliationResult;
use crate::store::ProjectStore;

/// 다음 `apply` 호출에 주입할 장애
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    /// 일시적 실패 (재시도 대상)
    Transient,
    /// 영구 실패
    Permanent,
    /// 일부 행을 쓴 뒤 연결이 끊긴 상황
    AfterPartialApply,
}

/// 메모리 기반 프로젝트 저장소
#[derive(Default)]
pub struct MemoryStore {
    projects: RwLock<HashMap<Uuid, ProjectGraph>>,
    faults: Mutex<VecDeque<StoreFault>>,
    applied: AtomicU64,
}

impl MemoryStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 다음 `apply` 호출에서 발생할 장애를 큐에 추가합니다.
    pub async fn inject_fault(&self, fault: StoreFault) {
        self.faults.lock().await.push_back(fault);
    }

    /// 성공적으로 커밋된 횟수를 반환합니다.
    pub fn applied_count(&self) -> u64 {
        self.applied.load(Ordering::Relaxed)
    }

    /// 저장된 프로젝트 수를 반환합니다.
    pub async fn project_count(&self) -> usize {
        self.projects.read().await.len()
    }
}

impl ProjectStore for MemoryStore {
    async fn load(&self, project: Uuid) -> Result<Option<ProjectGraph>, IngestError> {
        Ok(self.projects.read().await.get(&project).cloned())
    }

    async fn create_project(&self, project: Project) -> Result<bool, IngestError> {
        let mut projects = self.projects.write().await;
        if projects.contains_key(&project.uuid) {
            return Ok(false);
        }
        debug!(project = %project.uuid, "project created");
        projects.insert(project.uuid, ProjectGraph::empty(project));
        Ok(true)
    }

    async fn apply(&self, result: &ReconciliationResult) -> Result<ProjectGraph, IngestError> {
        let fault = self.faults.lock().await.pop_front();
        let project = result.project;

        match fault {
            Some(StoreFault::Transient) => {
                return Err(IngestError::Persistence {
                    project: project.to_string(),
                    reason: "transaction aborted: serialization failure".to_owned(),
                    transient: true,
                });
            }
            Some(StoreFault::Permanent) => {
                return Err(IngestError::persistence(project, "constraint violation"));
            }
            _ => {}
        }

        let mut projects = self.projects.write().await;
        let current = projects
            .get(&project)
            .ok_or_else(|| IngestError::persistence(project, "project does not exist"))?;

        let mut next = current.clone();

        let removed: HashSet<Uuid> = result.removed.iter().map(|c| c.uuid).collect();
        let before = next.components.len();
        next.components.retain(|c| !removed.contains(&c.uuid));
        if before - next.components.len() != removed.len() {
            return Err(IngestError::persistence(
                project,
                "removed component is not in the committed graph",
            ));
        }

        for update in &result.updated {
            let slot = next
                .components
                .iter_mut()
                .find(|c| c.uuid == update.after.uuid)
                .ok_or_else(|| {
                    IngestError::persistence(
                        project,
                        format!(
                            "updated component {} is not in the committed graph",
                            update.after.uuid
                        ),
                    )
                })?;
            *slot = update.after.clone();
        }

        if fault == Some(StoreFault::AfterPartialApply) {
            // 복제본만 바뀐 상태에서 중단
            return Err(IngestError::persistence(
                project,
                "connection lost during transaction",
            ));
        }

        next.components.extend(result.created.iter().cloned());

        let mut identities = HashSet::new();
        for component in &next.components {
            if !identities.insert(component.identity()) {
                return Err(IngestError::persistence(
                    project,
                    format!("duplicate component identity {}", component.identity()),
                ));
            }
        }

        let uuids: HashSet<Uuid> = next.components.iter().map(|c| c.uuid).collect();
        if let Some(edge) = result
            .edges
            .iter()
            .find(|e| !uuids.contains(&e.from) || !uuids.contains(&e.to))
        {
            return Err(IngestError::persistence(
                project,
                format!(
                    "edge {} -> {} references a missing component",
                    edge.from, edge.to
                ),
            ));
        }
        if result
            .metadata
            .direct_dependencies
            .iter()
            .any(|d| !uuids.contains(d))
        {
            return Err(IngestError::persistence(
                project,
                "direct dependency references a missing component",
            ));
        }

        next.edges = result.edges.clone();
        result.metadata.apply_to(&mut next.project);
        next.sort_components();

        projects.insert(project, next.clone());
        self.applied.fetch_add(1, Ordering::Relaxed);

        Ok(next)
    }
}
