//! 저장소 경계 -- 프로젝트 그래프 읽기와 원자적 커밋
//!
//! [`ProjectStore`] trait은 영속 계층이 제공해야 하는 최소 연산입니다.
//!
//! - 프로젝트 단위 커밋 그래프 읽기
//! - 프로젝트 생성 (이미 있으면 `false`)
//! - [`ReconciliationResult`]의 전부 또는 전무 적용
//!
//! 같은 프로젝트에 대한 직렬화는 저장소가 아니라
//! [`TransactionManager`](transaction::TransactionManager)의 프로젝트별 잠금이 담당합니다.
//!
//! # 구현체
//!
//! - [`MemoryStore`](memory::MemoryStore) -- 프로세스 내 저장소, 장애 주입 지원

pub mod memory;
pub mod transaction;

use std::future::Future;

use uuid::Uuid;

use crate::error::IngestError;
use crate::model::{Project, ProjectGraph};
use crate::reconcile::ReconciliationResult;

/// 프로젝트 그래프 저장소 trait
pub trait ProjectStore: Send + Sync + 'static {
    /// 커밋된 프로젝트 그래프를 읽습니다. 프로젝트가 없으면 `None`.
    fn load(
        &self,
        project: Uuid,
    ) -> impl Future<Output = Result<Option<ProjectGraph>, IngestError>> + Send;

    /// 프로젝트를 생성합니다.
    ///
    /// 새로 만들었으면 `true`, 이미 있었으면 `false`를 반환합니다.
    fn create_project(
        &self,
        project: Project,
    ) -> impl Future<Output = Result<bool, IngestError>> + Send;

    /// 조정 결과를 하나의 트랜잭션으로 적용하고 커밋된 그래프를 반환합니다.
    ///
    /// 실패하면 어떤 변경도 관측되지 않아야 합니다.
    fn apply(
        &self,
        result: &ReconciliationResult,
    ) -> impl Future<Output = Result<ProjectGraph, IngestError>> + Send;
}
