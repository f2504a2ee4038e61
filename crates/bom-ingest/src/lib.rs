#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//!
//! - [`error`]: 도메인 에러 (`IngestError`, `FailureKind`)
//! - [`config`]: 수집 설정 (`IngestConfig`, 빌더)
//! - [`model`]: 프로젝트, 컴포넌트, 파싱된 문서
//! - [`codec`]: 바이트 ↔ 구조체 변환
//! - [`parser`]: 파서 경계 (`BomParser`, `ParserRegistry`, CycloneDX JSON)
//! - [`reconcile`]: 컴포넌트 조정 (`Reconciler`, `MergePolicy`)
//! - [`store`]: 저장소 trait, 메모리 저장소, 프로젝트 단위 트랜잭션
//! - [`event`]: 토픽과 이벤트 페이로드
//! - [`bus`]: 이벤트 버스 경계, 소비자, 콘솔 싱크
//! - [`dispatch`]: 업로드별 순서 보장 이벤트 발행
//! - [`coordinator`]: 업로드 하나의 처리 흐름
//! - [`service`]: 워커 풀과 `Pipeline` 구현
//!
//! # 아키텍처
//!
//! ```text
//! IngestHandle::submit ──mpsc──▶ worker ──▶ IngestCoordinator
//!                                              │
//!              ┌───────────────┬───────────────┼────────────────┐
//!              ▼               ▼               ▼                ▼
//!        ParserRegistry   Reconciler   TransactionManager   EventSequence
//!                                              │                │
//!                                         ProjectStore    EventPublisher ──▶ bus
//! ```

pub mod bus;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod model;
pub mod parser;
pub mod reconcile;
pub mod service;
pub mod store;

// --- 주요 타입 re-export ---

// 서비스
pub use service::{IngestHandle, IngestService, IngestServiceBuilder, PendingUpload};

// 코디네이터
pub use coordinator::{
    FailureReason, IngestCoordinator, IngestOutcome, IngestSummary, UploadRequest,
};

// 설정
pub use config::{IngestConfig, IngestConfigBuilder};

// 에러
pub use error::{FailureKind, IngestError};

// 모델
pub use model::{
    BomFormat, Classifier, Component, ComponentAttributes, ComponentIdentity, DependencyEdge,
    ExternalReference, ParsedDocument, Project, ProjectGraph,
};

// 파서
pub use parser::cyclonedx::CycloneDxJsonParser;
pub use parser::{BomParser, ParserRegistry};

// 조정
pub use reconcile::{MergePolicy, Reconciler, ReconciliationResult};

// 저장소
pub use store::ProjectStore;
pub use store::memory::{MemoryStore, StoreFault};
pub use store::transaction::TransactionManager;

// 이벤트와 버스
pub use bus::{BusConsumer, ChannelPublisher, ConsoleSink, Delivery, EventPublisher};
pub use dispatch::{DispatchSettings, EventDispatcher};
pub use event::{BusRecord, EventPayload, IngestEvent, Topic};
