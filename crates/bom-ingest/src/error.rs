//! BOM 수집 에러 타입
//!
//! [`IngestError`]는 수집 모듈 내에서 발생할 수 있는 모든 에러를 나타냅니다.
//! `From<IngestError> for BomgateError` 구현을 통해 `?` 연산자로
//! 상위 에러 타입으로 자연스럽게 전파됩니다.
//!
//! # 에러 카테고리
//!
//! | 분류 | 재시도 | 비고 |
//! |------|--------|------|
//! | `AcceptancePolicy` | 없음 | 형식 비활성화, 크기 초과, 알 수 없는 content type |
//! | `Parse` | 없음 | 파싱 타임아웃 포함 |
//! | `Reconciliation` | 없음 | 문제 된 식별자를 함께 기록 |
//! | `Persistence` | 트랜잭션 경계에서 | `transient`일 때만 |
//! | `Publish` | 이벤트 단위 | 소진 시 시퀀스 중단 |
//! | `Serialization` | 없음 | |

use std::fmt;

use serde::{Deserialize, Serialize};

use bomgate_core::error::{BomgateError, ConfigError, IngestFailure, PipelineError};

/// 실패 분류
///
/// 코디네이터가 최종 결과(`Failed`)와 `BOM_PROCESSING_FAILED` 이벤트에 싣는 값입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// 수락 정책 위반
    AcceptancePolicy,
    /// 문서 파싱 실패
    Parse,
    /// 그래프 조정 실패
    Reconciliation,
    /// 저장소 커밋 실패
    Persistence,
    /// 이벤트 발행 실패
    Publish,
    /// 직렬화 실패
    Serialization,
    /// 커밋 전 취소
    Cancelled,
    /// 설정 또는 내부 채널 문제
    Internal,
}

impl FailureKind {
    /// 안정적인 문자열 표현을 반환합니다 (메트릭 레이블, 로그에 사용).
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AcceptancePolicy => "acceptance_policy",
            Self::Parse => "parse",
            Self::Reconciliation => "reconciliation",
            Self::Persistence => "persistence",
            Self::Publish => "publish",
            Self::Serialization => "serialization",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BOM 수집 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// 수락 정책 위반 (재시도 없음)
    #[error("acceptance policy: {0}")]
    AcceptancePolicy(String),

    /// 문서 크기 초과
    #[error("acceptance policy: document too large: {size} bytes (max: {max})")]
    DocumentTooLarge {
        /// 실제 크기 (바이트)
        size: usize,
        /// 최대 허용 크기 (바이트)
        max: usize,
    },

    /// 문서 파싱 실패
    #[error("parse error: {format}: {reason}")]
    Parse {
        /// 문서 형식
        format: String,
        /// 실패 사유
        reason: String,
    },

    /// 그래프 조정 실패
    #[error("reconciliation error: {reason} [{}]", .identities.join(", "))]
    Reconciliation {
        /// 실패 사유
        reason: String,
        /// 문제가 된 bom-ref 또는 컴포넌트 식별자
        identities: Vec<String>,
    },

    /// 저장소 실패
    #[error("persistence error: project {project}: {reason}")]
    Persistence {
        /// 대상 프로젝트
        project: String,
        /// 실패 사유
        reason: String,
        /// 일시적 실패 여부 (재시도 대상)
        transient: bool,
    },

    /// 이벤트 발행 실패
    #[error("publish error: {topic}: {reason}")]
    Publish {
        /// 발행 대상 토픽
        topic: String,
        /// 실패 사유
        reason: String,
    },

    /// 직렬화/역직렬화 실패
    #[error("serialization error: {0}")]
    Serialization(String),

    /// 커밋 전 취소
    #[error("ingestion cancelled before commit")]
    Cancelled,

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),
}

impl IngestError {
    /// 에러의 실패 분류를 반환합니다.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::AcceptancePolicy(_) | Self::DocumentTooLarge { .. } => {
                FailureKind::AcceptancePolicy
            }
            Self::Parse { .. } => FailureKind::Parse,
            Self::Reconciliation { .. } => FailureKind::Reconciliation,
            Self::Persistence { .. } => FailureKind::Persistence,
            Self::Publish { .. } => FailureKind::Publish,
            Self::Serialization(_) => FailureKind::Serialization,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Config { .. } | Self::Channel(_) => FailureKind::Internal,
        }
    }

    /// 소속 컴포넌트 내부에서 재시도할 수 있는 에러인지 확인합니다.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Persistence { transient, .. } => *transient,
            Self::Publish { .. } => true,
            _ => false,
        }
    }

    /// 파싱 에러를 생성합니다.
    pub fn parse(format: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            format: format.into(),
            reason: reason.into(),
        }
    }

    /// 일시적이지 않은 저장소 에러를 생성합니다.
    pub fn persistence(project: impl ToString, reason: impl Into<String>) -> Self {
        Self::Persistence {
            project: project.to_string(),
            reason: reason.into(),
            transient: false,
        }
    }
}

impl From<IngestError> for BomgateError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Config { field, reason } => {
                BomgateError::Config(ConfigError::InvalidValue { field, reason })
            }
            IngestError::Channel(msg) => BomgateError::Pipeline(PipelineError::ChannelSend(msg)),
            other => BomgateError::Ingest(IngestFailure::new(
                other.kind().as_str(),
                other.to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reconciliation_error_lists_identities() {
        let err = IngestError::Reconciliation {
            reason: "unknown bom-ref".to_owned(),
            identities: vec!["pkg:npm/a@1".to_owned(), "ghost".to_owned()],
        };
        let msg = err.to_string();
        assert!(msg.contains("unknown bom-ref"));
        assert!(msg.contains("pkg:npm/a@1, ghost"));
    }

    #[test]
    fn document_too_large_is_acceptance_policy() {
        let err = IngestError::DocumentTooLarge {
            size: 2_000,
            max: 1_000,
        };
        assert_eq!(err.kind(), FailureKind::AcceptancePolicy);
        assert!(err.to_string().contains("2000"));
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_classification() {
        let transient = IngestError::Persistence {
            project: "p".to_owned(),
            reason: "deadlock".to_owned(),
            transient: true,
        };
        assert!(transient.is_transient());
        assert!(!IngestError::persistence("p", "constraint").is_transient());
        assert!(
            IngestError::Publish {
                topic: "BOM_CONSUMED".to_owned(),
                reason: "timeout".to_owned(),
            }
            .is_transient()
        );
        assert!(!IngestError::parse("cyclonedx-json", "eof").is_transient());
        assert!(!IngestError::Serialization("bad".to_owned()).is_transient());
    }

    #[test]
    fn kind_covers_all_variants() {
        assert_eq!(
            IngestError::AcceptancePolicy("x".to_owned()).kind(),
            FailureKind::AcceptancePolicy
        );
        assert_eq!(IngestError::parse("f", "r").kind(), FailureKind::Parse);
        assert_eq!(IngestError::Cancelled.kind(), FailureKind::Cancelled);
        assert_eq!(
            IngestError::Channel("closed".to_owned()).kind(),
            FailureKind::Internal
        );
    }

    #[test]
    fn failure_kind_serializes_as_snake_case() {
        let json = serde_json::to_string(&FailureKind::AcceptancePolicy).unwrap();
        assert_eq!(json, "\"acceptance_policy\"");
        assert_eq!(FailureKind::Persistence.to_string(), "persistence");
    }

    #[test]
    fn converts_to_bomgate_error_ingest() {
        let err: BomgateError = IngestError::parse("cyclonedx-json", "eof").into();
        match err {
            BomgateError::Ingest(failure) => {
                assert_eq!(failure.kind, "parse");
                assert!(failure.message.contains("eof"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn converts_to_bomgate_error_config() {
        let err: BomgateError = IngestError::Config {
            field: "workers".to_owned(),
            reason: "must be > 0".to_owned(),
        }
        .into();
        assert!(matches!(
            err,
            BomgateError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn converts_to_bomgate_error_channel() {
        let err: BomgateError = IngestError::Channel("closed".to_owned()).into();
        assert!(matches!(
            err,
            BomgateError::Pipeline(PipelineError::ChannelSend(_))
        ));
    }
}
