//! 이벤트 시스템: 수집 결과를 하위 소비자에게 전달하는 기본 단위
//!
//! 모든 후속 분석(취약점, 저장소 메타데이터, 알림)은 이벤트 버스를 통해서만
//! 수집 파이프라인과 통신합니다.
//! [`EventMetadata`]는 모든 이벤트에 공통으로 포함되는 메타데이터이며,
//! [`Event`] trait은 모든 이벤트 타입이 구현해야 하는 인터페이스입니다.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

// --- 모듈명 상수 ---

/// BOM 수집 모듈명
pub const MODULE_BOM_INGEST: &str = "bom-ingest";

// --- 이벤트 타입(토픽) 상수 ---
//
// 버스 경계에서 사용하는 안정적인 토픽 이름입니다. 변경하면 외부 소비자가 깨집니다.

/// 업로드로 프로젝트가 새로 생성됨
pub const EVENT_TYPE_PROJECT_CREATED: &str = "PROJECT_CREATED";
/// 문서 파싱 및 수락 완료
pub const EVENT_TYPE_BOM_CONSUMED: &str = "BOM_CONSUMED";
/// 컴포넌트 저장소 메타데이터 분석 요청
pub const EVENT_TYPE_REPO_META_ANALYSIS: &str = "REPO_META_ANALYSIS_COMPONENT";
/// 컴포넌트 취약점 분석 요청
pub const EVENT_TYPE_VULN_ANALYSIS: &str = "VULN_ANALYSIS_COMPONENT";
/// 커밋 후 처리 완료 (종료 이벤트)
pub const EVENT_TYPE_BOM_PROCESSED: &str = "BOM_PROCESSED";
/// 처리 실패 (종료 이벤트)
pub const EVENT_TYPE_BOM_PROCESSING_FAILED: &str = "BOM_PROCESSING_FAILED";

/// 이벤트 메타데이터: 모든 이벤트에 공통으로 포함되는 추적 정보
///
/// 같은 업로드에서 발생한 이벤트는 모두 같은 `trace_id`를 공유합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMetadata {
    /// 이벤트 발생 시각
    pub timestamp: SystemTime,
    /// 이벤트를 생성한 모듈명 (예: "bom-ingest")
    pub source_module: String,
    /// 분산 추적 ID: 같은 업로드의 이벤트를 연결합니다
    pub trace_id: String,
}

impl EventMetadata {
    /// 기존 trace_id를 사용하여 새 메타데이터를 생성합니다.
    pub fn new(source_module: impl Into<String>, trace_id: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: trace_id.into(),
        }
    }

    /// 새로운 UUID v4 trace_id를 생성하여 메타데이터를 만듭니다.
    ///
    /// 업로드 처리의 시작점에서 사용합니다.
    pub fn with_new_trace(source_module: impl Into<String>) -> Self {
        Self {
            timestamp: SystemTime::now(),
            source_module: source_module.into(),
            trace_id: uuid::Uuid::new_v4().to_string(),
        }
    }
}

impl fmt::Display for EventMetadata {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] source={} trace={}",
            unix_timestamp_str(self.timestamp),
            self.source_module,
            self.trace_id,
        )
    }
}

/// 모든 이벤트가 구현해야 하는 기본 trait
///
/// `Send + Sync + 'static` 바운드로 `tokio::mpsc` 채널을 통한
/// 안전한 전송을 보장합니다.
pub trait Event: Send + Sync + 'static {
    /// 이벤트 고유 ID (UUID v4)
    fn event_id(&self) -> &str;

    /// 이벤트 메타데이터 (timestamp, source_module, trace_id)
    fn metadata(&self) -> &EventMetadata;

    /// 이벤트 타입명 (토픽 이름, 로깅 및 라우팅에 사용)
    fn event_type(&self) -> &str;
}

/// SystemTime을 Unix epoch 초 문자열로 변환합니다.
pub fn unix_timestamp_str(time: SystemTime) -> String {
    match time.duration_since(SystemTime::UNIX_EPOCH) {
        Ok(duration) => duration.as_secs().to_string(),
        Err(_) => "unknown".to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn with_new_trace_generates_unique_ids() {
        let a = EventMetadata::with_new_trace(MODULE_BOM_INGEST);
        let b = EventMetadata::with_new_trace(MODULE_BOM_INGEST);
        assert_ne!(a.trace_id, b.trace_id);
        assert_eq!(a.source_module, "bom-ingest");
    }

    #[test]
    fn new_keeps_given_trace_id() {
        let meta = EventMetadata::new(MODULE_BOM_INGEST, "trace-1");
        assert_eq!(meta.trace_id, "trace-1");
    }

    #[test]
    fn display_contains_source_and_trace() {
        let meta = EventMetadata::new(MODULE_BOM_INGEST, "abc");
        let s = meta.to_string();
        assert!(s.contains("source=bom-ingest"));
        assert!(s.contains("trace=abc"));
    }

    #[test]
    fn unix_timestamp_before_epoch_is_unknown() {
        let before = SystemTime::UNIX_EPOCH - Duration::from_secs(1);
        assert_eq!(unix_timestamp_str(before), "unknown");
        assert_eq!(
            unix_timestamp_str(SystemTime::UNIX_EPOCH + Duration::from_secs(42)),
            "42"
        );
    }

    #[test]
    fn metadata_serde_preserves_fields() {
        let meta = EventMetadata::new(MODULE_BOM_INGEST, "t");
        let json = serde_json::to_string(&meta).unwrap();
        let back: EventMetadata = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
