//! 에러 타입: 도메인별 에러 정의

/// bomgate 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum BomgateError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파이프라인 생명주기 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// BOM 수집 처리 에러
    #[error("ingest error: {0}")]
    Ingest(#[from] IngestFailure),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파이프라인 생명주기 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 파이프라인 초기화 실패
    #[error("pipeline init failed: {0}")]
    InitFailed(String),

    /// 이미 실행 중
    #[error("pipeline already running")]
    AlreadyRunning,

    /// 실행 중이 아님
    #[error("pipeline not running")]
    NotRunning,
}

/// 수집 처리 에러: 하위 크레이트 에러의 크레이트 경계 표현
///
/// `bomgate-ingest`의 세부 에러 타입은 core에 의존성을 만들지 않도록
/// 분류(kind)와 메시지만 남겨 이 타입으로 변환됩니다.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct IngestFailure {
    /// 에러 분류 (acceptance_policy, parse, persistence 등)
    pub kind: String,
    /// 상세 메시지
    pub message: String,
}

impl IngestFailure {
    /// 분류와 메시지로 에러를 생성합니다.
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_to_top_level() {
        let err: BomgateError = ConfigError::FileNotFound {
            path: "bomgate.toml".to_owned(),
        }
        .into();
        assert!(matches!(err, BomgateError::Config(_)));
        assert!(err.to_string().contains("bomgate.toml"));
    }

    #[test]
    fn pipeline_error_display() {
        let err: BomgateError = PipelineError::AlreadyRunning.into();
        assert_eq!(err.to_string(), "pipeline error: pipeline already running");
    }

    #[test]
    fn ingest_failure_display_includes_kind() {
        let err = IngestFailure::new("parse", "unexpected end of input");
        assert_eq!(err.to_string(), "parse: unexpected end of input");
    }
}
