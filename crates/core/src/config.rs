//! 설정 관리: bomgate.toml 파싱 및 런타임 설정
//!
//! [`BomgateConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`BOMGATE_INGEST_WORKERS=8` 형식)
//! 3. 설정 파일 (`bomgate.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), bomgate_core::error::BomgateError> {
//! use bomgate_core::config::BomgateConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = BomgateConfig::load("bomgate.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = BomgateConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BomgateError, ConfigError};

/// 알려진 BOM 형식 이름
pub const KNOWN_BOM_FORMATS: [&str; 3] = ["cyclonedx-json", "cyclonedx-xml", "spdx-json"];

/// bomgate 통합 설정
///
/// `bomgate.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BomgateConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 수집(ingest) 설정
    #[serde(default)]
    pub ingest: IngestSection,
    /// 이벤트 발행 설정
    #[serde(default)]
    pub dispatch: DispatchSection,
    /// 저장소 트랜잭션 설정
    #[serde(default)]
    pub store: StoreSection,
}

impl BomgateConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BomgateError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BomgateError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BomgateError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                BomgateError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, BomgateError> {
        toml::from_str(toml_str).map_err(|e| {
            BomgateError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `BOMGATE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "BOMGATE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "BOMGATE_GENERAL_LOG_FORMAT");

        // Ingest
        override_csv(
            &mut self.ingest.accepted_formats,
            "BOMGATE_INGEST_ACCEPTED_FORMATS",
        );
        override_usize(
            &mut self.ingest.max_document_size,
            "BOMGATE_INGEST_MAX_DOCUMENT_SIZE",
        );
        override_u64(
            &mut self.ingest.parse_timeout_ms,
            "BOMGATE_INGEST_PARSE_TIMEOUT_MS",
        );
        override_usize(&mut self.ingest.workers, "BOMGATE_INGEST_WORKERS");
        override_usize(
            &mut self.ingest.queue_capacity,
            "BOMGATE_INGEST_QUEUE_CAPACITY",
        );
        override_string(&mut self.ingest.merge_policy, "BOMGATE_INGEST_MERGE_POLICY");

        // Dispatch
        override_u64(
            &mut self.dispatch.publish_timeout_ms,
            "BOMGATE_DISPATCH_PUBLISH_TIMEOUT_MS",
        );
        override_u32(&mut self.dispatch.max_retries, "BOMGATE_DISPATCH_MAX_RETRIES");
        override_u64(
            &mut self.dispatch.retry_backoff_base_ms,
            "BOMGATE_DISPATCH_RETRY_BACKOFF_BASE_MS",
        );

        // Store
        override_u32(
            &mut self.store.commit_max_retries,
            "BOMGATE_STORE_COMMIT_MAX_RETRIES",
        );
        override_u64(
            &mut self.store.commit_backoff_base_ms,
            "BOMGATE_STORE_COMMIT_BACKOFF_BASE_MS",
        );
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), BomgateError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(invalid(
                "general.log_level",
                format!("must be one of: {}", valid_levels.join(", ")),
            ));
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(invalid(
                "general.log_format",
                format!("must be one of: {}", valid_formats.join(", ")),
            ));
        }

        for format in &self.ingest.accepted_formats {
            if !KNOWN_BOM_FORMATS.contains(&format.as_str()) {
                return Err(invalid(
                    "ingest.accepted_formats",
                    format!(
                        "unknown format '{format}', expected one of: {}",
                        KNOWN_BOM_FORMATS.join(", ")
                    ),
                ));
            }
        }

        if self.ingest.max_document_size == 0 {
            return Err(invalid("ingest.max_document_size", "must be greater than 0"));
        }

        if self.ingest.parse_timeout_ms == 0 {
            return Err(invalid("ingest.parse_timeout_ms", "must be greater than 0"));
        }

        if self.ingest.workers == 0 || self.ingest.workers > 256 {
            return Err(invalid("ingest.workers", "must be 1-256"));
        }

        if self.ingest.queue_capacity == 0 {
            return Err(invalid("ingest.queue_capacity", "must be greater than 0"));
        }

        let valid_policies = ["overwrite", "non_null"];
        if !valid_policies.contains(&self.ingest.merge_policy.as_str()) {
            return Err(invalid(
                "ingest.merge_policy",
                format!("must be one of: {}", valid_policies.join(", ")),
            ));
        }

        if self.dispatch.publish_timeout_ms == 0 {
            return Err(invalid(
                "dispatch.publish_timeout_ms",
                "must be greater than 0",
            ));
        }

        if self.dispatch.max_retries > 20 {
            return Err(invalid("dispatch.max_retries", "must be 0-20"));
        }

        if self.store.commit_max_retries > 20 {
            return Err(invalid("store.commit_max_retries", "must be 0-20"));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> BomgateError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason: reason.into(),
    }
    .into()
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
        }
    }
}

/// 수집 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSection {
    /// 수락하는 BOM 형식 (cyclonedx-json, cyclonedx-xml, spdx-json)
    pub accepted_formats: Vec<String>,
    /// 문서 최대 크기 (바이트)
    pub max_document_size: usize,
    /// 파싱 타임아웃 (밀리초)
    pub parse_timeout_ms: u64,
    /// 동시 처리 워커 수
    pub workers: usize,
    /// 업로드 대기열 용량
    pub queue_capacity: usize,
    /// 컴포넌트 병합 정책 (overwrite, non_null)
    pub merge_policy: String,
}

impl Default for IngestSection {
    fn default() -> Self {
        Self {
            accepted_formats: vec!["cyclonedx-json".to_owned()],
            max_document_size: 50 * 1024 * 1024, // 50 MB
            parse_timeout_ms: 30_000,
            workers: 4,
            queue_capacity: 64,
            merge_policy: "overwrite".to_owned(),
        }
    }
}

/// 이벤트 발행 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// 이벤트 1건 발행 시도당 타임아웃 (밀리초)
    pub publish_timeout_ms: u64,
    /// 이벤트당 최대 재시도 횟수
    pub max_retries: u32,
    /// 재시도 백오프 기본 간격 (밀리초)
    pub retry_backoff_base_ms: u64,
}

impl Default for DispatchSection {
    fn default() -> Self {
        Self {
            publish_timeout_ms: 5_000,
            max_retries: 3,
            retry_backoff_base_ms: 200,
        }
    }
}

/// 저장소 트랜잭션 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreSection {
    /// 일시적 커밋 실패 시 최대 재시도 횟수
    pub commit_max_retries: u32,
    /// 커밋 재시도 백오프 기본 간격 (밀리초)
    pub commit_backoff_base_ms: u64,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            commit_max_retries: 3,
            commit_backoff_base_ms: 100,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u32(target: &mut u32, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u32>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u32 from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn default_config_has_sane_values() {
        let config = BomgateConfig::default();
        assert_eq!(config.general.log_level, "info");
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.ingest.accepted_formats, vec!["cyclonedx-json"]);
        assert_eq!(config.ingest.merge_policy, "overwrite");
        assert_eq!(config.dispatch.max_retries, 3);
        assert_eq!(config.store.commit_max_retries, 3);
    }

    #[test]
    fn default_config_passes_validation() {
        BomgateConfig::default().validate().unwrap();
    }

    #[test]
    fn parse_empty_toml_uses_defaults() {
        let config = BomgateConfig::parse("").unwrap();
        assert_eq!(config.ingest.workers, 4);
        assert_eq!(config.dispatch.publish_timeout_ms, 5_000);
    }

    #[test]
    fn parse_partial_toml_merges_with_defaults() {
        let toml = r#"
[general]
log_level = "debug"

[ingest]
workers = 8
merge_policy = "non_null"
"#;
        let config = BomgateConfig::parse(toml).unwrap();
        assert_eq!(config.general.log_level, "debug");
        // log_format은 기본값 유지
        assert_eq!(config.general.log_format, "json");
        assert_eq!(config.ingest.workers, 8);
        assert_eq!(config.ingest.merge_policy, "non_null");
        assert_eq!(config.ingest.queue_capacity, 64);
    }

    #[test]
    fn parse_invalid_toml_returns_error() {
        let err = BomgateConfig::parse("invalid = [[[toml").unwrap_err();
        assert!(matches!(
            err,
            BomgateError::Config(ConfigError::ParseFailed { .. })
        ));
    }

    #[test]
    fn validate_rejects_invalid_log_level() {
        let mut config = BomgateConfig::default();
        config.general.log_level = "verbose".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("log_level"));
    }

    #[test]
    fn validate_rejects_unknown_format() {
        let mut config = BomgateConfig::default();
        config.ingest.accepted_formats = vec!["swid-xml".to_owned()];
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("swid-xml"));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = BomgateConfig::default();
        config.ingest.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_merge_policy() {
        let mut config = BomgateConfig::default();
        config.ingest.merge_policy = "append".to_owned();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("merge_policy"));
    }

    #[test]
    fn validate_rejects_excessive_retries() {
        let mut config = BomgateConfig::default();
        config.dispatch.max_retries = 100;
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn env_override_replaces_values() {
        // SAFETY: serial 테스트에서만 환경변수를 변경합니다.
        unsafe {
            std::env::set_var("BOMGATE_INGEST_WORKERS", "16");
            std::env::set_var(
                "BOMGATE_INGEST_ACCEPTED_FORMATS",
                "cyclonedx-json, spdx-json",
            );
        }
        let mut config = BomgateConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("BOMGATE_INGEST_WORKERS");
            std::env::remove_var("BOMGATE_INGEST_ACCEPTED_FORMATS");
        }
        assert_eq!(config.ingest.workers, 16);
        assert_eq!(
            config.ingest.accepted_formats,
            vec!["cyclonedx-json", "spdx-json"]
        );
    }

    #[test]
    #[serial]
    fn env_override_ignores_unparseable_numbers() {
        unsafe {
            std::env::set_var("BOMGATE_DISPATCH_MAX_RETRIES", "many");
        }
        let mut config = BomgateConfig::default();
        config.apply_env_overrides();
        unsafe {
            std::env::remove_var("BOMGATE_DISPATCH_MAX_RETRIES");
        }
        assert_eq!(config.dispatch.max_retries, 3);
    }

    #[tokio::test]
    async fn from_file_missing_returns_not_found() {
        let err = BomgateConfig::from_file("/nonexistent/bomgate.toml")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BomgateError::Config(ConfigError::FileNotFound { .. })
        ));
    }
}
