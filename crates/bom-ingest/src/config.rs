//! 수집 모듈 설정
//!
//! [`IngestConfig`]는 core의 [`BomgateConfig`](bomgate_core::config::BomgateConfig)에서
//! `[ingest]`, `[dispatch]`, `[store]` 섹션을 모아 타입이 있는 값으로 변환합니다.
//!
//! # 사용 예시
//!
//! ```
//! use bomgate_ingest::{IngestConfig, IngestConfigBuilder, MergePolicy};
//!
//! let config = IngestConfig::default();
//! config.validate().unwrap();
//!
//! let config = IngestConfigBuilder::new()
//!     .workers(2)
//!     .merge_policy(MergePolicy::NonNull)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.workers, 2);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use bomgate_core::config::BomgateConfig;

use crate::dispatch::DispatchSettings;
use crate::error::IngestError;
use crate::model::BomFormat;
use crate::reconcile::MergePolicy;

/// 설정 상한값 상수
const MAX_DOCUMENT_SIZE: usize = 512 * 1024 * 1024; // 512 MB
const MAX_PARSE_TIMEOUT_MS: u64 = 600_000; // 10 minutes
const MAX_WORKERS: usize = 256;
const MAX_QUEUE_CAPACITY: usize = 65_536;
const MAX_RETRIES: u32 = 20;

/// 수집 모듈 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestConfig {
    /// 수락하는 BOM 형식
    pub accepted_formats: Vec<BomFormat>,
    /// 문서 최대 크기 (바이트)
    pub max_document_size: usize,
    /// 파싱 타임아웃 (밀리초)
    pub parse_timeout_ms: u64,
    /// 워커 task 수
    pub workers: usize,
    /// 업로드 대기열 용량
    pub queue_capacity: usize,
    /// 컴포넌트 병합 정책
    pub merge_policy: MergePolicy,

    // --- 이벤트 발행 ---
    /// 발행 시도당 타임아웃 (밀리초)
    pub publish_timeout_ms: u64,
    /// 이벤트당 재시도 횟수
    pub publish_max_retries: u32,
    /// 발행 재시도 백오프 기본 간격 (밀리초)
    pub publish_backoff_base_ms: u64,

    // --- 저장소 ---
    /// 커밋 재시도 횟수
    pub commit_max_retries: u32,
    /// 커밋 재시도 백오프 기본 간격 (밀리초)
    pub commit_backoff_base_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            accepted_formats: vec![BomFormat::CycloneDxJson],
            max_document_size: 50 * 1024 * 1024, // 50 MB
            parse_timeout_ms: 30_000,
            workers: 4,
            queue_capacity: 64,
            merge_policy: MergePolicy::Overwrite,
            publish_timeout_ms: 5_000,
            publish_max_retries: 3,
            publish_backoff_base_ms: 200,
            commit_max_retries: 3,
            commit_backoff_base_ms: 100,
        }
    }
}

impl IngestConfig {
    /// core 설정에서 수집 설정을 생성합니다.
    ///
    /// 알 수 없는 형식 이름은 건너뛰고, 알 수 없는 병합 정책은 `overwrite`로 대체합니다.
    pub fn from_core(core: &BomgateConfig) -> Self {
        Self {
            accepted_formats: core
                .ingest
                .accepted_formats
                .iter()
                .filter_map(|f| BomFormat::from_str_loose(f))
                .collect(),
            max_document_size: core.ingest.max_document_size,
            parse_timeout_ms: core.ingest.parse_timeout_ms,
            workers: core.ingest.workers,
            queue_capacity: core.ingest.queue_capacity,
            merge_policy: MergePolicy::from_str_loose(&core.ingest.merge_policy)
                .unwrap_or_default(),
            publish_timeout_ms: core.dispatch.publish_timeout_ms,
            publish_max_retries: core.dispatch.max_retries,
            publish_backoff_base_ms: core.dispatch.retry_backoff_base_ms,
            commit_max_retries: core.store.commit_max_retries,
            commit_backoff_base_ms: core.store.commit_backoff_base_ms,
        }
    }

    /// 형식이 수락 목록에 있는지 확인합니다.
    pub fn accepts(&self, format: BomFormat) -> bool {
        self.accepted_formats.contains(&format)
    }

    /// 파싱 타임아웃
    pub fn parse_timeout(&self) -> Duration {
        Duration::from_millis(self.parse_timeout_ms)
    }

    /// 커밋 재시도 백오프 기본 간격
    pub fn commit_backoff_base(&self) -> Duration {
        Duration::from_millis(self.commit_backoff_base_ms)
    }

    /// 디스패처 설정
    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            publish_timeout: Duration::from_millis(self.publish_timeout_ms),
            max_retries: self.publish_max_retries,
            retry_backoff_base: Duration::from_millis(self.publish_backoff_base_ms),
        }
    }

    /// 설정 값의 유효성을 검증합니다.
    ///
    /// # 검증 규칙
    ///
    /// - `accepted_formats`: 하나 이상
    /// - `max_document_size`: 1-536870912 (512MB)
    /// - `parse_timeout_ms`: 1-600000
    /// - `workers`: 1-256
    /// - `queue_capacity`: 1-65536
    /// - `publish_timeout_ms`: 0이 아니어야 함
    /// - 재시도 횟수: 0-20
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.accepted_formats.is_empty() {
            return Err(config_error(
                "accepted_formats",
                "at least one format must be accepted",
            ));
        }

        if self.max_document_size == 0 || self.max_document_size > MAX_DOCUMENT_SIZE {
            return Err(config_error(
                "max_document_size",
                format!("must be 1-{MAX_DOCUMENT_SIZE}"),
            ));
        }

        if self.parse_timeout_ms == 0 || self.parse_timeout_ms > MAX_PARSE_TIMEOUT_MS {
            return Err(config_error(
                "parse_timeout_ms",
                format!("must be 1-{MAX_PARSE_TIMEOUT_MS}"),
            ));
        }

        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(config_error("workers", format!("must be 1-{MAX_WORKERS}")));
        }

        if self.queue_capacity == 0 || self.queue_capacity > MAX_QUEUE_CAPACITY {
            return Err(config_error(
                "queue_capacity",
                format!("must be 1-{MAX_QUEUE_CAPACITY}"),
            ));
        }

        if self.publish_timeout_ms == 0 {
            return Err(config_error("publish_timeout_ms", "must be greater than 0"));
        }

        if self.publish_max_retries > MAX_RETRIES {
            return Err(config_error(
                "publish_max_retries",
                format!("must be 0-{MAX_RETRIES}"),
            ));
        }

        if self.commit_max_retries > MAX_RETRIES {
            return Err(config_error(
                "commit_max_retries",
                format!("must be 0-{MAX_RETRIES}"),
            ));
        }

        Ok(())
    }
}

fn config_error(field: &str, reason: impl Into<String>) -> IngestError {
    IngestError::Config {
        field: field.to_owned(),
        reason: reason.into(),
    }
}

/// [`IngestConfig`] 빌더
///
/// 빌드 시 유효성 검증을 수행합니다.
#[derive(Default)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    /// 기본값을 가진 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 수락 형식 목록을 설정합니다.
    pub fn accepted_formats(mut self, formats: Vec<BomFormat>) -> Self {
        self.config.accepted_formats = formats;
        self
    }

    /// 문서 최대 크기(바이트)를 설정합니다.
    pub fn max_document_size(mut self, size: usize) -> Self {
        self.config.max_document_size = size;
        self
    }

    /// 파싱 타임아웃(밀리초)을 설정합니다.
    pub fn parse_timeout_ms(mut self, ms: u64) -> Self {
        self.config.parse_timeout_ms = ms;
        self
    }

    /// 워커 수를 설정합니다.
    pub fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// 대기열 용량을 설정합니다.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.config.queue_capacity = capacity;
        self
    }

    /// 병합 정책을 설정합니다.
    pub fn merge_policy(mut self, policy: MergePolicy) -> Self {
        self.config.merge_policy = policy;
        self
    }

    /// 발행 시도당 타임아웃(밀리초)을 설정합니다.
    pub fn publish_timeout_ms(mut self, ms: u64) -> Self {
        self.config.publish_timeout_ms = ms;
        self
    }

    /// 발행 재시도 횟수와 백오프를 설정합니다.
    pub fn publish_retries(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.config.publish_max_retries = max_retries;
        self.config.publish_backoff_base_ms = backoff_base_ms;
        self
    }

    /// 커밋 재시도 횟수와 백오프를 설정합니다.
    pub fn commit_retries(mut self, max_retries: u32, backoff_base_ms: u64) -> Self {
        self.config.commit_max_retries = max_retries;
        self.config.commit_backoff_base_ms = backoff_base_ms;
        self
    }

    /// 설정을 검증하고 빌드합니다.
    ///
    /// # Errors
    ///
    /// 유효성 검증 실패 시 `IngestError::Config` 반환
    pub fn build(self) -> Result<IngestConfig, IngestError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        IngestConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_preserves_values() {
        let mut core = BomgateConfig::default();
        core.ingest.accepted_formats = vec!["cyclonedx-json".to_owned(), "spdx-json".to_owned()];
        core.ingest.workers = 8;
        core.ingest.merge_policy = "non_null".to_owned();
        core.dispatch.max_retries = 5;
        core.store.commit_backoff_base_ms = 50;

        let config = IngestConfig::from_core(&core);
        assert_eq!(
            config.accepted_formats,
            vec![BomFormat::CycloneDxJson, BomFormat::SpdxJson]
        );
        assert_eq!(config.workers, 8);
        assert_eq!(config.merge_policy, MergePolicy::NonNull);
        assert_eq!(config.publish_max_retries, 5);
        assert_eq!(config.commit_backoff_base(), Duration::from_millis(50));
        assert!(config.accepts(BomFormat::SpdxJson));
        assert!(!config.accepts(BomFormat::CycloneDxXml));
    }

    #[test]
    fn from_core_with_unknown_policy_falls_back() {
        let mut core = BomgateConfig::default();
        core.ingest.merge_policy = "append".to_owned();
        let config = IngestConfig::from_core(&core);
        assert_eq!(config.merge_policy, MergePolicy::Overwrite);
    }

    #[test]
    fn dispatch_settings_use_milliseconds() {
        let config = IngestConfigBuilder::new()
            .publish_timeout_ms(250)
            .publish_retries(2, 10)
            .build()
            .unwrap();
        let settings = config.dispatch_settings();
        assert_eq!(settings.publish_timeout, Duration::from_millis(250));
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.retry_backoff_base, Duration::from_millis(10));
    }

    #[test]
    fn validate_rejects_empty_formats() {
        let err = IngestConfigBuilder::new()
            .accepted_formats(Vec::new())
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("accepted_formats"));
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let config = IngestConfig {
            workers: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_too_large_document_size() {
        let config = IngestConfig {
            max_document_size: MAX_DOCUMENT_SIZE + 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_parse_timeout() {
        let config = IngestConfig {
            parse_timeout_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_excessive_retries() {
        assert!(
            IngestConfigBuilder::new()
                .commit_retries(21, 100)
                .build()
                .is_err()
        );
        assert!(
            IngestConfigBuilder::new()
                .publish_retries(21, 100)
                .build()
                .is_err()
        );
    }
}
