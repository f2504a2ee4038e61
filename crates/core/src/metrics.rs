//! 메트릭 상수 및 설명 등록
//!
//! 모든 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `bomgate_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(bomgate_core::metrics::INGEST_UPLOADS_TOTAL, "result" => "processed").increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 결과 레이블 키 (processed, failed)
pub const LABEL_RESULT: &str = "result";

/// 토픽 레이블 키
pub const LABEL_TOPIC: &str = "topic";

/// 실패 분류 레이블 키 (parse, persistence 등)
pub const LABEL_KIND: &str = "kind";

// ─── Ingest 메트릭 ─────────────────────────────────────────────────

/// 처리된 업로드 수 (counter, labels: result, kind)
pub const INGEST_UPLOADS_TOTAL: &str = "bomgate_ingest_uploads_total";

/// 업로드 처리 소요 시간 (histogram, 초)
pub const INGEST_UPLOAD_DURATION_SECONDS: &str = "bomgate_ingest_upload_duration_seconds";

/// 생성된 컴포넌트 수 (counter)
pub const INGEST_COMPONENTS_CREATED_TOTAL: &str = "bomgate_ingest_components_created_total";

/// 갱신된 컴포넌트 수 (counter)
pub const INGEST_COMPONENTS_UPDATED_TOTAL: &str = "bomgate_ingest_components_updated_total";

/// 제거된 컴포넌트 수 (counter)
pub const INGEST_COMPONENTS_REMOVED_TOTAL: &str = "bomgate_ingest_components_removed_total";

// ─── Store 메트릭 ──────────────────────────────────────────────────

/// 커밋 재시도 수 (counter)
pub const STORE_COMMIT_RETRIES_TOTAL: &str = "bomgate_store_commit_retries_total";

/// 커밋 소요 시간 (histogram, 초)
pub const STORE_COMMIT_DURATION_SECONDS: &str = "bomgate_store_commit_duration_seconds";

// ─── Dispatch 메트릭 ───────────────────────────────────────────────

/// 발행된 이벤트 수 (counter, label: topic)
pub const DISPATCH_EVENTS_PUBLISHED_TOTAL: &str = "bomgate_dispatch_events_published_total";

/// 발행 재시도 수 (counter, label: topic)
pub const DISPATCH_PUBLISH_RETRIES_TOTAL: &str = "bomgate_dispatch_publish_retries_total";

/// 소비 측 poison 메시지 수 (counter, label: topic)
pub const DISPATCH_POISON_MESSAGES_TOTAL: &str = "bomgate_dispatch_poison_messages_total";

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 시작 시 한 번 호출합니다. 전역 레코더가 없으면 아무 일도 하지 않습니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_histogram};

    // Ingest
    describe_counter!(
        INGEST_UPLOADS_TOTAL,
        "Total number of BOM uploads by final outcome"
    );
    describe_histogram!(
        INGEST_UPLOAD_DURATION_SECONDS,
        "Time to process a single BOM upload in seconds"
    );
    describe_counter!(
        INGEST_COMPONENTS_CREATED_TOTAL,
        "Total number of components created by reconciliation"
    );
    describe_counter!(
        INGEST_COMPONENTS_UPDATED_TOTAL,
        "Total number of components updated by reconciliation"
    );
    describe_counter!(
        INGEST_COMPONENTS_REMOVED_TOTAL,
        "Total number of components removed by reconciliation"
    );

    // Store
    describe_counter!(
        STORE_COMMIT_RETRIES_TOTAL,
        "Total number of retried commits after transient persistence failures"
    );
    describe_histogram!(
        STORE_COMMIT_DURATION_SECONDS,
        "Time to commit a reconciliation result in seconds"
    );

    // Dispatch
    describe_counter!(
        DISPATCH_EVENTS_PUBLISHED_TOTAL,
        "Total number of events acknowledged by the bus"
    );
    describe_counter!(
        DISPATCH_PUBLISH_RETRIES_TOTAL,
        "Total number of retried publish attempts"
    );
    describe_counter!(
        DISPATCH_POISON_MESSAGES_TOTAL,
        "Total number of bus records that failed to decode on the consumer side"
    );
}
