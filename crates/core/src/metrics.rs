//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`,
//! `metrics::histogram!()` 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `snortmon_`
//! - 모듈명: `ingest_`, `query_`, `rules_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (histogram/latency), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(snortmon_core::metrics::INGEST_EVENTS_STORED_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 거부 사유 레이블 키 (malformed, incomplete, invalid_field, unknown_rule)
pub const LABEL_KIND: &str = "kind";

/// HTTP 엔드포인트 레이블 키 (events, events_count, rules, rules_update)
pub const LABEL_ENDPOINT: &str = "endpoint";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Ingest 메트릭 ──────────────────────────────────────────────────

/// Ingest: 읽은 완전한 라인 수 (counter)
pub const INGEST_LINES_READ_TOTAL: &str = "snortmon_ingest_lines_read_total";

/// Ingest: 저장된 이벤트 수 (counter)
pub const INGEST_EVENTS_STORED_TOTAL: &str = "snortmon_ingest_events_stored_total";

/// Ingest: 거부된 라인 수 (counter, label: kind)
pub const INGEST_LINES_REJECTED_TOTAL: &str = "snortmon_ingest_lines_rejected_total";

/// Ingest: 중단된 사이클 수 (counter)
pub const INGEST_CYCLE_ERRORS_TOTAL: &str = "snortmon_ingest_cycle_errors_total";

/// Ingest: 사이클 소요 시간 (histogram, 초)
pub const INGEST_CYCLE_DURATION_SECONDS: &str = "snortmon_ingest_cycle_duration_seconds";

/// Ingest: 현재 커서 오프셋 (gauge, 바이트)
pub const INGEST_CURSOR_OFFSET_BYTES: &str = "snortmon_ingest_cursor_offset_bytes";

// ─── Query 메트릭 ───────────────────────────────────────────────────

/// Query: 처리된 요청 수 (counter, labels: endpoint, result)
pub const QUERY_REQUESTS_TOTAL: &str = "snortmon_query_requests_total";

/// Query: 파라미터 검증 실패 수 (counter, label: endpoint)
pub const QUERY_VALIDATION_ERRORS_TOTAL: &str = "snortmon_query_validation_errors_total";

/// Query: 소프트 삭제된 이벤트 수 (counter)
pub const QUERY_EVENTS_MARKED_DELETED_TOTAL: &str = "snortmon_query_events_marked_deleted_total";

// ─── Rules 메트릭 ───────────────────────────────────────────────────

/// Rules: 규칙 갱신 실행 수 (counter, label: result)
pub const RULES_REFRESH_TOTAL: &str = "snortmon_rules_refresh_total";

/// Rules: 새로 추가된 규칙 수 (counter)
pub const RULES_ADDED_TOTAL: &str = "snortmon_rules_added_total";

// ─── Daemon 메트릭 ──────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "snortmon_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, label: version)
pub const DAEMON_BUILD_INFO: &str = "snortmon_daemon_build_info";

// ─── 히스토그램 버킷 정의 ────────────────────────────────────────────

/// 수집 사이클 소요 시간 히스토그램 버킷 (초)
///
/// 1ms ~ 30s 범위 (대량 백로그 처리 포함)
pub const CYCLE_DURATION_BUCKETS: [f64; 9] = [0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 30.0];

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `snortmon-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge, describe_histogram};

    // Ingest
    describe_counter!(
        INGEST_LINES_READ_TOTAL,
        "Total complete lines read from the alert file"
    );
    describe_counter!(
        INGEST_EVENTS_STORED_TOTAL,
        "Total alert records persisted to the event store"
    );
    describe_counter!(
        INGEST_LINES_REJECTED_TOTAL,
        "Total lines rejected by the record parser"
    );
    describe_counter!(
        INGEST_CYCLE_ERRORS_TOTAL,
        "Total ingestion cycles aborted by an operational error"
    );
    describe_histogram!(
        INGEST_CYCLE_DURATION_SECONDS,
        "Ingestion cycle duration in seconds"
    );
    describe_gauge!(
        INGEST_CURSOR_OFFSET_BYTES,
        "Current byte offset of the alert file cursor"
    );

    // Query
    describe_counter!(QUERY_REQUESTS_TOTAL, "Total query API requests handled");
    describe_counter!(
        QUERY_VALIDATION_ERRORS_TOTAL,
        "Total query API requests rejected by parameter validation"
    );
    describe_counter!(
        QUERY_EVENTS_MARKED_DELETED_TOTAL,
        "Total events marked as deleted through the API"
    );

    // Rules
    describe_counter!(RULES_REFRESH_TOTAL, "Total rule-set refresh runs");
    describe_counter!(RULES_ADDED_TOTAL, "Total rules added to the catalog");

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "snortmon daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        INGEST_LINES_READ_TOTAL,
        INGEST_EVENTS_STORED_TOTAL,
        INGEST_LINES_REJECTED_TOTAL,
        INGEST_CYCLE_ERRORS_TOTAL,
        INGEST_CYCLE_DURATION_SECONDS,
        INGEST_CURSOR_OFFSET_BYTES,
        QUERY_REQUESTS_TOTAL,
        QUERY_VALIDATION_ERRORS_TOTAL,
        QUERY_EVENTS_MARKED_DELETED_TOTAL,
        RULES_REFRESH_TOTAL,
        RULES_ADDED_TOTAL,
        DAEMON_UPTIME_SECONDS,
        DAEMON_BUILD_INFO,
    ];

    #[test]
    fn all_metrics_start_with_snortmon_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("snortmon_"),
                "Metric '{}' does not start with 'snortmon_' prefix",
                name
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn describe_all_does_not_panic() {
        // 레코더가 없어도 panic하지 않아야 함
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        for label in [LABEL_KIND, LABEL_ENDPOINT, LABEL_RESULT] {
            assert_eq!(label.to_lowercase(), label);
        }
    }

    #[test]
    fn cycle_duration_buckets_are_sorted() {
        let buckets = CYCLE_DURATION_BUCKETS;
        for i in 1..buckets.len() {
            assert!(buckets[i] > buckets[i - 1]);
        }
    }
}
