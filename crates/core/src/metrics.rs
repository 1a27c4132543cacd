//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 스캐너와 데몬은 이 상수로 `metrics::counter!()`, `metrics::gauge!()`를 호출합니다.
//! 레코더가 설치되지 않은 상태(테스트 등)에서는 기록이 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `rattle_`
//! - 영역: `scanner_`, `cache_`, `notifications_`, `daemon_`
//! - 접미어: `_total` (counter), `_seconds` (gauge/latency), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 이벤트 타입 레이블 키 (error, warning, ...)
pub const LABEL_EVENT_TYPE: &str = "event_type";

/// 캐시 리소스 레이블 키 (targets, container_rules, pattern_rules, filter_mode)
pub const LABEL_RESOURCE: &str = "resource";

/// 알림 종류 레이블 키
pub const LABEL_KIND: &str = "kind";

// ─── Scanner 메트릭 ─────────────────────────────────────────────────

/// Scanner: 현재 추적 중인 컨테이너 스캐너 수 (gauge)
pub const SCANNER_ACTIVE: &str = "rattle_scanner_active";

/// Scanner: 읽은 로그 라인 수 (counter)
pub const SCANNER_LINES_TOTAL: &str = "rattle_scanner_lines_total";

/// Scanner: 분류된 이벤트 수 (counter, label: event_type)
pub const SCANNER_EVENTS_TOTAL: &str = "rattle_scanner_events_total";

/// Scanner: 로그 스트림 재연결 수 (counter)
pub const SCANNER_RECONNECTS_TOTAL: &str = "rattle_scanner_reconnects_total";

/// Scanner: 재시도 한도 초과로 종료된 스캐너 수 (counter)
pub const SCANNER_FAILURES_TOTAL: &str = "rattle_scanner_failures_total";

// ─── Cache 메트릭 ──────────────────────────────────────────────────

/// Cache: 성공한 리로드 수 (counter, label: resource)
pub const CACHE_RELOADS_TOTAL: &str = "rattle_cache_reloads_total";

/// Cache: 실패한 리로드 수 (counter, label: resource)
pub const CACHE_RELOAD_FAILURES_TOTAL: &str = "rattle_cache_reload_failures_total";

// ─── Notification 메트릭 ───────────────────────────────────────────

/// Notifications: 전송된 알림 수 (counter, label: kind)
pub const NOTIFICATIONS_SENT_TOTAL: &str = "rattle_notifications_sent_total";

/// Notifications: 채널 포화/전송 실패로 버려진 알림 수 (counter, label: kind)
pub const NOTIFICATIONS_DROPPED_TOTAL: &str = "rattle_notifications_dropped_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "rattle_daemon_uptime_seconds";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번 호출합니다. 일반적으로 `rattle-daemon` 시작 시점입니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Scanner
    describe_gauge!(
        SCANNER_ACTIVE,
        "Number of containers with an active log scanner"
    );
    describe_counter!(
        SCANNER_LINES_TOTAL,
        "Total number of non-empty log lines read from containers"
    );
    describe_counter!(
        SCANNER_EVENTS_TOTAL,
        "Total number of log lines classified as an event"
    );
    describe_counter!(
        SCANNER_RECONNECTS_TOTAL,
        "Total number of log stream reconnect attempts"
    );
    describe_counter!(
        SCANNER_FAILURES_TOTAL,
        "Total number of scanners stopped after exhausting retries"
    );

    // Cache
    describe_counter!(
        CACHE_RELOADS_TOTAL,
        "Total number of successful configuration cache reloads"
    );
    describe_counter!(
        CACHE_RELOAD_FAILURES_TOTAL,
        "Total number of failed configuration cache reloads"
    );

    // Notifications
    describe_counter!(
        NOTIFICATIONS_SENT_TOTAL,
        "Total number of notifications delivered"
    );
    describe_counter!(
        NOTIFICATIONS_DROPPED_TOTAL,
        "Total number of notifications dropped before delivery"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "rattle daemon uptime in seconds");
}
