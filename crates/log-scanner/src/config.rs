//! 로그 스캐너 설정
//!
//! [`ScannerConfig`]는 core의 [`ScanConfig`](rattle_core::config::ScanConfig)와
//! [`WatcherConfig`](rattle_core::config::WatcherConfig)를 기반으로
//! 레지스트리, 스트림 스캐너, 변경 감시기가 사용하는 값을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use rattle_core::config::RattleConfig;
//! use rattle_log_scanner::config::ScannerConfig;
//!
//! let core_config = RattleConfig::default();
//! let config = ScannerConfig::from_core(&core_config.scanner, &core_config.watcher);
//! config.validate()?;
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ScannerError;

/// 로그 스캐너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// 스트림 실패 후 재연결 대기 (밀리초)
    pub reconnect_delay_ms: u64,
    /// 연속 실패 허용 횟수 (0 = 무제한)
    pub max_retries: u32,
    /// 이벤트 스트림 재구독 대기 (밀리초)
    pub event_reconnect_delay_ms: u64,
    /// 한 라인의 최대 바이트 수
    pub max_line_bytes: usize,
    /// 변경 감시 폴링 주기 (밀리초)
    pub watch_interval_ms: u64,
    /// 변경 감시 최초 되돌아보기 (초)
    pub initial_lookback_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: 5_000,
            max_retries: 0,
            event_reconnect_delay_ms: 5_000,
            max_line_bytes: 64 * 1024,
            watch_interval_ms: 15_000,
            initial_lookback_secs: 300,
        }
    }
}

/// 설정 상한값 상수
const MAX_RECONNECT_DELAY_MS: u64 = 600_000;
const MAX_WATCH_INTERVAL_MS: u64 = 3_600_000;
const MIN_LINE_BYTES: usize = 256;
const MAX_LINE_BYTES: usize = 16 * 1024 * 1024;

impl ScannerConfig {
    /// core 설정에서 스캐너 설정을 생성합니다.
    pub fn from_core(
        scan: &rattle_core::config::ScanConfig,
        watcher: &rattle_core::config::WatcherConfig,
    ) -> Self {
        Self {
            reconnect_delay_ms: scan.reconnect_delay_secs.saturating_mul(1000),
            max_retries: scan.max_retries,
            event_reconnect_delay_ms: scan.event_reconnect_delay_secs.saturating_mul(1000),
            max_line_bytes: scan.max_line_bytes,
            watch_interval_ms: watcher.poll_interval_secs.saturating_mul(1000),
            initial_lookback_secs: watcher.initial_lookback_secs,
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ScannerError> {
        if self.reconnect_delay_ms == 0 || self.reconnect_delay_ms > MAX_RECONNECT_DELAY_MS {
            return Err(ScannerError::Config {
                field: "reconnect_delay_ms".to_owned(),
                reason: format!("must be 1-{MAX_RECONNECT_DELAY_MS}"),
            });
        }

        if self.event_reconnect_delay_ms == 0
            || self.event_reconnect_delay_ms > MAX_RECONNECT_DELAY_MS
        {
            return Err(ScannerError::Config {
                field: "event_reconnect_delay_ms".to_owned(),
                reason: format!("must be 1-{MAX_RECONNECT_DELAY_MS}"),
            });
        }

        if !(MIN_LINE_BYTES..=MAX_LINE_BYTES).contains(&self.max_line_bytes) {
            return Err(ScannerError::Config {
                field: "max_line_bytes".to_owned(),
                reason: format!("must be {MIN_LINE_BYTES}-{MAX_LINE_BYTES}"),
            });
        }

        if self.watch_interval_ms == 0 || self.watch_interval_ms > MAX_WATCH_INTERVAL_MS {
            return Err(ScannerError::Config {
                field: "watch_interval_ms".to_owned(),
                reason: format!("must be 1-{MAX_WATCH_INTERVAL_MS}"),
            });
        }

        Ok(())
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn event_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.event_reconnect_delay_ms)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms)
    }

    pub fn initial_lookback(&self) -> Duration {
        Duration::from_secs(self.initial_lookback_secs)
    }
}

/// 스캐너 설정 빌더
#[derive(Default)]
pub struct ScannerConfigBuilder {
    config: ScannerConfig,
}

impl ScannerConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 재연결 대기 시간을 설정합니다.
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 재시도 한도를 설정합니다 (0 = 무제한).
    pub fn max_retries(mut self, max: u32) -> Self {
        self.config.max_retries = max;
        self
    }

    /// 이벤트 스트림 재구독 대기 시간을 설정합니다.
    pub fn event_reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.event_reconnect_delay_ms =
            u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 최대 라인 길이를 설정합니다.
    pub fn max_line_bytes(mut self, bytes: usize) -> Self {
        self.config.max_line_bytes = bytes;
        self
    }

    /// 변경 감시 주기를 설정합니다.
    pub fn watch_interval(mut self, interval: Duration) -> Self {
        self.config.watch_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// 설정을 검증하고 빌드합니다.
    pub fn build(self) -> Result<ScannerConfig, ScannerError> {
        self.config.validate()?;
        Ok(self.config)
    }
}
