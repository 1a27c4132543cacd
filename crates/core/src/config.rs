//! 설정 관리 — rattle.toml 파싱 및 런타임 설정
//!
//! [`RattleConfig`]는 모든 구성요소의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`RATTLE_SCANNER_MAX_RETRIES=3` 형식)
//! 3. 설정 파일 (`rattle.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), rattle_core::error::RattleError> {
//! use rattle_core::config::RattleConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = RattleConfig::load("rattle.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = RattleConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, RattleError};
use crate::types::FilterMode;

/// 저장소 백엔드: 프로세스 내 메모리 (`[seed]`로 초기화)
pub const STORE_BACKEND_MEMORY: &str = "memory";
/// 저장소 백엔드: PostgreSQL
pub const STORE_BACKEND_POSTGRES: &str = "postgres";

/// rattle 통합 설정
///
/// `rattle.toml` 파일의 최상위 구조를 나타냅니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RattleConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// Docker 연결 설정
    #[serde(default)]
    pub docker: DockerConfig,
    /// 로그 스캐너 설정
    #[serde(default)]
    pub scanner: ScanConfig,
    /// 변경 감시 설정
    #[serde(default)]
    pub watcher: WatcherConfig,
    /// 설정 저장소
    #[serde(default)]
    pub store: StoreConfig,
    /// memory 백엔드 초기 데이터
    #[serde(default)]
    pub seed: SeedConfig,
    /// 알림 전송 설정
    #[serde(default)]
    pub notifier: NotifierConfig,
    /// Prometheus 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl RattleConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, RattleError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, RattleError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RattleError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                RattleError::Io(e)
            }
        })?;
        Self::parse(&content)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, RattleError> {
        toml::from_str(toml_str).map_err(|e| {
            RattleError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `RATTLE_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "RATTLE_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "RATTLE_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.environment, "RATTLE_GENERAL_ENVIRONMENT");

        // Docker
        override_string(&mut self.docker.socket, "RATTLE_DOCKER_SOCKET");
        override_u64(
            &mut self.docker.connect_timeout_secs,
            "RATTLE_DOCKER_CONNECT_TIMEOUT_SECS",
        );

        // Scanner
        override_u64(
            &mut self.scanner.reconnect_delay_secs,
            "RATTLE_SCANNER_RECONNECT_DELAY_SECS",
        );
        override_u32(&mut self.scanner.max_retries, "RATTLE_SCANNER_MAX_RETRIES");
        override_u64(
            &mut self.scanner.event_reconnect_delay_secs,
            "RATTLE_SCANNER_EVENT_RECONNECT_DELAY_SECS",
        );
        override_usize(
            &mut self.scanner.max_line_bytes,
            "RATTLE_SCANNER_MAX_LINE_BYTES",
        );

        // Watcher
        override_u64(
            &mut self.watcher.poll_interval_secs,
            "RATTLE_WATCHER_POLL_INTERVAL_SECS",
        );
        override_u64(
            &mut self.watcher.initial_lookback_secs,
            "RATTLE_WATCHER_INITIAL_LOOKBACK_SECS",
        );

        // Store
        override_string(&mut self.store.backend, "RATTLE_STORE_BACKEND");
        override_string(&mut self.store.database_url, "RATTLE_STORE_DATABASE_URL");
        override_u32(
            &mut self.store.max_connections,
            "RATTLE_STORE_MAX_CONNECTIONS",
        );
        override_bool(
            &mut self.store.run_migrations,
            "RATTLE_STORE_RUN_MIGRATIONS",
        );

        // Seed
        override_string(&mut self.seed.filter_mode, "RATTLE_SEED_FILTER_MODE");
        override_csv(&mut self.seed.targets, "RATTLE_SEED_TARGETS");
        override_csv(&mut self.seed.exclude, "RATTLE_SEED_EXCLUDE");
        override_csv(
            &mut self.seed.blacklist.names,
            "RATTLE_SEED_BLACKLIST_NAMES",
        );
        override_csv(
            &mut self.seed.whitelist.names,
            "RATTLE_SEED_WHITELIST_NAMES",
        );

        // Notifier
        override_string(
            &mut self.notifier.telegram_token,
            "RATTLE_NOTIFIER_TELEGRAM_TOKEN",
        );
        override_string(
            &mut self.notifier.api_base_url,
            "RATTLE_NOTIFIER_API_BASE_URL",
        );
        override_usize(
            &mut self.notifier.channel_capacity,
            "RATTLE_NOTIFIER_CHANNEL_CAPACITY",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "RATTLE_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "RATTLE_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "RATTLE_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), RattleError> {
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

        if self.scanner.reconnect_delay_secs == 0 {
            return Err(invalid(
                "scanner.reconnect_delay_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.watcher.poll_interval_secs == 0 {
            return Err(invalid(
                "watcher.poll_interval_secs",
                "must be greater than 0".to_owned(),
            ));
        }

        let valid_backends = [STORE_BACKEND_MEMORY, STORE_BACKEND_POSTGRES];
        if !valid_backends.contains(&self.store.backend.as_str()) {
            return Err(invalid(
                "store.backend",
                format!("must be one of: {}", valid_backends.join(", ")),
            ));
        }

        if self.store.backend == STORE_BACKEND_POSTGRES && self.store.database_url.is_empty() {
            return Err(invalid(
                "store.database_url",
                "database_url must not be empty when backend is postgres".to_owned(),
            ));
        }

        if FilterMode::from_str_loose(&self.seed.filter_mode).is_none() {
            return Err(invalid(
                "seed.filter_mode",
                "must be one of: blacklist, whitelist".to_owned(),
            ));
        }

        if self.notifier.channel_capacity == 0 {
            return Err(invalid(
                "notifier.channel_capacity",
                "must be greater than 0".to_owned(),
            ));
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(invalid(
                "metrics.port",
                "port must not be 0 when metrics are enabled".to_owned(),
            ));
        }

        Ok(())
    }
}

fn invalid(field: &str, reason: String) -> RattleError {
    ConfigError::InvalidValue {
        field: field.to_owned(),
        reason,
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
    /// 배포 환경 이름 (시작 알림에 표시)
    pub environment: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            environment: "production".to_owned(),
        }
    }
}

/// Docker 연결 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DockerConfig {
    /// Docker 소켓 경로 (비어 있으면 로컬 기본값 사용)
    pub socket: String,
    /// 연결 타임아웃 (초)
    pub connect_timeout_secs: u64,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            socket: "/var/run/docker.sock".to_owned(),
            connect_timeout_secs: 120,
        }
    }
}

/// 로그 스캐너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// 스트림 실패 후 재연결 대기 (초)
    pub reconnect_delay_secs: u64,
    /// 연속 실패 허용 횟수 (0 = 무제한)
    pub max_retries: u32,
    /// 라이프사이클 이벤트 스트림 재구독 대기 (초)
    pub event_reconnect_delay_secs: u64,
    /// 한 라인의 최대 바이트 수
    pub max_line_bytes: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_secs: 5,
            max_retries: 0,
            event_reconnect_delay_secs: 5,
            max_line_bytes: 64 * 1024,
        }
    }
}

/// 변경 감시 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// 폴링 주기 (초)
    pub poll_interval_secs: u64,
    /// 최초 검사 시 되돌아볼 기간 (초)
    pub initial_lookback_secs: u64,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 15,
            initial_lookback_secs: 300,
        }
    }
}

/// 설정 저장소
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// 백엔드 (memory, postgres)
    pub backend: String,
    /// PostgreSQL 연결 문자열
    pub database_url: String,
    /// 커넥션 풀 최대 크기
    pub max_connections: u32,
    /// 시작 시 스키마 마이그레이션 실행
    pub run_migrations: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: STORE_BACKEND_MEMORY.to_owned(),
            database_url: String::new(),
            max_connections: 5,
            run_migrations: false,
        }
    }
}

/// memory 백엔드 초기 데이터
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SeedConfig {
    /// 초기 필터 모드 (blacklist, whitelist)
    pub filter_mode: String,
    /// 기본 에러 패턴 포함 여부
    pub default_patterns: bool,
    /// 자기 자신을 블랙리스트에 추가할지 여부
    pub exclude_self: bool,
    /// 자기 자신을 식별하는 이름/이미지/레이블 값
    pub self_name: String,
    /// 이벤트 타입별 include 패턴
    pub include: BTreeMap<String, Vec<String>>,
    /// exclude 패턴
    pub exclude: Vec<String>,
    /// 블랙리스트 규칙
    pub blacklist: RuleValues,
    /// 화이트리스트 규칙
    pub whitelist: RuleValues,
    /// 알림 대상 ID
    pub targets: Vec<String>,
}

impl Default for SeedConfig {
    fn default() -> Self {
        Self {
            filter_mode: "blacklist".to_owned(),
            default_patterns: true,
            exclude_self: true,
            self_name: "rattle".to_owned(),
            include: BTreeMap::new(),
            exclude: Vec::new(),
            blacklist: RuleValues::default(),
            whitelist: RuleValues::default(),
            targets: Vec::new(),
        }
    }
}

/// 차원별 규칙 값
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleValues {
    pub names: Vec<String>,
    pub images: Vec<String>,
    pub ids: Vec<String>,
    pub labels: Vec<String>,
}

/// 알림 전송 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// 알림 채널 용량
    pub channel_capacity: usize,
    /// Telegram 봇 토큰 (비어 있으면 로그로만 출력)
    pub telegram_token: String,
    /// Telegram API 주소
    pub api_base_url: String,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 전송 시도 횟수
    pub max_attempts: u32,
    /// 재시도 간격 (밀리초)
    pub retry_delay_ms: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
            telegram_token: String::new(),
            api_base_url: "https://api.telegram.org".to_owned(),
            request_timeout_secs: 10,
            max_attempts: 5,
            retry_delay_ms: 1000,
        }
    }
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9100,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, type_name: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                expected = type_name,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u32(target: &mut u32, env_key: &str) {
    override_parsed(target, env_key, "u32");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
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
