//! # rattle-log-scanner
//!
//! 컨테이너 로그 스캔 엔진입니다. 실행 중인 컨테이너마다 로그 스트림 하나를 유지하고,
//! 각 라인을 패턴 규칙으로 분류하여 이벤트를 알림 경계로 보냅니다.
//!
//! # 모듈 구조
//!
//! - [`error`]: 도메인 에러 타입 (`ScannerError`)
//! - [`config`]: 스캐너 설정 (`ScannerConfig`, 빌더)
//! - [`docker`]: 컨테이너 런타임 추상화 (`DockerClient` trait, `BollardDockerClient`)
//! - [`line`]: 로그 청크의 라인 조립과 정리
//! - [`store`]: 영속 계층 경계 (`ConfigStore`, memory/PostgreSQL 구현)
//! - [`cache`]: 설정 캐시 계층과 패턴 엔진
//! - [`watcher`]: 폴링 기반 변경 감시기
//! - [`filter`]: 필터 엔진 (whitelist/blacklist)
//! - [`classifier`]: 로그 분류기
//! - [`notify`]: 알림 경계 (`Notifier`, `ChannelNotifier`)
//! - [`stream`]: 컨테이너별 스트림 스캐너
//! - [`registry`]: 스캔 레지스트리
//!
//! # 데이터 흐름
//!
//! ```text
//! lifecycle events ──> ScanRegistry ──spawn──> StreamScanner (컨테이너별)
//!                                                   │ raw line
//!                                                   ▼
//!                      ContainerFilter + PatternSet (LogClassifier)
//!                           ▲                       │ Notification
//!        ChangeWatcher ──> caches                    ▼
//!                                                Notifier
//! ```

pub mod cache;
pub mod classifier;
pub mod config;
pub mod docker;
pub mod error;
pub mod filter;
pub mod line;
pub mod notify;
pub mod registry;
pub mod store;
pub mod stream;
pub mod watcher;

// --- Public API Re-exports ---

// Registry / scanner
pub use registry::{ScanRegistry, ScanRegistryBuilder};
pub use stream::{LineHandler, ScanExit, StreamScanner};

// Configuration
pub use config::{ScannerConfig, ScannerConfigBuilder};

// Error
pub use error::ScannerError;

// Docker API
pub use docker::{
    BollardDockerClient, DockerClient, LifecycleEvent, LifecycleKind, LogChunk, OutputStream,
};

// Caches / engines
pub use cache::{
    ContainerRuleCache, ContainerRuleSet, ModeCache, PatternCache, PatternSet, Reload,
    TargetCache,
};
pub use classifier::LogClassifier;
pub use filter::ContainerFilter;
pub use watcher::ChangeWatcher;

// Boundaries
pub use notify::{ChannelNotifier, Notifier};
pub use store::{ConfigStore, MemoryConfigStore, PgConfigStore, Resource, TimestampField};
