//! rattle 공통 크레이트
//!
//! 컨테이너 로그 스캐너(`rattle-log-scanner`)와 데몬(`rattle-daemon`)이
//! 공유하는 도메인 타입, 알림 페이로드, 에러, 설정, 메트릭 이름을 정의합니다.

use std::future::Future;
use std::pin::Pin;

pub mod config;
pub mod error;
pub mod metrics;
pub mod notification;
pub mod types;

// --- 주요 타입 re-export ---

// 에러
pub use error::{ConfigError, ContainerError, RattleError, StoreError};

// 설정
pub use config::RattleConfig;

// 알림
pub use notification::{Notification, NotificationKind};

// 도메인 타입
pub use types::{
    ContainerIdentity, ContainerRule, FilterMode, MatchType, NotificationTarget, PatternRule,
    RuleDimension,
};

/// trait object에서 사용할 수 있는 boxed future
///
/// `ConfigStore`, `Reload`처럼 `dyn` 디스패치가 필요한 경계에서 사용합니다.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
