//! 영속 계층 경계 — 설정 리소스 읽기와 변경 감지 쿼리
//!
//! 코어는 저장소를 읽기만 합니다. 쓰기는 외부 관리 경계의 책임이며,
//! 변경 사항은 [`ChangeWatcher`](crate::watcher::ChangeWatcher)의 다음 폴링에서 반영됩니다.
//!
//! # 구현체
//!
//! - [`MemoryConfigStore`]: 프로세스 내 저장소 (테스트, `memory` 백엔드)
//! - [`PgConfigStore`]: PostgreSQL 저장소 (`postgres` 백엔드)

use std::fmt;

use chrono::{DateTime, Utc};
use rattle_core::BoxFuture;
use rattle_core::error::StoreError;
use rattle_core::types::{ContainerRule, FilterMode, NotificationTarget, PatternRule};

pub mod memory;
pub mod postgres;
pub mod seed;

pub use memory::MemoryConfigStore;
pub use postgres::PgConfigStore;
pub use seed::{DEFAULT_ERROR_PATTERNS, seed_memory_store};

/// 감시 대상 설정 리소스
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    NotificationTargets,
    ContainerRules,
    PatternRules,
    FilterMode,
}

impl Resource {
    /// 테이블 이름
    pub fn table(&self) -> &'static str {
        match self {
            Self::NotificationTargets => "notification_targets",
            Self::ContainerRules => "container_rules",
            Self::PatternRules => "pattern_rules",
            Self::FilterMode => "filter_modes",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table())
    }
}

/// 변경 감지에 쓰는 타임스탬프 컬럼
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimestampField {
    UpdatedAt,
    /// 소프트 삭제 시각
    DeletedAt,
}

impl TimestampField {
    /// 기본 감시 필드
    pub const ALL: [TimestampField; 2] = [Self::UpdatedAt, Self::DeletedAt];

    pub fn column(&self) -> &'static str {
        match self {
            Self::UpdatedAt => "updated_at",
            Self::DeletedAt => "deleted_at",
        }
    }
}

/// 설정 저장소 경계
///
/// `dyn ConfigStore`로 캐시 간에 공유할 수 있도록 [`BoxFuture`]를 반환합니다.
/// 읽기 쿼리는 소프트 삭제된 레코드를 제외합니다.
pub trait ConfigStore: Send + Sync + 'static {
    /// 모든 알림 대상 (비활성 포함)
    fn notification_targets(&self) -> BoxFuture<'_, Result<Vec<NotificationTarget>, StoreError>>;

    /// 모든 컨테이너 규칙
    fn container_rules(&self) -> BoxFuture<'_, Result<Vec<ContainerRule>, StoreError>>;

    /// 모든 패턴 규칙
    fn pattern_rules(&self) -> BoxFuture<'_, Result<Vec<PatternRule>, StoreError>>;

    /// 현재 필터 모드 (저장된 값이 없으면 `None`)
    fn filter_mode(&self) -> BoxFuture<'_, Result<Option<FilterMode>, StoreError>>;

    /// `field`가 `since`보다 이후인 레코드 수
    fn count_modified_since(
        &self,
        resource: Resource,
        field: TimestampField,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64, StoreError>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_tables_are_distinct() {
        let tables = [
            Resource::NotificationTargets.table(),
            Resource::ContainerRules.table(),
            Resource::PatternRules.table(),
            Resource::FilterMode.table(),
        ];
        let unique: std::collections::HashSet<_> = tables.iter().collect();
        assert_eq!(unique.len(), tables.len());
    }

    #[test]
    fn timestamp_columns() {
        assert_eq!(TimestampField::UpdatedAt.column(), "updated_at");
        assert_eq!(TimestampField::DeletedAt.column(), "deleted_at");
    }
}
