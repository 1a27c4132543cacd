//! 프로세스 내 설정 저장소
//!
//! 외부 데이터베이스 없이 동작할 때 사용합니다. 레코드마다 `updated_at`과
//! 소프트 삭제 시각을 기록하므로 변경 감시기가 PostgreSQL과 같은 방식으로 동작합니다.

use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use rattle_core::BoxFuture;
use rattle_core::error::StoreError;
use rattle_core::types::{ContainerRule, FilterMode, NotificationTarget, PatternRule};

use super::{ConfigStore, Resource, TimestampField};

/// 레코드 ID
pub type RecordId = u64;

#[derive(Debug, Clone)]
struct Record<T> {
    id: RecordId,
    value: T,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

impl<T> Record<T> {
    fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    fn modified_since(&self, field: TimestampField, since: DateTime<Utc>) -> bool {
        match field {
            TimestampField::UpdatedAt => self.updated_at > since,
            TimestampField::DeletedAt => self.deleted_at.is_some_and(|d| d > since),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: RecordId,
    targets: Vec<Record<NotificationTarget>>,
    container_rules: Vec<Record<ContainerRule>>,
    pattern_rules: Vec<Record<PatternRule>>,
    modes: Vec<Record<FilterMode>>,
}

impl MemoryState {
    fn next_id(&mut self) -> RecordId {
        self.next_id += 1;
        self.next_id
    }
}

fn live_values<T: Clone>(records: &[Record<T>]) -> Vec<T> {
    records
        .iter()
        .filter(|r| r.is_live())
        .map(|r| r.value.clone())
        .collect()
}

fn count_since<T>(records: &[Record<T>], field: TimestampField, since: DateTime<Utc>) -> u64 {
    records
        .iter()
        .filter(|r| r.modified_since(field, since))
        .count() as u64
}

fn soft_delete<T>(records: &mut [Record<T>], id: RecordId) -> bool {
    match records.iter_mut().find(|r| r.id == id && r.is_live()) {
        Some(r) => {
            r.deleted_at = Some(Utc::now());
            true
        }
        None => false,
    }
}

/// 프로세스 내 설정 저장소
#[derive(Debug, Default)]
pub struct MemoryConfigStore {
    state: RwLock<MemoryState>,
}

impl MemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, MemoryState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_target(&self, target: NotificationTarget) -> RecordId {
        let mut state = self.write();
        let id = state.next_id();
        state.targets.push(Record {
            id,
            value: target,
            updated_at: Utc::now(),
            deleted_at: None,
        });
        id
    }

    pub fn add_container_rule(&self, rule: ContainerRule) -> RecordId {
        let mut state = self.write();
        let id = state.next_id();
        state.container_rules.push(Record {
            id,
            value: rule,
            updated_at: Utc::now(),
            deleted_at: None,
        });
        id
    }

    pub fn add_pattern_rule(&self, rule: PatternRule) -> RecordId {
        let mut state = self.write();
        let id = state.next_id();
        state.pattern_rules.push(Record {
            id,
            value: rule,
            updated_at: Utc::now(),
            deleted_at: None,
        });
        id
    }

    /// 필터 모드를 설정합니다. 모드 레코드는 하나만 유지됩니다.
    pub fn set_filter_mode(&self, mode: FilterMode) {
        let mut state = self.write();
        let now = Utc::now();
        match state.modes.iter().position(|r| r.is_live()) {
            Some(pos) => {
                let record = &mut state.modes[pos];
                record.value = mode;
                record.updated_at = now;
            }
            None => {
                let id = state.next_id();
                state.modes.push(Record {
                    id,
                    value: mode,
                    updated_at: now,
                    deleted_at: None,
                });
            }
        }
    }

    /// 알림 대상의 활성 여부를 변경합니다.
    pub fn set_target_active(&self, id: RecordId, active: bool) -> bool {
        let mut state = self.write();
        match state
            .targets
            .iter_mut()
            .find(|r| r.id == id && r.is_live())
        {
            Some(record) => {
                record.value.active = active;
                record.updated_at = Utc::now();
                true
            }
            None => false,
        }
    }

    /// 레코드를 소프트 삭제합니다.
    pub fn delete(&self, resource: Resource, id: RecordId) -> bool {
        let mut state = self.write();
        match resource {
            Resource::NotificationTargets => soft_delete(&mut state.targets, id),
            Resource::ContainerRules => soft_delete(&mut state.container_rules, id),
            Resource::PatternRules => soft_delete(&mut state.pattern_rules, id),
            Resource::FilterMode => soft_delete(&mut state.modes, id),
        }
    }
}

impl ConfigStore for MemoryConfigStore {
    fn notification_targets(&self) -> BoxFuture<'_, Result<Vec<NotificationTarget>, StoreError>> {
        let targets = live_values(&self.read().targets);
        Box::pin(async move { Ok(targets) })
    }

    fn container_rules(&self) -> BoxFuture<'_, Result<Vec<ContainerRule>, StoreError>> {
        let rules = live_values(&self.read().container_rules);
        Box::pin(async move { Ok(rules) })
    }

    fn pattern_rules(&self) -> BoxFuture<'_, Result<Vec<PatternRule>, StoreError>> {
        let rules = live_values(&self.read().pattern_rules);
        Box::pin(async move { Ok(rules) })
    }

    fn filter_mode(&self) -> BoxFuture<'_, Result<Option<FilterMode>, StoreError>> {
        let mode = live_values(&self.read().modes).into_iter().next();
        Box::pin(async move { Ok(mode) })
    }

    fn count_modified_since(
        &self,
        resource: Resource,
        field: TimestampField,
        since: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<u64, StoreError>> {
        let count = {
            let state = self.read();
            match resource {
                Resource::NotificationTargets => count_since(&state.targets, field, since),
                Resource::ContainerRules => count_since(&state.container_rules, field, since),
                Resource::PatternRules => count_since(&state.pattern_rules, field, since),
                Resource::FilterMode => count_since(&state.modes, field, since),
            }
        };
        Box::pin(async move { Ok(count) })
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use rattle_core::types::RuleDimension;

    use super::*;

    #[tokio::test]
    async fn soft_deleted_records_are_hidden() {
        let store = MemoryConfigStore::new();
        let id = store.add_pattern_rule(PatternRule::exclude("healthcheck"));
        store.add_pattern_rule(PatternRule::include("boom", "error"));
        assert_eq!(store.pattern_rules().await.unwrap().len(), 2);

        assert!(store.delete(Resource::PatternRules, id));
        let rules = store.pattern_rules().await.unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].pattern, "boom");
    }

    #[tokio::test]
    async fn delete_twice_returns_false() {
        let store = MemoryConfigStore::new();
        let id = store.add_target(NotificationTarget::new("-100", true));
        assert!(store.delete(Resource::NotificationTargets, id));
        assert!(!store.delete(Resource::NotificationTargets, id));
    }

    #[tokio::test]
    async fn counts_updates_and_deletes_separately() {
        let store = MemoryConfigStore::new();
        let before = Utc::now() - Duration::seconds(1);
        let id = store.add_container_rule(ContainerRule::new(
            RuleDimension::Name,
            "db",
            FilterMode::Blacklist,
        ));

        let updated = store
            .count_modified_since(Resource::ContainerRules, TimestampField::UpdatedAt, before)
            .await
            .unwrap();
        let deleted = store
            .count_modified_since(Resource::ContainerRules, TimestampField::DeletedAt, before)
            .await
            .unwrap();
        assert_eq!(updated, 1);
        assert_eq!(deleted, 0);

        store.delete(Resource::ContainerRules, id);
        let deleted = store
            .count_modified_since(Resource::ContainerRules, TimestampField::DeletedAt, before)
            .await
            .unwrap();
        assert_eq!(deleted, 1);
    }

    #[tokio::test]
    async fn count_ignores_older_records() {
        let store = MemoryConfigStore::new();
        store.add_target(NotificationTarget::new("-100", true));
        let after = Utc::now() + Duration::seconds(1);
        let count = store
            .count_modified_since(
                Resource::NotificationTargets,
                TimestampField::UpdatedAt,
                after,
            )
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn filter_mode_is_single_record() {
        let store = MemoryConfigStore::new();
        assert_eq!(store.filter_mode().await.unwrap(), None);
        store.set_filter_mode(FilterMode::Whitelist);
        store.set_filter_mode(FilterMode::Blacklist);
        assert_eq!(
            store.filter_mode().await.unwrap(),
            Some(FilterMode::Blacklist)
        );
    }

    #[tokio::test]
    async fn set_target_active_updates_value() {
        let store = MemoryConfigStore::new();
        let id = store.add_target(NotificationTarget::new("-100", true));
        assert!(store.set_target_active(id, false));
        let targets = store.notification_targets().await.unwrap();
        assert!(!targets[0].active);
        assert!(!store.set_target_active(999, true));
    }
}
