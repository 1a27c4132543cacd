//! 변경 감시기 — 저장소를 주기적으로 폴링하여 변경된 리소스의 캐시를 다시 읽습니다.
//!
//! 관리 API는 이 프로세스로 변경을 푸시하지 않습니다. 감시기는 리소스마다
//! 마지막 확인 시각 이후에 `updated_at`/`deleted_at`이 바뀐 레코드 수를 조회하고,
//! 처음으로 양수가 나온 필드에서 해당 캐시를 리로드합니다.
//! 캐시 지연은 폴링 주기로 제한됩니다.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::Reload;
use crate::store::{ConfigStore, Resource, TimestampField};

/// 감시 대상 하나
struct Watched {
    resource: Resource,
    fields: Vec<TimestampField>,
    cache: Arc<dyn Reload>,
    last_checked: DateTime<Utc>,
}

/// 폴링 기반 변경 감시기
pub struct ChangeWatcher {
    store: Arc<dyn ConfigStore>,
    interval: Duration,
    initial_lookback: Duration,
    watched: Vec<Watched>,
}

impl ChangeWatcher {
    pub fn new(store: Arc<dyn ConfigStore>, interval: Duration, initial_lookback: Duration) -> Self {
        Self {
            store,
            interval,
            initial_lookback,
            watched: Vec::new(),
        }
    }

    /// 리소스를 `updated_at`, `deleted_at` 필드로 감시합니다.
    pub fn watch(self, resource: Resource, cache: Arc<dyn Reload>) -> Self {
        self.watch_fields(resource, TimestampField::ALL.to_vec(), cache)
    }

    /// 리소스를 지정한 타임스탬프 필드로 감시합니다.
    pub fn watch_fields(
        mut self,
        resource: Resource,
        fields: Vec<TimestampField>,
        cache: Arc<dyn Reload>,
    ) -> Self {
        let lookback = chrono::Duration::from_std(self.initial_lookback)
            .unwrap_or_else(|_| chrono::Duration::zero());
        self.watched.push(Watched {
            resource,
            fields,
            cache,
            last_checked: Utc::now() - lookback,
        });
        self
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }

    /// 리소스의 마지막 확인 시각
    pub fn last_checked(&self, resource: Resource) -> Option<DateTime<Utc>> {
        self.watched
            .iter()
            .find(|w| w.resource == resource)
            .map(|w| w.last_checked)
    }

    /// 모든 리소스를 한 번 확인합니다. 리로드를 시도한 리소스 수를 반환합니다.
    ///
    /// 리로드가 실패하면 마지막 확인 시각을 되돌려 다음 폴링에서 다시 시도합니다.
    pub async fn check_once(&mut self) -> usize {
        let mut reloaded = 0;
        for watched in &mut self.watched {
            let now = Utc::now();
            for &field in &watched.fields {
                let count = match self
                    .store
                    .count_modified_since(watched.resource, field, watched.last_checked)
                    .await
                {
                    Ok(count) => count,
                    Err(e) => {
                        warn!(resource = %watched.resource, field = field.column(), error = %e, "change query failed");
                        continue;
                    }
                };
                if count == 0 {
                    continue;
                }

                info!(resource = %watched.resource, field = field.column(), count, "configuration change detected");
                let previous = watched.last_checked;
                watched.last_checked = now;
                if let Err(e) = watched.cache.reload().await {
                    warn!(cache = watched.cache.name(), error = %e, "reload after change failed");
                    watched.last_checked = previous;
                }
                reloaded += 1;
                break;
            }
        }
        reloaded
    }

    /// 취소될 때까지 주기적으로 [`check_once`](Self::check_once)를 실행합니다.
    pub async fn run(mut self, token: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            resources = self.watched.len(),
            interval_ms = self.interval.as_millis() as u64,
            "change watcher started"
        );

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    let reloaded = self.check_once().await;
                    if reloaded > 0 {
                        debug!(reloaded, "change watcher cycle complete");
                    }
                }
            }
        }

        info!("change watcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use rattle_core::BoxFuture;
    use rattle_core::types::{FilterMode, NotificationTarget, PatternRule};

    use super::*;
    use crate::cache::testing::FlakyStore;
    use crate::cache::{ModeCache, PatternCache, TargetCache};
    use crate::error::ScannerError;

    #[derive(Default)]
    struct CountingReload {
        calls: AtomicUsize,
    }

    impl Reload for CountingReload {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn reload(&self) -> BoxFuture<'_, Result<(), ScannerError>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
        }
    }

    fn watcher(store: Arc<FlakyStore>) -> ChangeWatcher {
        ChangeWatcher::new(store, Duration::from_secs(15), Duration::from_secs(300))
    }

    #[tokio::test]
    async fn initial_lookback_catches_recent_changes() {
        let store = Arc::new(FlakyStore::default());
        store.inner.add_pattern_rule(PatternRule::include("boom", "error"));
        let patterns = Arc::new(PatternCache::new(Arc::clone(&store) as Arc<dyn ConfigStore>));
        let mut watcher = watcher(Arc::clone(&store))
            .watch(Resource::PatternRules, Arc::clone(&patterns) as Arc<dyn Reload>);

        assert_eq!(watcher.check_once().await, 1);
        assert_eq!(patterns.classify("boom").as_deref(), Some("error"));

        // 변경이 없으면 리로드하지 않음
        assert_eq!(watcher.check_once().await, 0);
    }

    #[tokio::test]
    async fn only_changed_resources_reload() {
        let store = Arc::new(FlakyStore::default());
        let targets = Arc::new(CountingReload::default());
        let mode = Arc::new(CountingReload::default());
        let mut watcher = watcher(Arc::clone(&store))
            .watch(Resource::NotificationTargets, Arc::clone(&targets) as Arc<dyn Reload>)
            .watch(Resource::FilterMode, Arc::clone(&mode) as Arc<dyn Reload>);

        store.inner.add_target(NotificationTarget::new("-100", true));
        assert_eq!(watcher.check_once().await, 1);
        assert_eq!(targets.calls.load(Ordering::SeqCst), 1);
        assert_eq!(mode.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn soft_delete_triggers_reload() {
        let store = Arc::new(FlakyStore::default());
        let id = store.inner.add_target(NotificationTarget::new("-100", true));
        let targets = Arc::new(TargetCache::new(Arc::clone(&store) as Arc<dyn ConfigStore>));
        let mut watcher = watcher(Arc::clone(&store))
            .watch(Resource::NotificationTargets, Arc::clone(&targets) as Arc<dyn Reload>);
        watcher.check_once().await;
        assert_eq!(targets.targets().len(), 1);

        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(store.inner.delete(Resource::NotificationTargets, id));
        assert_eq!(watcher.check_once().await, 1);
        assert!(targets.targets().is_empty());
    }

    #[tokio::test]
    async fn query_failure_is_tolerated() {
        let store = Arc::new(FlakyStore::default());
        store.inner.set_filter_mode(FilterMode::Whitelist);
        let mode = Arc::new(ModeCache::new(Arc::clone(&store) as Arc<dyn ConfigStore>));
        let mut watcher = watcher(Arc::clone(&store))
            .watch(Resource::FilterMode, Arc::clone(&mode) as Arc<dyn Reload>);

        store.set_failing(true);
        let before = watcher.last_checked(Resource::FilterMode);
        assert_eq!(watcher.check_once().await, 0);
        assert_eq!(watcher.last_checked(Resource::FilterMode), before);
        assert_eq!(mode.mode(), FilterMode::Blacklist);

        store.set_failing(false);
        assert_eq!(watcher.check_once().await, 1);
        assert_eq!(mode.mode(), FilterMode::Whitelist);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_cancel() {
        let store = Arc::new(FlakyStore::default());
        let counting = Arc::new(CountingReload::default());
        let watcher = watcher(Arc::clone(&store))
            .watch(Resource::ContainerRules, Arc::clone(&counting) as Arc<dyn Reload>);
        let token = CancellationToken::new();
        let task = tokio::spawn(watcher.run(token.clone()));

        tokio::time::sleep(Duration::from_secs(60)).await;
        token.cancel();
        task.await.unwrap();
        assert_eq!(counting.calls.load(Ordering::SeqCst), 0);
    }
}
