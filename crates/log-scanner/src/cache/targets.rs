//! 알림 대상 캐시

use std::sync::Arc;

use rattle_core::BoxFuture;
use rattle_core::types::NotificationTarget;

use super::{Reload, Snapshot, record_reload};
use crate::error::ScannerError;
use crate::store::ConfigStore;

/// 활성 알림 대상 캐시
///
/// `active = false`인 대상은 스냅샷에 포함되지 않습니다.
pub struct TargetCache {
    store: Arc<dyn ConfigStore>,
    snapshot: Snapshot<Vec<NotificationTarget>>,
}

impl TargetCache {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            snapshot: Snapshot::new(Vec::new()),
        }
    }

    /// 활성 대상 목록 (복사본)
    pub fn targets(&self) -> Vec<NotificationTarget> {
        self.snapshot.load().as_ref().clone()
    }

    /// 활성 대상 ID 목록
    pub fn active_ids(&self) -> Vec<String> {
        self.snapshot.load().iter().map(|t| t.id.clone()).collect()
    }

    pub async fn reload(&self) -> Result<(), ScannerError> {
        let targets = record_reload(self.name(), self.store.notification_targets().await)?;
        let active: Vec<_> = targets.into_iter().filter(|t| t.active).collect();
        self.snapshot.replace(active);
        Ok(())
    }
}

impl Reload for TargetCache {
    fn name(&self) -> &'static str {
        "notification_targets"
    }

    fn reload(&self) -> BoxFuture<'_, Result<(), ScannerError>> {
        Box::pin(TargetCache::reload(self))
    }
}
