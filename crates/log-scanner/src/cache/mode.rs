//! 필터 모드 캐시

use std::sync::Arc;

use rattle_core::BoxFuture;
use rattle_core::types::FilterMode;

use super::{Reload, Snapshot, record_reload};
use crate::error::ScannerError;
use crate::store::ConfigStore;

/// 전역 필터 모드 캐시
///
/// 첫 리로드 전에는 블랙리스트입니다. 저장소에 모드가 없으면 현재 값을 유지합니다.
pub struct ModeCache {
    store: Arc<dyn ConfigStore>,
    snapshot: Snapshot<FilterMode>,
}

impl ModeCache {
    pub fn new(store: Arc<dyn ConfigStore>) -> Self {
        Self {
            store,
            snapshot: Snapshot::new(FilterMode::default()),
        }
    }

    pub fn mode(&self) -> FilterMode {
        *self.snapshot.load()
    }

    pub async fn reload(&self) -> Result<(), ScannerError> {
        if let Some(mode) = record_reload(self.name(), self.store.filter_mode().await)? {
            self.snapshot.replace(mode);
        }
        Ok(())
    }
}

impl Reload for ModeCache {
    fn name(&self) -> &'static str {
        "filter_mode"
    }

    fn reload(&self) -> BoxFuture<'_, Result<(), ScannerError>> {
        Box::pin(ModeCache::reload(self))
    }
}
