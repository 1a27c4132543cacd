//! 설정 캐시 계층
//!
//! 외부 저장소의 설정 리소스를 읽기 최적화된 메모리 스냅샷으로 유지합니다.
//! 각 캐시는 독립적으로 리로드되며, 리로드는 새 스냅샷을 락 밖에서 완성한 뒤
//! 한 번의 쓰기로 교체합니다. 읽는 쪽은 부분적으로 갱신된 상태를 볼 수 없습니다.
//!
//! 저장소 조회가 실패하면 기존 스냅샷을 유지하고 에러를 로그로 남긴 뒤
//! 리로드 호출자에게만 반환합니다. 읽기 접근자는 실패하지 않습니다.

use std::sync::{Arc, PoisonError, RwLock};

use metrics::counter;
use rattle_core::BoxFuture;
use rattle_core::error::StoreError;
use tracing::{debug, warn};

use crate::error::ScannerError;

pub mod mode;
pub mod patterns;
pub mod rules;
pub mod targets;

pub use mode::ModeCache;
pub use patterns::{PatternCache, PatternSet};
pub use rules::{ContainerRuleCache, ContainerRuleSet};
pub use targets::TargetCache;

/// 리로드 가능한 캐시
///
/// 변경 감시기가 `Arc<dyn Reload>`로 보관합니다.
pub trait Reload: Send + Sync + 'static {
    /// 로그/메트릭용 리소스 이름
    fn name(&self) -> &'static str;

    /// 저장소에서 스냅샷을 다시 읽습니다.
    fn reload(&self) -> BoxFuture<'_, Result<(), ScannerError>>;
}

/// 원자적으로 교체되는 불변 스냅샷
#[derive(Debug)]
pub(crate) struct Snapshot<T> {
    inner: RwLock<Arc<T>>,
}

impl<T> Snapshot<T> {
    pub(crate) fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(Arc::new(value)),
        }
    }

    pub(crate) fn load(&self) -> Arc<T> {
        Arc::clone(&self.inner.read().unwrap_or_else(PoisonError::into_inner))
    }

    pub(crate) fn replace(&self, value: T) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(value);
    }
}

/// 저장소 조회 결과를 기록하고 실패 시 스냅샷 유지 의미를 로그로 남깁니다.
pub(crate) fn record_reload<T>(
    resource: &'static str,
    result: Result<T, StoreError>,
) -> Result<T, ScannerError> {
    match result {
        Ok(value) => {
            counter!(
                rattle_core::metrics::CACHE_RELOADS_TOTAL,
                rattle_core::metrics::LABEL_RESOURCE => resource
            )
            .increment(1);
            debug!(resource, "cache reloaded");
            Ok(value)
        }
        Err(e) => {
            counter!(
                rattle_core::metrics::CACHE_RELOAD_FAILURES_TOTAL,
                rattle_core::metrics::LABEL_RESOURCE => resource
            )
            .increment(1);
            warn!(resource, error = %e, "cache reload failed, keeping previous snapshot");
            Err(ScannerError::Store(e))
        }
    }
}
