//! 로그 분류기 — 필터 엔진과 패턴 엔진을 라인마다 적용합니다.

use std::sync::Arc;

use metrics::counter;
use rattle_core::notification::Notification;
use rattle_core::types::ContainerIdentity;
use tracing::debug;

use crate::cache::PatternCache;
use crate::filter::ContainerFilter;
use crate::notify::Notifier;
use crate::stream::LineHandler;

/// 라인을 분류하고 이벤트를 알림 경계로 보냅니다.
///
/// 필터는 라인마다 다시 평가되므로 규칙 변경이 이미 추적 중인 컨테이너에도 곧바로 반영됩니다.
pub struct LogClassifier {
    filter: ContainerFilter,
    patterns: Arc<PatternCache>,
    notifier: Arc<dyn Notifier>,
}

impl LogClassifier {
    pub fn new(
        filter: ContainerFilter,
        patterns: Arc<PatternCache>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            filter,
            patterns,
            notifier,
        }
    }

    /// 정리된 라인의 이벤트 타입을 결정합니다. 무시 대상 컨테이너면 `None`입니다.
    pub fn classify(&self, container: &ContainerIdentity, line: &str) -> Option<String> {
        if self.filter.should_ignore(container) {
            return None;
        }
        self.patterns.classify(line)
    }
}

impl LineHandler for LogClassifier {
    fn handle_line(&self, container: &ContainerIdentity, line: &str) {
        let Some(event_type) = self.classify(container, line) else {
            return;
        };
        debug!(
            container_id = container.short_id(),
            event_type = %event_type,
            "log line classified"
        );
        counter!(
            rattle_core::metrics::SCANNER_EVENTS_TOTAL,
            rattle_core::metrics::LABEL_EVENT_TYPE => event_type.clone()
        )
        .increment(1);
        self.notifier
            .notify(Notification::log_event(container.clone(), event_type, line));
    }
}
