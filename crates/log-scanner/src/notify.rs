//! 알림 경계
//!
//! 코어는 구조화된 [`Notification`]만 생성하며 렌더링과 전송은 데몬의 디스패처가 담당합니다.
//! [`Notifier::notify`]는 블로킹하지 않습니다.

use metrics::counter;
use rattle_core::notification::Notification;
use tokio::sync::mpsc;
use tracing::warn;

/// 알림 수신자
pub trait Notifier: Send + Sync + 'static {
    /// 알림을 전달합니다. 전달 실패는 호출자에게 전파되지 않습니다.
    fn notify(&self, notification: Notification);
}

/// bounded mpsc 채널 기반 알림 수신자
///
/// 채널이 가득 찼거나 닫혀 있으면 알림을 버리고 경고를 남깁니다.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::Sender<Notification>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::Sender<Notification>) -> Self {
        Self { tx }
    }

    /// 채널과 수신자를 함께 생성합니다.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, notification: Notification) {
        if let Err(e) = self.tx.try_send(notification) {
            let (reason, dropped) = match e {
                mpsc::error::TrySendError::Full(n) => ("full", n),
                mpsc::error::TrySendError::Closed(n) => ("closed", n),
            };
            counter!(
                rattle_core::metrics::NOTIFICATIONS_DROPPED_TOTAL,
                rattle_core::metrics::LABEL_KIND => dropped.kind_name()
            )
            .increment(1);
            warn!(
                kind = dropped.kind_name(),
                notification_id = %dropped.id,
                reason,
                "notification channel unavailable, dropping notification"
            );
        }
    }
}

/// 테스트용 수집 알림 수신자
#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use rattle_core::notification::{Notification, NotificationKind};

    use super::Notifier;

    #[derive(Clone, Default)]
    pub(crate) struct RecordingNotifier {
        pub(crate) sent: Arc<Mutex<Vec<Notification>>>,
    }

    impl RecordingNotifier {
        pub(crate) fn kinds(&self) -> Vec<NotificationKind> {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .map(|n| n.kind.clone())
                .collect()
        }

        pub(crate) fn count(&self, kind: &str) -> usize {
            self.sent
                .lock()
                .unwrap()
                .iter()
                .filter(|n| n.kind_name() == kind)
                .count()
        }
    }

    impl Notifier for RecordingNotifier {
        fn notify(&self, notification: Notification) {
            self.sent.lock().unwrap().push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_through_channel() {
        let (notifier, mut rx) = ChannelNotifier::channel(4);
        notifier.notify(Notification::process_started("test"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind_name(), "process_started");
    }

    #[tokio::test]
    async fn full_channel_drops_without_blocking() {
        let (notifier, mut rx) = ChannelNotifier::channel(1);
        notifier.notify(Notification::process_started("a"));
        notifier.notify(Notification::process_shutting_down());
        assert_eq!(rx.recv().await.unwrap().kind_name(), "process_started");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn closed_channel_is_tolerated() {
        let (notifier, rx) = ChannelNotifier::channel(1);
        drop(rx);
        notifier.notify(Notification::process_shutting_down());
    }
}
