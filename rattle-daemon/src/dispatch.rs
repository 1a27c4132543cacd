//! Notification dispatcher.
//!
//! Consumes the scanner's notification channel, renders each notification
//! and delivers it to every active target. On cancellation it stops accepting
//! new notifications and drains what is already queued before returning.

use std::sync::Arc;

use metrics::counter;
use rattle_core::notification::Notification;
use rattle_log_scanner::TargetCache;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::render::render;
use crate::telegram::MessageSender;

/// Delivers notifications to the active targets.
pub struct Dispatcher<S: MessageSender> {
    rx: mpsc::Receiver<Notification>,
    sender: Arc<S>,
    targets: Arc<TargetCache>,
}

impl<S: MessageSender> Dispatcher<S> {
    pub fn new(rx: mpsc::Receiver<Notification>, sender: Arc<S>, targets: Arc<TargetCache>) -> Self {
        Self {
            rx,
            sender,
            targets,
        }
    }

    /// Run until cancelled or until every notification sender is dropped.
    ///
    /// Returns the number of notifications processed.
    pub async fn run(mut self, token: CancellationToken) -> u64 {
        let mut processed = 0;
        loop {
            tokio::select! {
                biased;
                next = self.rx.recv() => match next {
                    Some(notification) => {
                        self.dispatch(&notification).await;
                        processed += 1;
                    }
                    None => break,
                },
                _ = token.cancelled() => {
                    self.rx.close();
                    while let Some(notification) = self.rx.recv().await {
                        self.dispatch(&notification).await;
                        processed += 1;
                    }
                    break;
                }
            }
        }
        tracing::info!(processed, "notification dispatcher stopped");
        processed
    }

    /// Render and deliver one notification to every active target.
    pub async fn dispatch(&self, notification: &Notification) {
        let targets = self.targets.active_ids();
        let kind = notification.kind_name();
        if targets.is_empty() {
            tracing::info!(kind, notification = %notification, "no active notification targets");
            return;
        }

        let text = render(notification);
        for chat_id in &targets {
            match self.sender.send(chat_id, &text).await {
                Ok(()) => {
                    counter!(
                        rattle_core::metrics::NOTIFICATIONS_SENT_TOTAL,
                        rattle_core::metrics::LABEL_KIND => kind
                    )
                    .increment(1);
                }
                Err(e) => {
                    counter!(
                        rattle_core::metrics::NOTIFICATIONS_DROPPED_TOTAL,
                        rattle_core::metrics::LABEL_KIND => kind
                    )
                    .increment(1);
                    tracing::warn!(chat_id = %chat_id, kind, error = %e, "failed to deliver notification");
                }
            }
        }
    }
}
