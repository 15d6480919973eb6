// src/watch/notification.rs

//! Fan-out of per-batch change notifications.

use tokio::sync::mpsc;
use tracing::warn;

use crate::types::ChangeNotification;

/// Capacity of the channel feeding the refresh controller.
pub const CHANGE_CHANNEL_CAPACITY: usize = 1000;

/// Delivers batch results to the refresh controller and an optional
/// subscriber.
///
/// The controller only hears about real changes. The subscriber also gets
/// the explicit no-change acknowledgments.
#[derive(Debug, Clone)]
pub struct Notifier {
    changes: mpsc::Sender<ChangeNotification>,
    subscriber: Option<mpsc::UnboundedSender<ChangeNotification>>,
}

impl Notifier {
    pub fn channel() -> (Self, mpsc::Receiver<ChangeNotification>) {
        let (tx, rx) = mpsc::channel(CHANGE_CHANNEL_CAPACITY);
        (
            Self {
                changes: tx,
                subscriber: None,
            },
            rx,
        )
    }

    pub fn with_subscriber(mut self, subscriber: mpsc::UnboundedSender<ChangeNotification>) -> Self {
        self.subscriber = Some(subscriber);
        self
    }

    pub fn notify(&self, notification: ChangeNotification) {
        if notification.changed {
            if let Err(mpsc::error::TrySendError::Full(_)) =
                self.changes.try_send(notification.clone())
            {
                warn!(target: "detection", "change channel full; dropping notification");
            }
        }
        if let Some(subscriber) = &self.subscriber {
            let _ = subscriber.send(notification);
        }
    }
}
