//! Best-effort live-notification sink.
//!
//! Ingestion enqueues onto a bounded channel and moves on; a detached
//! consumer drains it. A full or closed channel drops the notification.
//! Nothing here may ever block or fail the inbound call.

use tokio::sync::mpsc;

use crate::types::Event;

#[derive(Debug, Clone)]
pub struct EventNotification {
    pub owner_id: String,
    pub event: Event,
}

#[derive(Clone)]
pub struct Notifier {
    tx: mpsc::Sender<EventNotification>,
}

impl Notifier {
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<EventNotification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }

    /// Non-blocking publish. Drops are logged at debug and otherwise
    /// invisible to the caller.
    pub fn publish(&self, notification: EventNotification) {
        if let Err(err) = self.tx.try_send(notification) {
            tracing::debug!(error = %err, "event notification dropped");
        }
    }
}

/// Consumer loop for the notification channel. Stands in for the real-time
/// fan-out to connected clients, which is outside the relay pipeline.
pub async fn drain(mut rx: mpsc::Receiver<EventNotification>) {
    while let Some(notification) = rx.recv().await {
        tracing::debug!(
            owner_id = %notification.owner_id,
            event_id = %notification.event.id,
            event_type = %notification.event.event_type,
            "event notification"
        );
    }
}
