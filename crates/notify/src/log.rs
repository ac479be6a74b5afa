//! Notifier that only writes the notification to the tracing log.
//!
//! Used when no outbound channel is configured, and as an audit trail next
//! to real channels.

use crate::traits::{Notification, Notifier, NotifyError};

#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<(), NotifyError> {
        let meta = |key: &str| notification.metadata.get(key).map(String::as_str).unwrap_or("-");
        tracing::info!(
            instance_id = meta("instance_id"),
            notification_kind = meta("notification_kind"),
            stage = meta("stage"),
            subject = %notification.subject,
            "sending notification"
        );
        Ok(())
    }

    fn channel_name(&self) -> &str {
        "log"
    }
}
