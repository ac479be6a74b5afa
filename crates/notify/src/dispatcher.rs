//! Routes notifications to configured channels.
//!
//! The dispatcher delivers a notification to every channel configured for
//! its notification kind, falling back to the default channels. Individual
//! channel failures don't block other channels.

use std::collections::HashMap;

use crate::traits::{DispatchResult, Notification, Notifier};

/// Dispatches notifications to multiple channels, organized per kind.
pub struct Dispatcher {
    /// Notification kind → channels for that kind.
    kind_channels: HashMap<String, Vec<Box<dyn Notifier>>>,
    /// Fallback channels used when no kind-specific channels exist.
    default_channels: Vec<Box<dyn Notifier>>,
}

impl Dispatcher {
    /// Create an empty dispatcher.
    pub fn empty() -> Self {
        Self {
            kind_channels: HashMap::new(),
            default_channels: Vec::new(),
        }
    }

    /// Create a simple dispatcher with channels shared across all kinds.
    pub fn with_defaults(channels: Vec<Box<dyn Notifier>>) -> Self {
        Self {
            kind_channels: HashMap::new(),
            default_channels: channels,
        }
    }

    /// Replace all channels for a specific notification kind.
    pub fn set_kind_channels(&mut self, kind: String, channels: Vec<Box<dyn Notifier>>) {
        self.kind_channels.insert(kind, channels);
    }

    /// Dispatch a notification of `kind` to all its channels.
    ///
    /// Returns results for each channel delivery. Individual failures
    /// don't block other channels.
    pub async fn dispatch(&self, kind: &str, notification: &Notification) -> Vec<DispatchResult> {
        let channels = self
            .kind_channels
            .get(kind)
            .unwrap_or(&self.default_channels);

        if channels.is_empty() {
            tracing::debug!(kind, "No notification channels configured");
            return Vec::new();
        }

        let instance_id = notification
            .metadata
            .get("instance_id")
            .cloned()
            .unwrap_or_default();
        let mut results = Vec::with_capacity(channels.len());

        for channel in channels {
            let start = std::time::Instant::now();
            let result = channel.send(notification).await;
            let duration_ms = start.elapsed().as_millis() as u64;

            let (success, error) = match result {
                Ok(()) => {
                    tracing::debug!(
                        kind,
                        instance_id = %instance_id,
                        channel = channel.channel_name(),
                        duration_ms,
                        "Notification delivered"
                    );
                    (true, None)
                }
                Err(e) => {
                    tracing::warn!(
                        kind,
                        instance_id = %instance_id,
                        channel = channel.channel_name(),
                        error = %e,
                        duration_ms,
                        "Notification delivery failed"
                    );
                    (false, Some(e.to_string()))
                }
            };

            results.push(DispatchResult {
                channel: channel.channel_name().to_string(),
                instance_id: instance_id.clone(),
                success,
                error,
                duration_ms,
            });
        }

        results
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::empty()
    }
}
