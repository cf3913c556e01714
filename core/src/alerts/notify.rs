use std::sync::Arc;

use chrono::DateTime;
use chrono::Local;
use serde::Serialize;
use soc_protocol::Alert;
use tokio::sync::mpsc;

const ANALYZE_LABEL: &str = "Analyze";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification queue is full")]
    Full,

    #[error("notification receiver has gone away")]
    Closed,
}

/// Navigation offered alongside a notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationAction {
    pub label: String,
    /// In-app route of the alert-analysis view.
    pub route: String,
}

/// A dismissible, user-visible notice about one accepted alert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlertNotification {
    pub alert_id: String,
    pub title: String,
    pub body: String,
    pub dismissible: bool,
    pub action: NotificationAction,
}

impl AlertNotification {
    pub fn for_alert(alert: &Alert) -> Self {
        Self {
            alert_id: alert.id.clone(),
            title: format!("Critical Alert: {}", alert.description),
            body: format!("Agent: {} | {}", alert.agent, local_time(&alert.timestamp)),
            dismissible: true,
            action: NotificationAction {
                label: ANALYZE_LABEL.to_string(),
                route: format!("/chat?q=analyze alert {}", alert.id),
            },
        }
    }
}

/// Timestamps that fail to parse are shown as reported.
fn local_time(timestamp: &str) -> String {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|ts| ts.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|_| timestamp.to_string())
}

/// Somewhere to put notifications. Delivery is fire-and-forget: an error
/// here is logged by the dispatcher and otherwise ignored.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: AlertNotification) -> Result<(), NotifyError>;
}

/// Hands notifications to a UI loop over a bounded channel without waiting.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<AlertNotification>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<AlertNotification>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl NotificationSink for ChannelSink {
    fn deliver(&self, notification: AlertNotification) -> Result<(), NotifyError> {
        self.tx.try_send(notification).map_err(|err| match err {
            mpsc::error::TrySendError::Full(_) => NotifyError::Full,
            mpsc::error::TrySendError::Closed(_) => NotifyError::Closed,
        })
    }
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn deliver(&self, notification: AlertNotification) -> Result<(), NotifyError> {
        tracing::info!(
            alert_id = %notification.alert_id,
            route = %notification.action.route,
            "{} ({})",
            notification.title,
            notification.body
        );
        Ok(())
    }
}

/// Fans accepted live alerts out to every registered sink.
#[derive(Clone, Default)]
pub struct NotificationDispatcher {
    sinks: Vec<Arc<dyn NotificationSink>>,
}

impl NotificationDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Call exactly once per accepted live alert.
    pub fn on_accepted(&self, alert: &Alert) {
        if self.sinks.is_empty() {
            return;
        }
        let notification = AlertNotification::for_alert(alert);
        for sink in &self.sinks {
            if let Err(err) = sink.deliver(notification.clone()) {
                tracing::warn!("notification for alert {} not delivered: {err}", alert.id);
            }
        }
    }
}

impl std::fmt::Debug for NotificationDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationDispatcher")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
