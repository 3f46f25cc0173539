use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use dealboard_common::Deal;

use super::controller::RefreshReport;

/// Capacity of the notification channel. Slow subscribers skip ahead.
const CHANNEL_CAPACITY: usize = 256;

// ── Notification types ───────────────────────────────────────────────

/// Board events pushed to subscribers (WebSocket clients, the CLI).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all_fields = "camelCase")]
pub enum Notification {
    DealMoved {
        deal: Deal,
        from_stage_id: String,
        to_stage_id: String,
    },
    MoveFailed {
        deal_id: String,
        message: String,
    },
    DealCreated {
        deal: Deal,
    },
    CreateFailed {
        message: String,
    },
    Refreshed {
        report: RefreshReport,
    },
    RefreshFailed {
        message: String,
    },
    LoginRequired {
        message: String,
    },
}

impl Notification {
    /// Short human-readable line, used for logs and terminal output.
    pub fn summary(&self) -> String {
        match self {
            Notification::DealMoved { deal, .. } => {
                format!("Moved \"{}\" to {}", deal.name, deal.stage_name)
            }
            Notification::MoveFailed { message, .. } => format!("Move failed: {message}"),
            Notification::DealCreated { deal } => format!("Created \"{}\"", deal.name),
            Notification::CreateFailed { message } => format!("Create failed: {message}"),
            Notification::Refreshed { report } => {
                format!("Refreshed {} deals", report.deal_count)
            }
            Notification::RefreshFailed { message } => format!("Refresh failed: {message}"),
            Notification::LoginRequired { message } => format!("Login required: {message}"),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Notification::MoveFailed { .. }
                | Notification::CreateFailed { .. }
                | Notification::RefreshFailed { .. }
                | Notification::LoginRequired { .. }
        )
    }
}

// ── Notifier ─────────────────────────────────────────────────────────

/// Fan-out of board notifications. Sending never fails, even with no
/// subscribers.
#[derive(Debug, Clone)]
pub struct Notifier {
    tx: broadcast::Sender<Notification>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn send(&self, notification: Notification) {
        if notification.is_error() {
            tracing::warn!(event = %notification.summary(), "board notification");
        } else {
            tracing::debug!(event = %notification.summary(), "board notification");
        }
        let _ = self.tx.send(notification); // no receivers is fine
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}

/// Serialize a notification for the wire. `None` if serialization fails.
pub fn to_json(notification: &Notification) -> Option<String> {
    match serde_json::to_string(notification) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::error!(error = %e, "failed to serialize notification");
            None
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
