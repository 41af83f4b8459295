//! Notification dispatch
//!
//! Fire-and-forget sink called after a financial transaction commits.
//! `notify` cannot fail from the caller's point of view: delivery problems
//! are logged and swallowed so they never roll back money movements.

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::core_types::UserId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationEvent {
    InvestmentCreated,
    InvestmentCancelled,
    MerchandiseArrived,
    ProfitDistributed,
    WalletCharged,
    PayoutRequested,
    PayoutCompleted,
    PayoutRejected,
}

/// A queued notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub user_id: UserId,
    pub event: NotificationEvent,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, user_id: UserId, event: NotificationEvent, payload: serde_json::Value);
}

/// Writes notifications to the log only
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: UserId, event: NotificationEvent, payload: serde_json::Value) {
        info!(user_id, event = ?event, payload = %payload, "Notification");
    }
}

/// Hands notifications to a delivery task over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify(&self, user_id: UserId, event: NotificationEvent, payload: serde_json::Value) {
        let notification = Notification {
            user_id,
            event,
            payload,
        };
        if let Err(e) = self.tx.send(notification) {
            warn!(user_id, event = ?e.0.event, "Notification dropped: delivery task gone");
        }
    }
}
