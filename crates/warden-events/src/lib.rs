//! User-visible notification channel for the Warden console.
//!
//! Every failure that must reach the operator goes through one bus as a
//! severity plus message, optionally carrying an action the host can trigger
//! (for example "click to log out"). The bus assigns sequential identifiers and
//! keeps a bounded replay ring so late subscribers can catch up on what was
//! raised during bootstrap. Internally it uses `tokio::broadcast`; when the
//! channel overflows, the oldest notifications are dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};

/// Identifier assigned to each published notification.
pub type NotificationId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 256;

/// Severity levels understood by the host's notification surface.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Danger,
}

impl Severity {
    /// Machine-friendly label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Danger => "danger",
        }
    }
}

/// Action the host performs when the operator acknowledges a notification.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationAction {
    /// End the identity provider session.
    Logout,
}

/// A single user-visible message.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct Notification {
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<NotificationAction>,
    /// How long the host should keep the message on screen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_for_secs: Option<u64>,
}

impl Notification {
    /// Build a danger-level notification without an action.
    #[must_use]
    pub fn danger(message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Danger,
            message: message.into(),
            action: None,
            display_for_secs: None,
        }
    }

    /// Attach an action the host can trigger from this notification.
    #[must_use]
    pub const fn with_action(mut self, action: NotificationAction) -> Self {
        self.action = Some(action);
        self
    }

    /// Keep the notification visible for the given number of seconds.
    #[must_use]
    pub const fn display_for(mut self, secs: u64) -> Self {
        self.display_for_secs = Some(secs);
        self
    }
}

/// Metadata wrapper tracking the notification id and emission timestamp.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq, Eq)]
pub struct NotificationEnvelope {
    pub id: NotificationId,
    pub timestamp: DateTime<Utc>,
    pub notification: Notification,
}

/// Shared notification bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct NotificationBus {
    sender: Sender<NotificationEnvelope>,
    buffer: Arc<Mutex<VecDeque<NotificationEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl NotificationBus {
    /// Construct a new bus with the provided capacity.
    ///
    /// The broadcast channel uses the same capacity as the replay buffer. A
    /// capacity of zero is raised to one.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default in-memory buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish a notification, assigning it a sequential identifier.
    pub fn publish(&self, notification: Notification) -> NotificationId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            id,
            severity = notification.severity.as_str(),
            message = %notification.message,
            "notification published"
        );
        let envelope = NotificationEnvelope {
            id,
            timestamp: Utc::now(),
            notification,
        };

        {
            let mut buffer = self.lock_buffer();
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying buffered notifications newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<NotificationId>) -> NotificationStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self.lock_buffer();
            backlog.extend(buffer.iter().filter(|item| item.id > since).cloned());
        }

        let receiver = self.sender.subscribe();
        NotificationStream { backlog, receiver }
    }

    /// Every notification still held in the replay ring, oldest first.
    #[must_use]
    pub fn backlog(&self) -> Vec<NotificationEnvelope> {
        self.lock_buffer().iter().cloned().collect()
    }

    /// Returns the last assigned identifier, if any notifications have been published.
    #[must_use]
    pub fn last_id(&self) -> Option<NotificationId> {
        self.lock_buffer().back().map(|item| item.id)
    }

    fn lock_buffer(&self) -> MutexGuard<'_, VecDeque<NotificationEnvelope>> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper that yields notifications either from the replay backlog or
/// from the live broadcast channel.
pub struct NotificationStream {
    backlog: VecDeque<NotificationEnvelope>,
    receiver: Receiver<NotificationEnvelope>,
}

impl NotificationStream {
    /// Receive the next notification, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<NotificationEnvelope> {
        if let Some(item) = self.backlog.pop_front() {
            return Some(item);
        }

        loop {
            match self.receiver.recv().await {
                Ok(item) => return Some(item),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "notification subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
