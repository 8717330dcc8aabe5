use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Info,
    Error,
}

/// A transient message for the user.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub id: Uuid,
    pub text: String,
    pub severity: Severity,
    pub expires_at: DateTime<Utc>,
}

/// Shared queue of notifications; clones push into the same queue.
#[derive(Clone)]
pub struct NotificationQueue {
    inner: Arc<Mutex<VecDeque<Notification>>>,
    ttl: chrono::Duration,
}

impl NotificationQueue {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::seconds(3)),
        }
    }

    fn queue(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, text: impl Into<String>, severity: Severity) -> Uuid {
        let text = text.into();
        match severity {
            Severity::Error => warn!("{text}"),
            Severity::Info => info!("{text}"),
        }
        let notification = Notification {
            id: Uuid::new_v4(),
            text,
            severity,
            expires_at: Utc::now()
                .checked_add_signed(self.ttl)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        };
        let id = notification.id;
        self.queue().push_back(notification);
        id
    }

    pub fn error(&self, text: impl Into<String>) -> Uuid {
        self.push(text, Severity::Error)
    }

    pub fn info(&self, text: impl Into<String>) -> Uuid {
        self.push(text, Severity::Info)
    }

    /// Drops everything that has expired by `now` and returns what is left.
    pub fn active_at(&self, now: DateTime<Utc>) -> Vec<Notification> {
        let mut queue = self.queue();
        queue.retain(|n| n.expires_at > now);
        queue.iter().cloned().collect()
    }

    pub fn drain(&self) -> Vec<Notification> {
        self.queue().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue().is_empty()
    }

    pub fn texts(&self) -> Vec<String> {
        self.queue().iter().map(|n| n.text.clone()).collect()
    }
}
