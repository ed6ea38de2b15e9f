//! Transient user notifications.
//!
//! [`Notifier`] wraps a `tokio::sync::broadcast` channel with a bounded
//! ring buffer of recent notices so that a late subscriber (or the CLI after
//! a command returns) can still show them.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tokio::sync::broadcast;

/// Maximum number of notices retained in the ring buffer.
const MAX_RECENT_NOTICES: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl fmt::Display for NoticeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Broadcast bus for [`Notice`]s.
pub struct Notifier {
    tx: broadcast::Sender<Notice>,
    recent: RwLock<VecDeque<Notice>>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            recent: RwLock::new(VecDeque::with_capacity(MAX_RECENT_NOTICES)),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notice> {
        self.tx.subscribe()
    }

    pub fn notify(&self, level: NoticeLevel, message: impl Into<String>) {
        let notice = Notice {
            level,
            message: message.into(),
            timestamp: Utc::now(),
        };
        tracing::debug!(level = %notice.level, "{}", notice.message);

        {
            let mut recent = self.recent.write();
            if recent.len() >= MAX_RECENT_NOTICES {
                recent.pop_back();
            }
            recent.push_front(notice.clone());
        }

        // No subscribers is fine.
        let _ = self.tx.send(notice);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Info, message);
    }

    pub fn success(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Success, message);
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Warning, message);
    }

    pub fn error(&self, message: impl Into<String>) {
        self.notify(NoticeLevel::Error, message);
    }

    /// The `n` most recent notices, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Notice> {
        let recent = self.recent.read();
        let mut out: Vec<Notice> = recent.iter().take(n).cloned().collect();
        out.reverse();
        out
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(64)
    }
}

/// `"1 file"` / `"3 files"`.
pub(crate) fn files(n: usize) -> String {
    if n == 1 {
        "1 file".to_string()
    } else {
        format!("{n} files")
    }
}
