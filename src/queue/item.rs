use crate::settings::SettingsOverride;
use aether_common::{ItemId, MediaType, ProcessStatus, ThumbnailStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Validated source file handed to [`super::ItemStore::add_items`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub media_type: MediaType,
}

/// One file tracked by the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: ItemId,
    pub input_path: PathBuf,
    pub file_name: String,
    pub file_size: u64,
    pub media_type: MediaType,
    #[serde(default)]
    pub thumbnail_path: Option<PathBuf>,
    #[serde(default)]
    pub thumbnail_status: ThumbnailStatus,
    #[serde(default)]
    pub status: ProcessStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_settings: Option<SettingsOverride>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub output_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(file: FileDescriptor) -> Self {
        Self {
            id: ItemId::new(),
            input_path: file.path,
            file_name: file.name,
            file_size: file.size,
            media_type: file.media_type,
            thumbnail_path: None,
            thumbnail_status: ThumbnailStatus::Pending,
            status: ProcessStatus::Pending,
            progress: 0,
            override_settings: None,
            error_message: None,
            output_path: None,
            created_at: Utc::now(),
        }
    }

    /// Apply a lifecycle transition. Returns false (and changes nothing)
    /// when the transition is not allowed.
    pub fn transition(&mut self, next: ProcessStatus, message: Option<String>) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        self.error_message = message;
        match next {
            ProcessStatus::Completed => self.progress = 100,
            ProcessStatus::Pending => self.progress = 0,
            _ => {}
        }
        true
    }

    /// Eligible for a selected-subset drain.
    pub fn is_runnable(&self) -> bool {
        matches!(
            self.status,
            ProcessStatus::Pending | ProcessStatus::Cancelled | ProcessStatus::Error
        )
    }
}

/// Aggregate status counts over a collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub error: usize,
    pub cancelled: usize,
    pub conflict: usize,
}

impl QueueStats {
    pub fn from_items<'a>(items: impl IntoIterator<Item = &'a QueueItem>) -> Self {
        let mut stats = Self::default();
        for item in items {
            stats.total += 1;
            match item.status {
                ProcessStatus::Pending => stats.pending += 1,
                ProcessStatus::Processing => stats.processing += 1,
                ProcessStatus::Completed => stats.completed += 1,
                ProcessStatus::Error => stats.error += 1,
                ProcessStatus::Cancelled => stats.cancelled += 1,
                ProcessStatus::Conflict => stats.conflict += 1,
            }
        }
        stats
    }

    /// Items that reached a terminal state.
    pub fn processed(&self) -> usize {
        self.completed + self.failed() + self.cancelled
    }

    /// Errors plus refused conflicts.
    pub fn failed(&self) -> usize {
        self.error + self.conflict
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> QueueItem {
        QueueItem::new(FileDescriptor {
            path: PathBuf::from("/media/a.mp4"),
            name: "a.mp4".into(),
            size: 10,
            media_type: MediaType::Video,
        })
    }

    #[test]
    fn test_new_item_defaults() {
        let item = item();
        assert_eq!(item.status, ProcessStatus::Pending);
        assert_eq!(item.thumbnail_status, ThumbnailStatus::Pending);
        assert_eq!(item.progress, 0);
        assert!(item.override_settings.is_none());
    }

    #[test]
    fn test_transition_rules() {
        let mut item = item();
        assert!(!item.transition(ProcessStatus::Completed, None));
        assert!(item.transition(ProcessStatus::Processing, None));
        item.progress = 40;
        assert!(item.transition(ProcessStatus::Completed, None));
        assert_eq!(item.progress, 100);

        // Late cancel after completion is ignored
        assert!(!item.transition(ProcessStatus::Cancelled, Some("late".into())));
        assert_eq!(item.status, ProcessStatus::Completed);
        assert_eq!(item.error_message, None);
    }

    #[test]
    fn test_reset_to_pending_clears_progress_and_message() {
        let mut item = item();
        item.transition(ProcessStatus::Processing, None);
        item.progress = 30;
        item.transition(ProcessStatus::Error, Some("boom".into()));
        assert_eq!(item.error_message.as_deref(), Some("boom"));

        assert!(item.transition(ProcessStatus::Pending, None));
        assert_eq!(item.progress, 0);
        assert_eq!(item.error_message, None);
    }

    #[test]
    fn test_stats() {
        let mut items = vec![item(), item(), item(), item()];
        items[0].status = ProcessStatus::Completed;
        items[1].status = ProcessStatus::Error;
        items[2].status = ProcessStatus::Conflict;

        let stats = QueueStats::from_items(&items);
        assert_eq!(stats.total, 4);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.processed(), 3);
        assert_eq!(stats.failed(), 2);
    }

    #[test]
    fn test_item_serialization_omits_empty_override() {
        let json = serde_json::to_value(item()).unwrap();
        assert!(json.get("override_settings").is_none());
        assert_eq!(json["status"], "pending");
        assert_eq!(json["media_type"], "video");
    }
}
