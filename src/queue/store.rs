use super::{FileDescriptor, QueueEvent, QueueItem, QueueStats};
use crate::settings::{has_effective_override, ConversionSettings, SettingsOverride};
use crate::storage::{KeyValueStore, QUEUE_KEY};
use aether_common::{ItemId, ProcessStatus, Result, ThumbnailStatus};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Message stored on items found mid-conversion when a session is loaded.
pub const INTERRUPTED_MESSAGE: &str = "Interrupted";

/// Result of [`ItemStore::add_items`].
#[derive(Debug, Clone, Default)]
pub struct AddOutcome {
    pub added: usize,
    /// Inputs whose path was already present (or repeated in the batch).
    pub skipped: usize,
    pub new_items: Vec<QueueItem>,
}

#[derive(Debug, Default)]
struct QueueState {
    items: Vec<QueueItem>,
    /// Selection in the order ids were selected.
    selected: Vec<ItemId>,
    expanded: Option<ItemId>,
    last_clicked: Option<ItemId>,
    has_persisted_queue: bool,
    session_restore_handled: bool,
}

impl QueueState {
    fn find_mut(&mut self, id: ItemId) -> Option<&mut QueueItem> {
        self.items.iter_mut().find(|i| i.id == id)
    }

    fn index_of(&self, id: ItemId) -> Option<usize> {
        self.items.iter().position(|i| i.id == id)
    }

    fn contains(&self, id: ItemId) -> bool {
        self.index_of(id).is_some()
    }
}

#[derive(Deserialize)]
struct PersistedQueue {
    items: Vec<QueueItem>,
}

/// Sole owner of the queue items, their order, selection and session flags.
///
/// Item mutations are synchronous and write a full snapshot of the
/// collection to the key-value store. Selection and expansion state are
/// never persisted.
pub struct ItemStore {
    state: RwLock<QueueState>,
    processing: AtomicBool,
    storage: Arc<dyn KeyValueStore>,
    event_tx: broadcast::Sender<QueueEvent>,
}

/// Holds the global processing flag; dropping it clears the flag.
#[must_use = "the processing flag is released when the guard is dropped"]
pub struct ProcessingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl ItemStore {
    pub fn new(storage: Arc<dyn KeyValueStore>) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(256);
        Arc::new(Self {
            state: RwLock::new(QueueState::default()),
            processing: AtomicBool::new(false),
            storage,
            event_tx,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.event_tx.subscribe()
    }

    fn broadcast(&self, event: QueueEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("No subscribers for queue event");
        }
    }

    // ------------------------------------------------------------------
    // Processing flag
    // ------------------------------------------------------------------

    /// Claim the global processing flag. `None` if a drain already holds it.
    pub fn try_begin_processing(&self) -> Option<ProcessingGuard<'_>> {
        self.processing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| ProcessingGuard {
                flag: &self.processing,
            })
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    // ------------------------------------------------------------------
    // Collection
    // ------------------------------------------------------------------

    /// Append files not already present, in input order.
    pub fn add_items(&self, files: Vec<FileDescriptor>) -> AddOutcome {
        let total = files.len();
        let new_items: Vec<QueueItem> = {
            let mut state = self.state.write();
            let mut seen: HashSet<PathBuf> =
                state.items.iter().map(|i| i.input_path.clone()).collect();

            let new_items: Vec<QueueItem> = files
                .into_iter()
                .filter(|f| seen.insert(f.path.clone()))
                .map(QueueItem::new)
                .collect();
            state.items.extend(new_items.iter().cloned());
            new_items
        };

        let outcome = AddOutcome {
            added: new_items.len(),
            skipped: total - new_items.len(),
            new_items,
        };

        if outcome.added > 0 {
            tracing::debug!(added = outcome.added, skipped = outcome.skipped, "Items added");
            self.broadcast(QueueEvent::ItemsAdded {
                ids: outcome.new_items.iter().map(|i| i.id).collect(),
            });
            self.persist();
        }
        outcome
    }

    /// Delete items by id. Does nothing while processing is running.
    pub fn remove_items(&self, ids: &[ItemId]) -> Vec<ItemId> {
        if self.is_processing() {
            tracing::debug!("Ignoring remove while processing");
            return Vec::new();
        }

        let wanted: HashSet<ItemId> = ids.iter().copied().collect();
        let removed: Vec<ItemId> = {
            let mut state = self.state.write();
            let removed: Vec<ItemId> = state
                .items
                .iter()
                .filter(|i| wanted.contains(&i.id))
                .map(|i| i.id)
                .collect();
            state.items.retain(|i| !wanted.contains(&i.id));
            state.selected.retain(|id| !wanted.contains(id));
            if state.expanded.is_some_and(|id| wanted.contains(&id)) {
                state.expanded = None;
            }
            removed
        };

        if !removed.is_empty() {
            self.broadcast(QueueEvent::ItemsRemoved {
                ids: removed.clone(),
            });
            self.persist();
        }
        removed
    }

    /// Remove every item. Does nothing while processing is running.
    pub fn clear_queue(&self) -> Vec<ItemId> {
        if self.is_processing() {
            tracing::debug!("Ignoring clear while processing");
            return Vec::new();
        }
        let removed = self.take_all_items();
        self.broadcast(QueueEvent::Cleared);
        self.persist();
        removed
    }

    fn take_all_items(&self) -> Vec<ItemId> {
        let mut state = self.state.write();
        state.selected.clear();
        state.expanded = None;
        state.last_clicked = None;
        std::mem::take(&mut state.items)
            .into_iter()
            .map(|i| i.id)
            .collect()
    }

    // ------------------------------------------------------------------
    // Selection
    // ------------------------------------------------------------------

    /// Single-select, or toggle when `multi` is set.
    pub fn select_item(&self, id: ItemId, multi: bool) {
        let mut state = self.state.write();
        if !state.contains(id) {
            return;
        }
        if multi {
            toggle(&mut state.selected, id);
        } else {
            state.selected = vec![id];
        }
        state.last_clicked = Some(id);
    }

    pub fn toggle_selection(&self, id: ItemId) {
        let mut state = self.state.write();
        if state.contains(id) {
            toggle(&mut state.selected, id);
        }
    }

    /// Add the inclusive index range between two items to the selection.
    pub fn select_range(&self, from: ItemId, to: ItemId) {
        let mut state = self.state.write();
        let (Some(a), Some(b)) = (state.index_of(from), state.index_of(to)) else {
            return;
        };
        let (start, end) = (a.min(b), a.max(b));
        let range: Vec<ItemId> = state.items[start..=end].iter().map(|i| i.id).collect();

        let mut present: HashSet<ItemId> = state.selected.iter().copied().collect();
        for id in range {
            if present.insert(id) {
                state.selected.push(id);
            }
        }
        state.last_clicked = Some(to);
    }

    pub fn select_all(&self) {
        let mut state = self.state.write();
        state.selected = state.items.iter().map(|i| i.id).collect();
    }

    pub fn deselect_all(&self) {
        self.state.write().selected.clear();
    }

    pub fn selected_ids(&self) -> Vec<ItemId> {
        self.state.read().selected.clone()
    }

    pub fn last_clicked_id(&self) -> Option<ItemId> {
        self.state.read().last_clicked
    }

    pub fn set_expanded(&self, id: Option<ItemId>) {
        let mut state = self.state.write();
        state.expanded = id.filter(|id| state.contains(*id));
    }

    pub fn expanded_id(&self) -> Option<ItemId> {
        self.state.read().expanded
    }

    // ------------------------------------------------------------------
    // Item updates
    // ------------------------------------------------------------------

    /// Apply a lifecycle transition. Disallowed transitions are ignored and
    /// reported as `false`.
    pub fn update_status(&self, id: ItemId, status: ProcessStatus, message: Option<String>) -> bool {
        let applied = {
            let mut state = self.state.write();
            match state.find_mut(id) {
                Some(item) => {
                    let from = item.status;
                    let applied = item.transition(status, message.clone());
                    if !applied {
                        tracing::debug!(item_id = %id, %from, to = %status, "Ignoring transition");
                    }
                    applied
                }
                None => false,
            }
        };

        if applied {
            self.broadcast(QueueEvent::StatusChanged {
                id,
                status,
                message,
            });
            self.persist();
        }
        applied
    }

    /// Record conversion progress. Only items in `processing` accept it.
    pub fn update_progress(&self, id: ItemId, progress: u8) -> bool {
        let progress = progress.min(100);
        let applied = {
            let mut state = self.state.write();
            match state.find_mut(id) {
                Some(item) if item.status == ProcessStatus::Processing => {
                    item.progress = progress;
                    true
                }
                _ => false,
            }
        };

        if applied {
            self.broadcast(QueueEvent::Progress { id, progress });
            self.persist();
        }
        applied
    }

    pub fn set_output_path(&self, id: ItemId, path: PathBuf) {
        self.mutate(id, |item| item.output_path = Some(path));
    }

    pub fn set_thumbnail(&self, id: ItemId, path: PathBuf) {
        self.mutate(id, |item| {
            item.thumbnail_path = Some(path);
            item.thumbnail_status = ThumbnailStatus::Loaded;
        });
    }

    /// Mark a thumbnail as loading. Only applies from `pending`.
    pub fn set_thumbnail_loading(&self, id: ItemId) {
        self.mutate(id, |item| {
            if item.thumbnail_status == ThumbnailStatus::Pending {
                item.thumbnail_status = ThumbnailStatus::Loading;
            }
        });
    }

    pub fn set_thumbnail_error(&self, id: ItemId) {
        self.mutate(id, |item| item.thumbnail_status = ThumbnailStatus::Error);
    }

    /// Flag every item whose thumbnail path is in `paths`.
    pub fn mark_thumbnails_missing(&self, paths: &HashSet<PathBuf>) -> usize {
        if paths.is_empty() {
            return 0;
        }
        let count = {
            let mut state = self.state.write();
            let mut count = 0;
            for item in state.items.iter_mut() {
                if item.thumbnail_path.as_ref().is_some_and(|p| paths.contains(p)) {
                    item.thumbnail_status = ThumbnailStatus::Error;
                    count += 1;
                }
            }
            count
        };
        if count > 0 {
            self.persist();
        }
        count
    }

    // ------------------------------------------------------------------
    // Overrides
    // ------------------------------------------------------------------

    /// Shallow-merge `patch` into the item's override.
    pub fn merge_override(&self, id: ItemId, patch: &SettingsOverride) {
        self.mutate(id, |item| {
            item.override_settings
                .get_or_insert_with(SettingsOverride::default)
                .merge(patch);
        });
    }

    /// Replace the item's override wholesale. `None` clears it.
    pub fn replace_override(&self, id: ItemId, overrides: Option<SettingsOverride>) {
        self.mutate(id, |item| item.override_settings = overrides);
    }

    pub fn clear_override(&self, id: ItemId) {
        self.replace_override(id, None);
    }

    pub fn clear_all_overrides(&self) {
        {
            let mut state = self.state.write();
            for item in state.items.iter_mut() {
                item.override_settings = None;
            }
        }
        self.persist();
    }

    /// Items whose override differs from `global`.
    pub fn override_count(&self, global: &ConversionSettings) -> usize {
        self.state
            .read()
            .items
            .iter()
            .filter(|i| has_effective_override(i.override_settings.as_ref(), global))
            .count()
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get(&self, id: ItemId) -> Option<QueueItem> {
        self.state.read().items.iter().find(|i| i.id == id).cloned()
    }

    /// Snapshot of the collection in canonical order.
    pub fn items(&self) -> Vec<QueueItem> {
        self.state.read().items.clone()
    }

    pub fn len(&self) -> usize {
        self.state.read().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().items.is_empty()
    }

    pub fn contains_path(&self, path: &std::path::Path) -> bool {
        self.state.read().items.iter().any(|i| i.input_path == path)
    }

    /// First `pending` item in insertion order.
    pub fn get_next_pending_item(&self) -> Option<QueueItem> {
        self.state
            .read()
            .items
            .iter()
            .find(|i| i.status == ProcessStatus::Pending)
            .cloned()
    }

    /// Selected items in selection order.
    pub fn get_selected_items(&self) -> Vec<QueueItem> {
        let state = self.state.read();
        state
            .selected
            .iter()
            .filter_map(|id| state.items.iter().find(|i| i.id == *id))
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats::from_items(self.state.read().items.iter())
    }

    // ------------------------------------------------------------------
    // Resume / retry
    // ------------------------------------------------------------------

    /// Move `cancelled` items back to `pending`; with `retry_errors` also
    /// `error` items. `conflict` items are left alone.
    pub fn resume_queue(&self, retry_errors: bool) -> usize {
        self.reset_matching(|status| match status {
            ProcessStatus::Cancelled => true,
            ProcessStatus::Error => retry_errors,
            _ => false,
        })
    }

    /// Move `completed` items back to `pending`.
    pub fn retry_completed(&self) -> usize {
        self.reset_matching(|status| status == ProcessStatus::Completed)
    }

    fn reset_matching(&self, matches: impl Fn(ProcessStatus) -> bool) -> usize {
        let reset: Vec<ItemId> = {
            let mut state = self.state.write();
            state
                .items
                .iter_mut()
                .filter(|i| matches(i.status))
                .filter_map(|i| i.transition(ProcessStatus::Pending, None).then_some(i.id))
                .collect()
        };

        for id in &reset {
            self.broadcast(QueueEvent::StatusChanged {
                id: *id,
                status: ProcessStatus::Pending,
                message: None,
            });
        }
        if !reset.is_empty() {
            tracing::info!(count = reset.len(), "Items reset to pending");
            self.persist();
        }
        reset.len()
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    pub fn has_persisted_queue(&self) -> bool {
        self.state.read().has_persisted_queue
    }

    pub fn session_restore_handled(&self) -> bool {
        self.state.read().session_restore_handled
    }

    /// Replace the collection with the persisted snapshot.
    ///
    /// Items left in `processing` by an abrupt exit become `cancelled`.
    /// Returns the number of loaded items.
    pub fn load_snapshot(&self) -> Result<usize> {
        let Some(raw) = self.storage.get(QUEUE_KEY)? else {
            return Ok(0);
        };
        let persisted: PersistedQueue = serde_json::from_str(&raw)?;

        let mut interrupted = 0;
        let mut items = persisted.items;
        for item in items.iter_mut() {
            if item.status == ProcessStatus::Processing {
                item.status = ProcessStatus::Cancelled;
                item.error_message = Some(INTERRUPTED_MESSAGE.to_string());
                interrupted += 1;
            }
        }
        if interrupted > 0 {
            tracing::info!("Reset {} interrupted items from previous session", interrupted);
        }

        let count = items.len();
        {
            let mut state = self.state.write();
            state.items = items;
            state.selected.clear();
            state.expanded = None;
            state.has_persisted_queue = count > 0;
            state.session_restore_handled = false;
        }
        if interrupted > 0 {
            self.persist();
        }
        Ok(count)
    }

    /// Keep the loaded items and close the restore prompt.
    pub fn confirm_session_restore(&self) {
        let mut state = self.state.write();
        state.session_restore_handled = true;
        state.has_persisted_queue = false;
    }

    /// Drop the loaded items and close the restore prompt.
    pub fn discard_session(&self) -> Vec<ItemId> {
        let removed = self.take_all_items();
        {
            let mut state = self.state.write();
            state.has_persisted_queue = false;
            state.session_restore_handled = true;
        }
        self.broadcast(QueueEvent::Cleared);
        self.persist();
        removed
    }

    // ------------------------------------------------------------------
    // Persistence
    // ------------------------------------------------------------------

    fn mutate(&self, id: ItemId, f: impl FnOnce(&mut QueueItem)) -> bool {
        let found = {
            let mut state = self.state.write();
            match state.find_mut(id) {
                Some(item) => {
                    f(item);
                    true
                }
                None => false,
            }
        };
        if found {
            self.persist();
        }
        found
    }

    fn persist(&self) {
        if let Err(e) = self.save_snapshot() {
            tracing::error!("Failed to persist queue: {}", e);
        }
    }

    fn save_snapshot(&self) -> Result<()> {
        let json = {
            let state = self.state.read();
            serde_json::to_string(&PersistedQueueRef {
                items: &state.items,
            })?
        };
        self.storage.set(QUEUE_KEY, &json)
    }
}

#[derive(Serialize)]
struct PersistedQueueRef<'a> {
    items: &'a [QueueItem],
}

fn toggle(selected: &mut Vec<ItemId>, id: ItemId) {
    match selected.iter().position(|s| *s == id) {
        Some(pos) => {
            selected.remove(pos);
        }
        None => selected.push(id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::FieldOverride;
    use crate::storage::MemoryStore;
    use aether_common::MediaType;

    fn file(name: &str) -> FileDescriptor {
        FileDescriptor {
            path: PathBuf::from(format!("/media/{name}")),
            name: name.to_string(),
            size: 1024,
            media_type: MediaType::Video,
        }
    }

    fn store_with(names: &[&str]) -> (Arc<ItemStore>, Vec<ItemId>) {
        let store = ItemStore::new(MemoryStore::new());
        let outcome = store.add_items(names.iter().map(|n| file(n)).collect());
        let ids = outcome.new_items.iter().map(|i| i.id).collect();
        (store, ids)
    }

    #[test]
    fn test_add_items_dedups_by_path() {
        let (store, _) = store_with(&["a.mp4", "b.mp4"]);

        let outcome = store.add_items(vec![file("a.mp4"), file("c.mp4"), file("c.mp4")]);
        assert_eq!(outcome.added, 1);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(store.len(), 3);

        let names: Vec<_> = store.items().into_iter().map(|i| i.file_name).collect();
        assert_eq!(names, vec!["a.mp4", "b.mp4", "c.mp4"]);
    }

    #[test]
    fn test_remove_prunes_selection_and_expansion() {
        let (store, ids) = store_with(&["a.mp4", "b.mp4", "c.mp4"]);
        store.select_all();
        store.set_expanded(Some(ids[1]));

        let removed = store.remove_items(&[ids[1]]);
        assert_eq!(removed, vec![ids[1]]);
        assert_eq!(store.selected_ids(), vec![ids[0], ids[2]]);
        assert_eq!(store.expanded_id(), None);
    }

    #[test]
    fn test_remove_and_clear_blocked_while_processing() {
        let (store, ids) = store_with(&["a.mp4"]);
        let guard = store.try_begin_processing().unwrap();

        assert!(store.remove_items(&ids).is_empty());
        assert!(store.clear_queue().is_empty());
        assert_eq!(store.len(), 1);

        drop(guard);
        assert_eq!(store.clear_queue(), ids);
        assert!(store.is_empty());
    }

    #[test]
    fn test_processing_flag_is_exclusive() {
        let (store, _) = store_with(&[]);
        let guard = store.try_begin_processing();
        assert!(guard.is_some());
        assert!(store.try_begin_processing().is_none());
        drop(guard);
        assert!(!store.is_processing());
        assert!(store.try_begin_processing().is_some());
    }

    #[test]
    fn test_selection_modes() {
        let (store, ids) = store_with(&["a.mp4", "b.mp4", "c.mp4", "d.mp4"]);

        store.select_item(ids[0], false);
        assert_eq!(store.selected_ids(), vec![ids[0]]);

        store.select_item(ids[2], true);
        assert_eq!(store.selected_ids(), vec![ids[0], ids[2]]);
        store.select_item(ids[0], true);
        assert_eq!(store.selected_ids(), vec![ids[2]]);

        store.toggle_selection(ids[3]);
        assert_eq!(store.selected_ids(), vec![ids[2], ids[3]]);

        store.deselect_all();
        assert!(store.selected_ids().is_empty());

        // Unknown ids are ignored
        store.select_item(ItemId::new(), false);
        assert!(store.selected_ids().is_empty());
    }

    #[test]
    fn test_select_range_either_direction() {
        let (store, ids) = store_with(&["a.mp4", "b.mp4", "c.mp4", "d.mp4"]);

        store.select_range(ids[3], ids[1]);
        let mut selected = store.selected_ids();
        selected.sort_by_key(|id| ids.iter().position(|x| x == id));
        assert_eq!(selected, vec![ids[1], ids[2], ids[3]]);
        assert_eq!(store.last_clicked_id(), Some(ids[1]));

        store.deselect_all();
        store.select_range(ids[0], ids[1]);
        assert_eq!(store.selected_ids(), vec![ids[0], ids[1]]);
    }

    #[test]
    fn test_update_status_and_progress() {
        let (store, ids) = store_with(&["a.mp4"]);
        let id = ids[0];

        // Progress is only accepted while processing
        assert!(!store.update_progress(id, 10));
        assert!(!store.update_status(id, ProcessStatus::Completed, None));

        assert!(store.update_status(id, ProcessStatus::Processing, None));
        assert!(store.update_progress(id, 150));
        assert_eq!(store.get(id).unwrap().progress, 100);
        assert!(store.update_progress(id, 40));

        assert!(store.update_status(id, ProcessStatus::Completed, None));
        let item = store.get(id).unwrap();
        assert_eq!(item.progress, 100);
        assert!(!store.update_progress(id, 20));
    }

    #[test]
    fn test_thumbnail_loading_only_from_pending() {
        let (store, ids) = store_with(&["a.mp4"]);
        let id = ids[0];

        store.set_thumbnail_loading(id);
        assert_eq!(store.get(id).unwrap().thumbnail_status, ThumbnailStatus::Loading);

        store.set_thumbnail(id, PathBuf::from("/tmp/t.jpg"));
        store.set_thumbnail_loading(id);
        let item = store.get(id).unwrap();
        assert_eq!(item.thumbnail_status, ThumbnailStatus::Loaded);
        assert_eq!(item.thumbnail_path, Some(PathBuf::from("/tmp/t.jpg")));
    }

    #[test]
    fn test_resume_and_retry() {
        let (store, ids) = store_with(&["a.mp4", "b.mp4", "c.mp4", "d.mp4"]);
        let finish = |id, status| {
            store.update_status(id, ProcessStatus::Processing, None);
            store.update_status(id, status, Some("msg".into()));
        };
        finish(ids[0], ProcessStatus::Cancelled);
        finish(ids[1], ProcessStatus::Error);
        finish(ids[2], ProcessStatus::Completed);
        store.update_status(ids[3], ProcessStatus::Processing, None);

        assert_eq!(store.resume_queue(false), 1);
        assert_eq!(store.get(ids[0]).unwrap().status, ProcessStatus::Pending);
        assert_eq!(store.get(ids[1]).unwrap().status, ProcessStatus::Error);

        assert_eq!(store.resume_queue(true), 1);
        let item = store.get(ids[1]).unwrap();
        assert_eq!(item.status, ProcessStatus::Pending);
        assert_eq!(item.error_message, None);
        assert_eq!(item.progress, 0);

        assert_eq!(store.get(ids[2]).unwrap().status, ProcessStatus::Completed);
        assert_eq!(store.get(ids[3]).unwrap().status, ProcessStatus::Processing);

        assert_eq!(store.retry_completed(), 1);
        assert_eq!(store.get(ids[2]).unwrap().status, ProcessStatus::Pending);
    }

    #[test]
    fn test_conflict_survives_resume() {
        let (store, ids) = store_with(&["a.mp4"]);
        store.update_status(ids[0], ProcessStatus::Processing, None);
        store.update_status(ids[0], ProcessStatus::Conflict, Some("exists".into()));

        assert_eq!(store.resume_queue(true), 0);
        assert_eq!(store.retry_completed(), 0);
        let item = store.get(ids[0]).unwrap();
        assert_eq!(item.status, ProcessStatus::Conflict);
        assert_eq!(item.error_message.as_deref(), Some("exists"));
    }

    #[test]
    fn test_override_setters() {
        let (store, ids) = store_with(&["a.mp4", "b.mp4"]);
        let global = ConversionSettings::default();

        store.merge_override(
            ids[0],
            &SettingsOverride {
                quality_percent: FieldOverride::Set(50),
                ..Default::default()
            },
        );
        store.merge_override(
            ids[0],
            &SettingsOverride {
                is_muted: FieldOverride::Set(true),
                ..Default::default()
            },
        );
        let o = store.get(ids[0]).unwrap().override_settings.unwrap();
        assert_eq!(o.quality_percent, FieldOverride::Set(50));
        assert_eq!(o.is_muted, FieldOverride::Set(true));

        store.replace_override(
            ids[1],
            Some(SettingsOverride {
                quality_percent: FieldOverride::Set(80),
                ..Default::default()
            }),
        );
        // Equal to global, so not effective
        assert_eq!(store.override_count(&global), 1);

        store.clear_override(ids[0]);
        assert!(store.get(ids[0]).unwrap().override_settings.is_none());

        store.clear_all_overrides();
        assert!(store.items().iter().all(|i| i.override_settings.is_none()));
    }

    #[test]
    fn test_snapshot_round_trip_resets_interrupted() {
        let storage = MemoryStore::new();
        let store = ItemStore::new(storage.clone());
        let ids: Vec<_> = store
            .add_items(vec![file("a.mp4"), file("b.mp4")])
            .new_items
            .iter()
            .map(|i| i.id)
            .collect();
        store.update_status(ids[0], ProcessStatus::Processing, None);
        store.select_all();

        let reloaded = ItemStore::new(storage);
        assert_eq!(reloaded.load_snapshot().unwrap(), 2);
        assert!(reloaded.has_persisted_queue());
        assert!(!reloaded.session_restore_handled());
        assert!(reloaded.selected_ids().is_empty());

        let item = reloaded.get(ids[0]).unwrap();
        assert_eq!(item.status, ProcessStatus::Cancelled);
        assert_eq!(item.error_message.as_deref(), Some(INTERRUPTED_MESSAGE));
    }

    #[test]
    fn test_events_are_broadcast() {
        let (store, _) = store_with(&[]);
        let mut rx = store.subscribe();
        let outcome = store.add_items(vec![file("a.mp4")]);
        let id = outcome.new_items[0].id;
        store.update_status(id, ProcessStatus::Processing, None);

        assert!(matches!(rx.try_recv().unwrap(), QueueEvent::ItemsAdded { ids } if ids == vec![id]));
        assert!(matches!(
            rx.try_recv().unwrap(),
            QueueEvent::StatusChanged { status: ProcessStatus::Processing, .. }
        ));
    }
}
