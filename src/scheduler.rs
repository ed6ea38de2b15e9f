//! Sequential conversion scheduler.
//!
//! A drain takes one runnable item at a time, resolves its effective
//! settings, submits it to the engine and applies the outcome. The item
//! store's processing flag makes the full drain and the selected-subset
//! drain mutually exclusive; only one item is ever `processing`.
//!
//! While a conversion is in flight the scheduler is the only writer of that
//! item's terminal status. [`crate::events::EventApplier`] checks
//! [`ConversionScheduler::current_item`] before applying terminal events.

use crate::engine::{
    ConversionEngine, ConversionRequest, ConversionResult, EngineError, ResizeConfig, CANCELLED_MESSAGE,
};
use crate::notify::{files, Notifier};
use crate::queue::{ItemStore, QueueItem, QueueStats};
use crate::settings::{resolve, ConversionSettings, SettingsStore};
use aether_common::paths::normalized_extension;
use aether_common::{Error, ItemId, MediaType, OutputFormat, ProcessStatus, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Aggregate counts over the whole collection at the end of a drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DrainSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Items converted by this drain.
    pub converted: usize,
    /// True when the drain ended because of [`ConversionScheduler::stop`].
    pub stopped: bool,
}

impl DrainSummary {
    fn from_stats(stats: &QueueStats, converted: usize, stopped: bool) -> Self {
        Self {
            processed: stats.processed(),
            succeeded: stats.completed,
            failed: stats.failed(),
            cancelled: stats.cancelled,
            converted,
            stopped,
        }
    }
}

enum DrainMode {
    Pending,
    Selected(Vec<ItemId>),
}

pub struct ConversionScheduler {
    store: Arc<ItemStore>,
    settings: Arc<SettingsStore>,
    engine: Arc<dyn ConversionEngine>,
    notifier: Arc<Notifier>,
    stop: Mutex<CancellationToken>,
    current: Mutex<Option<ItemId>>,
}

impl ConversionScheduler {
    pub fn new(
        store: Arc<ItemStore>,
        settings: Arc<SettingsStore>,
        engine: Arc<dyn ConversionEngine>,
        notifier: Arc<Notifier>,
    ) -> Self {
        Self {
            store,
            settings,
            engine,
            notifier,
            stop: Mutex::new(CancellationToken::new()),
            current: Mutex::new(None),
        }
    }

    /// Item currently submitted to the engine, if any.
    pub fn current_item(&self) -> Option<ItemId> {
        *self.current.lock()
    }

    pub fn is_running(&self) -> bool {
        self.store.is_processing()
    }

    /// Resume `cancelled` (and with `retry_errors` also failed) items, then
    /// drain every pending item.
    pub async fn start_processing(&self, retry_errors: bool) -> Result<DrainSummary> {
        let _guard = self.store.try_begin_processing().ok_or(Error::AlreadyRunning)?;
        self.store.resume_queue(retry_errors);
        self.run(DrainMode::Pending).await
    }

    /// Drain pending items without resetting anything.
    pub async fn drain(&self) -> Result<DrainSummary> {
        let _guard = self.store.try_begin_processing().ok_or(Error::AlreadyRunning)?;
        self.run(DrainMode::Pending).await
    }

    /// Process the given items in order, skipping any that are not
    /// `pending`, `cancelled` or `error`.
    pub async fn process_selected(&self, ids: Vec<ItemId>) -> Result<DrainSummary> {
        let _guard = self.store.try_begin_processing().ok_or(Error::AlreadyRunning)?;
        self.run(DrainMode::Selected(ids)).await
    }

    /// [`Self::process_selected`] over the store's current selection.
    pub async fn process_selection(&self) -> Result<DrainSummary> {
        let ids = self.store.get_selected_items().into_iter().map(|i| i.id).collect();
        self.process_selected(ids).await
    }

    /// Stop the running drain: no further item is picked up and the item in
    /// flight, if any, gets a best-effort cancel.
    pub async fn stop(&self) {
        self.stop.lock().cancel();
        let in_flight = self.current_item();
        if let Some(id) = in_flight {
            tracing::info!(item_id = %id, "Stopping; cancelling in-flight item");
            if let Err(e) = self.engine.cancel(id).await {
                tracing::warn!(item_id = %id, "Cancel request failed: {}", e);
            }
        } else {
            tracing::info!("Stopping queue");
        }
    }

    /// Cancel one item. Pending items are not touched; only the in-flight
    /// item can be cancelled.
    pub async fn cancel_item(&self, id: ItemId) -> Result<()> {
        if self.current_item() != Some(id) {
            return Err(Error::not_found("running item", id));
        }
        self.engine.cancel(id).await.map_err(Error::from)
    }

    async fn run(&self, mode: DrainMode) -> Result<DrainSummary> {
        let token = {
            let mut slot = self.stop.lock();
            *slot = CancellationToken::new();
            slot.clone()
        };

        tracing::info!("Queue drain started");
        let mut converted = 0;

        match mode {
            DrainMode::Pending => {
                while !token.is_cancelled() {
                    let Some(item) = self.store.get_next_pending_item() else {
                        break;
                    };
                    if self.process_item(item).await {
                        converted += 1;
                    }
                }
            }
            DrainMode::Selected(ids) => {
                for id in ids {
                    if token.is_cancelled() {
                        break;
                    }
                    let Some(item) = self.store.get(id) else {
                        continue;
                    };
                    if !item.is_runnable() {
                        continue;
                    }
                    if item.status != ProcessStatus::Pending {
                        self.store.update_status(id, ProcessStatus::Pending, None);
                    }
                    if let Some(item) = self.store.get(id) {
                        if self.process_item(item).await {
                            converted += 1;
                        }
                    }
                }
            }
        }

        let stopped = token.is_cancelled();
        let summary = DrainSummary::from_stats(&self.store.stats(), converted, stopped);
        tracing::info!(
            processed = summary.processed,
            succeeded = summary.succeeded,
            failed = summary.failed,
            cancelled = summary.cancelled,
            stopped,
            "Queue drain finished"
        );
        self.announce(&summary);
        Ok(summary)
    }

    /// Run one item through the engine. Returns `false` if the item could
    /// not be moved to `processing`.
    async fn process_item(&self, item: QueueItem) -> bool {
        let id = item.id;
        if !self.store.update_status(id, ProcessStatus::Processing, None) {
            return false;
        }
        *self.current.lock() = Some(id);

        let global = self.settings.global();
        let effective = resolve(&global, item.override_settings.as_ref());
        let request = build_request(&item, &effective, &global);
        tracing::debug!(item_id = %id, format = %request.output_format, "Submitting conversion");

        let outcome = self.engine.convert(request).await;
        self.apply_outcome(id, outcome);
        *self.current.lock() = None;
        true
    }

    fn apply_outcome(&self, id: ItemId, outcome: std::result::Result<ConversionResult, EngineError>) {
        match outcome {
            Ok(result) if result.success => match result.output_path {
                Some(path) => {
                    tracing::info!(item_id = %id, output = %path.display(), "Conversion completed");
                    self.store.set_output_path(id, path);
                    self.store.update_status(id, ProcessStatus::Completed, None);
                }
                None => {
                    tracing::warn!(item_id = %id, "Engine reported success without an output path");
                    self.store.update_status(
                        id,
                        ProcessStatus::Error,
                        Some("Conversion finished without an output file".into()),
                    );
                }
            },
            Ok(result) => {
                let message = result
                    .error_message
                    .unwrap_or_else(|| "Conversion failed".to_string());
                tracing::warn!(item_id = %id, "Conversion failed: {}", message);
                self.store.update_status(id, ProcessStatus::Error, Some(message));
            }
            Err(EngineError::Cancelled { .. }) => {
                tracing::info!(item_id = %id, "Conversion cancelled");
                self.store
                    .update_status(id, ProcessStatus::Cancelled, Some(CANCELLED_MESSAGE.to_string()));
            }
            Err(e @ EngineError::Conflict { .. }) => {
                tracing::info!(item_id = %id, "{}", e);
                self.store.update_status(id, ProcessStatus::Conflict, Some(e.to_string()));
            }
            Err(e) => {
                tracing::warn!(item_id = %id, "Conversion failed: {}", e);
                self.store.update_status(id, ProcessStatus::Error, Some(e.to_string()));
            }
        }
    }

    fn announce(&self, summary: &DrainSummary) {
        if summary.processed == 0 {
            return;
        }
        self.notifier.info(format!("{} processed", files(summary.processed)));
        if summary.succeeded > 0 {
            self.notifier.success(format!("{} successful", files(summary.succeeded)));
        }
        if summary.failed > 0 {
            self.notifier.error(format!("{} failed", files(summary.failed)));
        }
        if summary.cancelled > 0 {
            self.notifier.warning(format!("{} cancelled", files(summary.cancelled)));
        }
    }
}

/// Output format for an item: the category's configured format, else the
/// original extension when it can be encoded, else the category default.
pub fn output_format_for(item: &QueueItem, settings: &ConversionSettings) -> String {
    let configured = match item.media_type {
        MediaType::Video => settings.video_format.map(|f| f.extension()),
        MediaType::Image => settings.image_format.map(|f| f.extension()),
        MediaType::Audio => settings.audio_format.map(|f| f.extension()),
    };
    if let Some(ext) = configured {
        return ext.to_string();
    }

    let original = normalized_extension(&item.input_path);
    if original.parse::<OutputFormat>().is_ok() {
        original
    } else {
        item.media_type.default_output_format().to_string()
    }
}

/// Engine request for `item` under its effective settings. The conflict
/// mode always comes from the globals.
pub fn build_request(
    item: &QueueItem,
    effective: &ConversionSettings,
    global: &ConversionSettings,
) -> ConversionRequest {
    let resize_config = effective.resize_enabled.then(|| ResizeConfig {
        width: effective.resize_width,
        height: effective.resize_height,
        mode: effective.resize_mode,
        background_color: effective.background_color,
    });

    ConversionRequest {
        id: item.id,
        input_path: item.input_path.clone(),
        output_format: output_format_for(item, effective),
        quality_percent: effective.quality_percent,
        strip_metadata: effective.strip_metadata,
        is_muted: effective.is_muted,
        resize_config,
        naming_config: effective.naming_config.clone(),
        output_directory: effective.output_directory.clone(),
        conflict_mode: global.conflict_mode,
        processing_enabled: effective.processing_enabled,
        max_bitrate: effective.max_bitrate,
    }
}
