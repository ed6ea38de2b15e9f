//! Thumbnail generation and cleanup for queue items.

use crate::engine::{ConversionEngine, ThumbnailRequest};
use crate::queue::ItemStore;
use aether_common::{ItemId, MediaType, ThumbnailStatus};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ThumbnailReport {
    pub loaded: usize,
    pub failed: usize,
}

pub struct ThumbnailService {
    store: Arc<ItemStore>,
    engine: Arc<dyn ConversionEngine>,
    chunk_size: usize,
}

impl ThumbnailService {
    pub fn new(store: Arc<ItemStore>, engine: Arc<dyn ConversionEngine>, chunk_size: usize) -> Self {
        Self {
            store,
            engine,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Generate thumbnails for every item whose thumbnail is still `pending`.
    ///
    /// Audio has no thumbnail and is flagged `error` without an engine call.
    pub async fn generate_pending(&self) -> ThumbnailReport {
        let mut report = ThumbnailReport::default();
        let mut requests = Vec::new();

        for item in self.store.items() {
            if item.thumbnail_status != ThumbnailStatus::Pending {
                continue;
            }
            if item.media_type == MediaType::Audio {
                self.store.set_thumbnail_error(item.id);
                report.failed += 1;
                continue;
            }
            self.store.set_thumbnail_loading(item.id);
            requests.push(ThumbnailRequest {
                id: item.id,
                input_path: item.input_path,
                media_type: item.media_type,
            });
        }

        for chunk in requests.chunks(self.chunk_size) {
            match self.engine.generate_thumbnails_batch(chunk.to_vec()).await {
                Ok(results) => {
                    let mut answered = Vec::with_capacity(results.len());
                    for result in results {
                        answered.push(result.id);
                        match (result.success, result.thumbnail_path) {
                            (true, Some(path)) => {
                                self.store.set_thumbnail(result.id, path);
                                report.loaded += 1;
                            }
                            _ => {
                                if let Some(message) = result.error_message {
                                    tracing::debug!(item_id = %result.id, "Thumbnail failed: {}", message);
                                }
                                self.store.set_thumbnail_error(result.id);
                                report.failed += 1;
                            }
                        }
                    }
                    for request in chunk.iter().filter(|r| !answered.contains(&r.id)) {
                        self.store.set_thumbnail_error(request.id);
                        report.failed += 1;
                    }
                }
                Err(e) => {
                    tracing::warn!("Thumbnail batch of {} failed: {}", chunk.len(), e);
                    for request in chunk {
                        self.store.set_thumbnail_error(request.id);
                    }
                    report.failed += chunk.len();
                }
            }
        }

        if report.loaded + report.failed > 0 {
            tracing::debug!(loaded = report.loaded, failed = report.failed, "Thumbnails generated");
        }
        report
    }

    /// Best-effort deletion of thumbnails belonging to removed items.
    pub async fn forget(&self, ids: &[ItemId]) {
        if ids.is_empty() {
            return;
        }
        match self.engine.delete_thumbnails(ids).await {
            Ok(failed) if !failed.is_empty() => {
                tracing::debug!("Failed to delete {} thumbnails", failed.len());
            }
            Ok(_) => {}
            Err(e) => tracing::warn!("Thumbnail deletion failed: {}", e),
        }
    }
}
