//! Session restore-or-discard handshake.
//!
//! The item store snapshots itself on every mutation. At startup
//! [`SessionManager::load`] reads the snapshot back; a non-empty one either
//! restores silently (auto-restore preference) or waits for
//! [`SessionManager::restore`] / [`SessionManager::discard`].

use crate::config::IngestConfig;
use crate::engine::ConversionEngine;
use crate::notify::{files, Notifier};
use crate::queue::ItemStore;
use crate::settings::SettingsStore;
use aether_common::ThumbnailStatus;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// What [`SessionManager::load`] found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStatus {
    pub loaded: usize,
    /// A previous session exists and awaits restore or discard.
    pub awaiting_decision: bool,
    pub auto_restored: bool,
}

pub struct SessionManager {
    store: Arc<ItemStore>,
    settings: Arc<SettingsStore>,
    engine: Arc<dyn ConversionEngine>,
    notifier: Arc<Notifier>,
    config: IngestConfig,
}

impl SessionManager {
    pub fn new(
        store: Arc<ItemStore>,
        settings: Arc<SettingsStore>,
        engine: Arc<dyn ConversionEngine>,
        notifier: Arc<Notifier>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            settings,
            engine,
            notifier,
            config,
        }
    }

    /// Load the persisted collection. An unreadable snapshot is logged and
    /// treated as an empty session.
    pub async fn load(&self) -> SessionStatus {
        let loaded = match self.store.load_snapshot() {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!("Failed to load previous session: {}", e);
                return SessionStatus::default();
            }
        };
        if loaded == 0 {
            return SessionStatus::default();
        }

        tracing::info!("Found previous session with {} items", loaded);
        if self.settings.preferences().auto_restore_session {
            self.store.confirm_session_restore();
            self.validate_thumbnails().await;
            self.notifier.info(format!("{} restored", files(loaded)));
            return SessionStatus {
                loaded,
                awaiting_decision: false,
                auto_restored: true,
            };
        }

        SessionStatus {
            loaded,
            awaiting_decision: true,
            auto_restored: false,
        }
    }

    /// Keep the previous session's items.
    pub async fn restore(&self) -> usize {
        self.store.confirm_session_restore();
        let missing = self.validate_thumbnails().await;
        let count = self.store.len();
        tracing::info!(items = count, missing_thumbnails = missing, "Session restored");
        self.notifier.success(format!("{} restored", files(count)));
        count
    }

    /// Drop the previous session and every thumbnail the engine holds.
    pub async fn discard(&self) -> usize {
        if let Err(e) = self.engine.cleanup_all_thumbnails().await {
            tracing::warn!("Thumbnail cleanup failed: {}", e);
        }
        let removed = self.store.discard_session().len();
        tracing::info!(items = removed, "Session discarded");
        self.notifier.info("Previous session discarded");
        removed
    }

    /// Re-check every loaded thumbnail through batched metadata lookups and
    /// flag the missing ones. Returns the number flagged.
    pub async fn validate_thumbnails(&self) -> usize {
        let paths: Vec<PathBuf> = self
            .store
            .items()
            .into_iter()
            .filter(|i| i.thumbnail_status == ThumbnailStatus::Loaded)
            .filter_map(|i| i.thumbnail_path)
            .collect();
        if paths.is_empty() {
            return 0;
        }

        let pause = Duration::from_millis(self.config.validate_yield_ms);
        let mut missing = HashSet::new();
        for (n, chunk) in paths.chunks(self.config.chunk_size.max(1)).enumerate() {
            if n > 0 && !pause.is_zero() {
                tokio::time::sleep(pause).await;
            }
            match self.engine.files_info_batch(chunk).await {
                Ok(results) => missing.extend(
                    results
                        .into_iter()
                        .filter(|r| r.info.is_none())
                        .map(|r| r.path),
                ),
                Err(e) => tracing::warn!("Thumbnail validation batch failed: {}", e),
            }
        }

        let flagged = self.store.mark_thumbnails_missing(&missing);
        if flagged > 0 {
            tracing::info!("{} thumbnails missing after restore", flagged);
        }
        flagged
    }
}
