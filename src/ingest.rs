//! Chunked ingestion of raw paths into queue items.
//!
//! Paths are classified by extension, split into already-present and new,
//! and the new ones are looked up through the engine in fixed-size chunks.
//! Each chunk is committed to the [`ItemStore`] before the next one starts.
//! An upload can be cancelled between chunks and between records; whatever
//! was committed stays in the queue.

use crate::config::IngestConfig;
use crate::engine::{ConversionEngine, FileInfoResult};
use crate::notify::{files, Notifier};
use crate::queue::{FileDescriptor, ItemStore, QueueItem};
use aether_common::paths::{file_name_of, media_type_of};
use aether_common::{Error, MediaType, Result, ThumbnailStatus};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Tallies of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub added: usize,
    pub already_present: usize,
    pub unsupported: usize,
    /// Chunks whose metadata lookup failed as a whole.
    pub metadata_failures: usize,
    pub cancelled: bool,
    /// Items actually added before cancellation.
    pub committed: usize,
    /// New paths never reached because of cancellation.
    pub abandoned: usize,
    #[serde(skip)]
    pub new_items: Vec<QueueItem>,
}

/// Snapshot of a running upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct UploadProgress {
    pub processed: usize,
    pub total: usize,
}

struct UploadSession {
    total: usize,
    processed: AtomicUsize,
    token: CancellationToken,
}

/// Turns path lists into queue items.
pub struct Ingestor {
    store: Arc<ItemStore>,
    engine: Arc<dyn ConversionEngine>,
    notifier: Arc<Notifier>,
    config: IngestConfig,
    session: Mutex<Option<Arc<UploadSession>>>,
}

impl Ingestor {
    pub fn new(
        store: Arc<ItemStore>,
        engine: Arc<dyn ConversionEngine>,
        notifier: Arc<Notifier>,
        config: IngestConfig,
    ) -> Self {
        Self {
            store,
            engine,
            notifier,
            config,
            session: Mutex::new(None),
        }
    }

    /// Progress of the running upload, if any.
    pub fn upload_progress(&self) -> Option<UploadProgress> {
        self.session.lock().as_ref().map(|s| UploadProgress {
            processed: s.processed.load(Ordering::SeqCst),
            total: s.total,
        })
    }

    pub fn is_uploading(&self) -> bool {
        self.session.lock().is_some()
    }

    /// Request cancellation of the running upload. Returns `false` when
    /// nothing is uploading.
    pub fn cancel_upload(&self) -> bool {
        match self.session.lock().as_ref() {
            Some(session) => {
                tracing::info!("Cancelling upload");
                session.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Ingest `paths`, reporting tallies through the notifier.
    ///
    /// Fails only when another upload is already running.
    pub async fn ingest(&self, paths: Vec<PathBuf>) -> Result<IngestReport> {
        let mut report = IngestReport::default();

        let mut seen: HashSet<PathBuf> = HashSet::new();
        let mut new_paths = Vec::new();
        for path in paths {
            if media_type_of(&path).is_none() {
                report.unsupported += 1;
            } else if self.store.contains_path(&path) || !seen.insert(path.clone()) {
                report.already_present += 1;
            } else {
                new_paths.push(path);
            }
        }

        if new_paths.is_empty() {
            self.announce(&report);
            return Ok(report);
        }

        let session = self.open_session(new_paths.len())?;
        let result = self.run_chunks(&session, new_paths, &mut report).await;
        *self.session.lock() = None;
        result?;

        tracing::info!(
            added = report.added,
            already_present = report.already_present,
            unsupported = report.unsupported,
            cancelled = report.cancelled,
            "Ingestion finished"
        );
        self.announce(&report);
        Ok(report)
    }

    fn open_session(&self, total: usize) -> Result<Arc<UploadSession>> {
        let mut slot = self.session.lock();
        if slot.is_some() {
            return Err(Error::Conflict("An upload is already in progress".into()));
        }
        let session = Arc::new(UploadSession {
            total,
            processed: AtomicUsize::new(0),
            token: CancellationToken::new(),
        });
        *slot = Some(Arc::clone(&session));
        Ok(session)
    }

    async fn run_chunks(
        &self,
        session: &UploadSession,
        new_paths: Vec<PathBuf>,
        report: &mut IngestReport,
    ) -> Result<()> {
        let chunk_size = self.config.chunk_size.max(1);
        let total = new_paths.len();
        let yield_for = Duration::from_millis(self.config.chunk_yield_ms);
        let mut reached = 0;

        for chunk in new_paths.chunks(chunk_size) {
            if session.token.is_cancelled() {
                break;
            }

            let infos = match self.engine.files_info_batch(chunk).await {
                Ok(results) => results
                    .into_iter()
                    .map(|r| (r.path.clone(), r))
                    .collect::<HashMap<PathBuf, FileInfoResult>>(),
                Err(e) => {
                    tracing::warn!("Metadata lookup failed for {} paths: {}", chunk.len(), e);
                    report.metadata_failures += 1;
                    HashMap::new()
                }
            };

            let mut descriptors = Vec::with_capacity(chunk.len());
            let mut handled = 0;
            for path in chunk {
                if session.token.is_cancelled() {
                    break;
                }
                handled += 1;
                if let Some(descriptor) = describe(path, infos.get(path)) {
                    descriptors.push(descriptor);
                }
            }

            let mut outcome = self.store.add_items(descriptors);
            for item in &mut outcome.new_items {
                if item.media_type == MediaType::Audio {
                    self.store.set_thumbnail_error(item.id);
                    item.thumbnail_status = ThumbnailStatus::Error;
                }
            }
            report.added += outcome.added;
            report.already_present += outcome.skipped;
            report.committed += outcome.added;
            report.new_items.extend(outcome.new_items);
            reached += handled;

            let processed = session.processed.fetch_add(handled, Ordering::SeqCst) + handled;
            tracing::debug!(processed, total, "Ingestion chunk committed");

            if !yield_for.is_zero() {
                tokio::time::sleep(yield_for).await;
            } else {
                tokio::task::yield_now().await;
            }
        }

        if session.token.is_cancelled() {
            report.cancelled = true;
            report.abandoned = total - reached;
        }
        Ok(())
    }

    fn announce(&self, report: &IngestReport) {
        if report.cancelled {
            self.notifier.info(format!("{} uploaded", files(report.committed)));
            self.notifier.warning(format!("{} cancelled", files(report.abandoned)));
        } else if report.added > 0 {
            self.notifier.success(format!("{} added", files(report.added)));
        }
        if report.already_present > 0 {
            self.notifier
                .warning(format!("{} already in list", files(report.already_present)));
        }
        if report.unsupported > 0 {
            self.notifier
                .error(format!("{} in unsupported format", files(report.unsupported)));
        }
    }
}

/// Descriptor from engine metadata, or derived from the path with size zero
/// when the lookup failed. `None` if the path turns out unsupported.
fn describe(path: &Path, info: Option<&FileInfoResult>) -> Option<FileDescriptor> {
    if let Some(info) = info.and_then(|r| r.info.as_ref()) {
        return Some(FileDescriptor {
            path: path.to_path_buf(),
            name: info.name.clone(),
            size: info.size,
            media_type: info.media_type,
        });
    }

    if let Some(error) = info.and_then(|r| r.error.as_deref()) {
        tracing::debug!(path = %path.display(), "Metadata unavailable: {}", error);
    }
    let media_type = media_type_of(path)?;
    Some(FileDescriptor {
        path: path.to_path_buf(),
        name: file_name_of(path),
        size: 0,
        media_type,
    })
}
