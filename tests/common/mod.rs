//! Shared test harness for integration tests.
//!
//! Provides [`MockEngine`], a scriptable [`ConversionEngine`], and
//! [`TestHarness`] which wires a full [`AppContext`] to it over an
//! in-memory key-value store.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::{broadcast, Notify};
use tokio_util::sync::CancellationToken;

use aether::config::AppConfig;
use aether::engine::{
    ConversionEngine, ConversionRequest, ConversionResult, EngineError, EngineEvent, FileInfo,
    FileInfoResult, ThumbnailRequest, ThumbnailResult,
};
use aether::queue::{FileDescriptor, QueueItem};
use aether::storage::{KeyValueStore, MemoryStore};
use aether::AppContext;
use aether_common::paths::{file_name_of, media_type_of};
use aether_common::{ItemId, MediaType};

/// What a conversion of a given file name should do.
#[derive(Debug, Clone)]
pub enum Outcome {
    Succeed,
    SucceedWithoutPath,
    Fail(String),
    Conflict,
    Transport(String),
    /// Wait until cancelled or released through [`MockEngine::release`].
    Block,
}

#[derive(Default)]
struct MockState {
    outcomes: HashMap<String, Outcome>,
    converted: Vec<ConversionRequest>,
    cancelled: Vec<ItemId>,
    running: HashMap<ItemId, CancellationToken>,
    in_flight: usize,
    max_in_flight: usize,
    metadata_calls: usize,
    metadata_fails: bool,
    pause_metadata_call: Option<usize>,
    missing: HashSet<PathBuf>,
    failing_thumbnails: HashSet<String>,
    deleted_thumbnails: Vec<ItemId>,
    cleanups: usize,
}

pub struct MockEngine {
    state: Mutex<MockState>,
    event_tx: broadcast::Sender<EngineEvent>,
    /// Signalled when a blocking conversion or a paused metadata call starts.
    pub started: Notify,
    release: Notify,
}

impl MockEngine {
    pub fn new() -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            state: Mutex::new(MockState::default()),
            event_tx,
            started: Notify::new(),
            release: Notify::new(),
        })
    }

    pub fn set_outcome(&self, file_name: &str, outcome: Outcome) {
        self.state.lock().outcomes.insert(file_name.to_string(), outcome);
    }

    pub fn fail_metadata(&self, fail: bool) {
        self.state.lock().metadata_fails = fail;
    }

    /// Make the `n`th metadata call (1-based) wait for [`Self::release`].
    pub fn pause_metadata_call(&self, n: usize) {
        self.state.lock().pause_metadata_call = Some(n);
    }

    pub fn mark_missing(&self, path: impl Into<PathBuf>) {
        self.state.lock().missing.insert(path.into());
    }

    pub fn fail_thumbnail(&self, file_name: &str) {
        self.state.lock().failing_thumbnails.insert(file_name.to_string());
    }

    pub fn release(&self) {
        self.release.notify_one();
    }

    pub fn emit(&self, event: EngineEvent) {
        let _ = self.event_tx.send(event);
    }

    /// File names in the order they were submitted for conversion.
    pub fn converted_names(&self) -> Vec<String> {
        self.state
            .lock()
            .converted
            .iter()
            .map(|r| file_name_of(&r.input_path))
            .collect()
    }

    pub fn requests(&self) -> Vec<ConversionRequest> {
        self.state.lock().converted.clone()
    }

    pub fn cancelled(&self) -> Vec<ItemId> {
        self.state.lock().cancelled.clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.state.lock().max_in_flight
    }

    pub fn metadata_calls(&self) -> usize {
        self.state.lock().metadata_calls
    }

    pub fn deleted_thumbnails(&self) -> Vec<ItemId> {
        self.state.lock().deleted_thumbnails.clone()
    }

    pub fn cleanups(&self) -> usize {
        self.state.lock().cleanups
    }
}

#[async_trait]
impl ConversionEngine for MockEngine {
    async fn files_info_batch(&self, paths: &[PathBuf]) -> Result<Vec<FileInfoResult>, EngineError> {
        let (fails, pause) = {
            let mut state = self.state.lock();
            state.metadata_calls += 1;
            let pause = state.pause_metadata_call == Some(state.metadata_calls);
            (state.metadata_fails, pause)
        };
        if pause {
            self.started.notify_one();
            self.release.notified().await;
        }
        if fails {
            return Err(EngineError::Transport("metadata service unavailable".into()));
        }

        let missing = self.state.lock().missing.clone();
        Ok(paths
            .iter()
            .map(|path| {
                let info = media_type_of(path).filter(|_| !missing.contains(path)).map(|media_type| FileInfo {
                    path: path.clone(),
                    name: file_name_of(path),
                    size: 1024,
                    media_type,
                });
                let error = info.is_none().then(|| "File not found".to_string());
                FileInfoResult {
                    path: path.clone(),
                    info,
                    error,
                }
            })
            .collect())
    }

    async fn generate_thumbnail(&self, request: ThumbnailRequest) -> Result<ThumbnailResult, EngineError> {
        let fails = self
            .state
            .lock()
            .failing_thumbnails
            .contains(&file_name_of(&request.input_path));
        Ok(ThumbnailResult {
            id: request.id,
            thumbnail_path: (!fails).then(|| PathBuf::from(format!("/thumbs/{}.jpg", request.id))),
            success: !fails,
            error_message: fails.then(|| "ffmpeg failed".to_string()),
        })
    }

    async fn generate_thumbnails_batch(
        &self,
        requests: Vec<ThumbnailRequest>,
    ) -> Result<Vec<ThumbnailResult>, EngineError> {
        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            results.push(self.generate_thumbnail(request).await?);
        }
        Ok(results)
    }

    async fn delete_thumbnails(&self, ids: &[ItemId]) -> Result<Vec<ItemId>, EngineError> {
        self.state.lock().deleted_thumbnails.extend_from_slice(ids);
        Ok(Vec::new())
    }

    async fn cleanup_all_thumbnails(&self) -> Result<(), EngineError> {
        self.state.lock().cleanups += 1;
        Ok(())
    }

    async fn convert(&self, request: ConversionRequest) -> Result<ConversionResult, EngineError> {
        let id = request.id;
        let name = file_name_of(&request.input_path);
        let token = CancellationToken::new();
        let outcome = {
            let mut state = self.state.lock();
            state.converted.push(request);
            state.in_flight += 1;
            state.max_in_flight = state.max_in_flight.max(state.in_flight);
            state.running.insert(id, token.clone());
            state.outcomes.get(&name).cloned().unwrap_or(Outcome::Succeed)
        };

        let result = match outcome {
            Outcome::Succeed => Ok(success(id, &name)),
            Outcome::SucceedWithoutPath => Ok(ConversionResult {
                id,
                success: true,
                output_path: None,
                error_message: None,
            }),
            Outcome::Fail(message) => Ok(ConversionResult {
                id,
                success: false,
                output_path: None,
                error_message: Some(message),
            }),
            Outcome::Conflict => Err(EngineError::Conflict {
                path: PathBuf::from("/out").join(&name),
            }),
            Outcome::Transport(message) => Err(EngineError::Transport(message)),
            Outcome::Block => {
                self.started.notify_one();
                tokio::select! {
                    _ = token.cancelled() => Err(EngineError::Cancelled { id }),
                    _ = self.release.notified() => Ok(success(id, &name)),
                }
            }
        };

        let mut state = self.state.lock();
        state.in_flight -= 1;
        state.running.remove(&id);
        result
    }

    async fn cancel(&self, id: ItemId) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        state.cancelled.push(id);
        if let Some(token) = state.running.get(&id) {
            token.cancel();
        }
        Ok(())
    }

    async fn file_exists(&self, path: &Path) -> bool {
        !self.state.lock().missing.contains(path)
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }
}

fn success(id: ItemId, name: &str) -> ConversionResult {
    ConversionResult {
        id,
        success: true,
        output_path: Some(PathBuf::from("/out").join(name)),
        error_message: None,
    }
}

/// Full [`AppContext`] over a [`MockEngine`] and a [`MemoryStore`].
pub struct TestHarness {
    pub ctx: AppContext,
    pub engine: Arc<MockEngine>,
    pub storage: Arc<MemoryStore>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_storage(MemoryStore::new())
    }

    /// A harness over existing storage, as after a restart.
    pub fn with_storage(storage: Arc<MemoryStore>) -> Self {
        Self::with_config(test_config(), storage)
    }

    pub fn with_config(config: AppConfig, storage: Arc<MemoryStore>) -> Self {
        let engine = MockEngine::new();
        let ctx = AppContext::new(
            config,
            Arc::clone(&storage) as Arc<dyn KeyValueStore>,
            Arc::clone(&engine) as Arc<dyn ConversionEngine>,
        );
        Self { ctx, engine, storage }
    }

    /// Add items directly, bypassing ingestion.
    pub fn add(&self, paths: &[&str]) -> Vec<QueueItem> {
        let files = paths
            .iter()
            .map(|p| {
                let path = PathBuf::from(p);
                FileDescriptor {
                    name: file_name_of(&path),
                    media_type: media_type_of(&path).unwrap_or(MediaType::Video),
                    size: 1024,
                    path,
                }
            })
            .collect();
        self.ctx.store.add_items(files).new_items
    }

    pub fn messages(&self) -> Vec<String> {
        self.ctx
            .notifier
            .recent(usize::MAX)
            .into_iter()
            .map(|n| n.message)
            .collect()
    }
}

/// Default config without the pauses between chunks.
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.ingest.chunk_yield_ms = 0;
    config.ingest.validate_yield_ms = 0;
    config
}
