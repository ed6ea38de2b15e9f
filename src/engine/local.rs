//! In-process engine that works on the local filesystem and drives `ffmpeg`.

use super::ffmpeg::{self, EncodeJob};
use super::naming::apply_naming_pipeline;
use super::{
    ConversionEngine, ConversionRequest, ConversionResult, EngineError, EngineEvent, FileInfo,
    FileInfoResult, ProgressEvent, ThumbnailRequest, ThumbnailResult, CANCELLED_MESSAGE,
};
use crate::config::ToolsConfig;
use aether_common::paths::{extension_of, file_name_of, file_stem_of, media_type_of};
use aether_common::{ConflictMode, ItemId, MediaType, OutputFormat, ProcessStatus};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

const MAX_CONCURRENT_THUMBNAILS: usize = 3;
const MAX_CONCURRENT_METADATA: usize = 10;
const THUMBNAIL_TIMEOUT: Duration = Duration::from_secs(30);
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);
const THUMB_PREFIX: &str = "aether_thumb_";
const THUMB_EXT: &str = ".jpg";
const MAX_KEEP_BOTH_SUFFIX: u32 = 9999;
const STDERR_TAIL_LINES: usize = 20;

/// Local [`ConversionEngine`] binding.
pub struct LocalEngine {
    ffmpeg: Option<PathBuf>,
    timeout: Duration,
    thumbnail_dir: PathBuf,
    running: Arc<Mutex<HashMap<ItemId, CancellationToken>>>,
    event_tx: broadcast::Sender<EngineEvent>,
}

/// Removes the cancellation token of a finished conversion.
struct RunningEntry {
    id: ItemId,
    running: Arc<Mutex<HashMap<ItemId, CancellationToken>>>,
}

impl Drop for RunningEntry {
    fn drop(&mut self) {
        self.running.lock().remove(&self.id);
    }
}

impl LocalEngine {
    /// Build an engine from tool configuration, discovering ffmpeg.
    pub fn new(config: &ToolsConfig) -> Self {
        let thumbnail_dir = config
            .thumbnail_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("aether-thumbnails"));
        Self::with_ffmpeg(
            super::find_ffmpeg(config),
            thumbnail_dir,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn with_ffmpeg(ffmpeg: Option<PathBuf>, thumbnail_dir: PathBuf, timeout: Duration) -> Self {
        if ffmpeg.is_none() {
            tracing::debug!("ffmpeg not found; only copy/rename conversions will work");
        }
        let (event_tx, _) = broadcast::channel(256);
        Self {
            ffmpeg,
            timeout,
            thumbnail_dir,
            running: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
        }
    }

    pub fn thumbnail_path(&self, id: ItemId) -> PathBuf {
        self.thumbnail_dir.join(format!("{THUMB_PREFIX}{id}{THUMB_EXT}"))
    }

    fn emit(&self, event: EngineEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("No subscribers for engine event");
        }
    }

    fn emit_progress(&self, id: ItemId, progress: u8, status: ProcessStatus, message: Option<&str>) {
        self.emit(EngineEvent::Progress(ProgressEvent {
            id,
            progress,
            status,
            message: message.map(str::to_string),
        }));
    }

    fn require_ffmpeg(&self) -> Result<&Path, EngineError> {
        self.ffmpeg
            .as_deref()
            .ok_or_else(|| EngineError::Failed("ffmpeg not found; is it installed and in PATH?".into()))
    }

    fn register(&self, id: ItemId) -> (CancellationToken, RunningEntry) {
        let token = CancellationToken::new();
        self.running.lock().insert(id, token.clone());
        let entry = RunningEntry {
            id,
            running: Arc::clone(&self.running),
        };
        (token, entry)
    }

    /// Output path after naming and conflict resolution.
    async fn resolve_output_path(&self, request: &ConversionRequest, extension: &str) -> Result<PathBuf, EngineError> {
        let input = &request.input_path;
        let dir = match &request.output_directory {
            Some(dir) => dir.clone(),
            None => input.parent().map(Path::to_path_buf).unwrap_or_else(|| PathBuf::from(".")),
        };
        let stem = apply_naming_pipeline(&file_stem_of(input), &request.naming_config);
        let candidate = dir.join(with_extension(&stem, extension));

        if !path_exists(&candidate).await {
            return Ok(candidate);
        }

        match request.conflict_mode {
            ConflictMode::Overwrite => Ok(candidate),
            ConflictMode::Skip => Err(EngineError::Conflict { path: candidate }),
            ConflictMode::KeepBoth => {
                for n in 2..=MAX_KEEP_BOTH_SUFFIX {
                    let next = dir.join(with_extension(&format!("{stem}_{n}"), extension));
                    if !path_exists(&next).await {
                        return Ok(next);
                    }
                }
                Err(EngineError::Failed("Too many duplicate files".into()))
            }
        }
    }

    async fn copy_file(
        &self,
        id: ItemId,
        input: &Path,
        output: &Path,
        token: &CancellationToken,
    ) -> Result<(), EngineError> {
        self.emit_progress(id, 0, ProcessStatus::Processing, Some("Renaming/Copying..."));
        tokio::select! {
            result = tokio::fs::copy(input, output) => {
                result.map(|_| ()).map_err(|e| EngineError::Failed(format!("Failed to copy file: {e}")))
            }
            _ = token.cancelled() => {
                remove_partial(output).await;
                Err(EngineError::Cancelled { id })
            }
        }
    }

    async fn encode(
        &self,
        id: ItemId,
        args: Vec<std::ffi::OsString>,
        output: &Path,
        token: &CancellationToken,
    ) -> Result<(), EngineError> {
        let ffmpeg = self.require_ffmpeg()?;
        tracing::debug!(item_id = %id, "Running {} {:?}", ffmpeg.display(), args);

        let mut child = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Failed(format!("Failed to spawn ffmpeg: {e}")))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::Failed("Failed to capture ffmpeg output".into()))?;

        self.emit_progress(id, 0, ProcessStatus::Processing, Some("Processing..."));

        let mut lines = BufReader::new(stderr).lines();
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut duration: Option<f64> = None;
        let mut last_emit = Instant::now();
        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                line = lines.next_line() => {
                    let Ok(Some(line)) = line else { break };
                    if duration.is_none() {
                        duration = ffmpeg::parse_duration(&line);
                    }
                    if let Some(progress) = ffmpeg::parse_progress(&line, duration) {
                        if last_emit.elapsed() >= PROGRESS_INTERVAL {
                            self.emit_progress(id, progress, ProcessStatus::Processing, None);
                            last_emit = Instant::now();
                        }
                    }
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                _ = token.cancelled() => {
                    let _ = child.kill().await;
                    remove_partial(output).await;
                    self.emit_progress(id, 0, ProcessStatus::Cancelled, Some(CANCELLED_MESSAGE));
                    return Err(EngineError::Cancelled { id });
                }
                _ = &mut deadline => {
                    let _ = child.kill().await;
                    remove_partial(output).await;
                    return Err(EngineError::Failed(format!("ffmpeg timed out after {:?}", self.timeout)));
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| EngineError::Failed(format!("Failed to wait on ffmpeg: {e}")))?;

        if status.success() {
            return Ok(());
        }

        remove_partial(output).await;
        let log = Vec::from(tail).join("\n");
        Err(EngineError::Failed(describe_failure(status.code(), &log)))
    }

    async fn thumbnail(&self, request: ThumbnailRequest) -> ThumbnailResult {
        let id = request.id;
        let failure = |message: String| ThumbnailResult {
            id,
            thumbnail_path: None,
            success: false,
            error_message: Some(message),
        };

        if request.media_type == MediaType::Audio {
            return ThumbnailResult {
                id,
                thumbnail_path: None,
                success: true,
                error_message: None,
            };
        }

        let ffmpeg = match self.require_ffmpeg() {
            Ok(path) => path,
            Err(e) => return failure(e.to_string()),
        };
        if let Err(e) = tokio::fs::create_dir_all(&self.thumbnail_dir).await {
            return failure(format!("Failed to create thumbnail directory: {e}"));
        }

        let output = self.thumbnail_path(id);
        let args = ffmpeg::thumbnail_args(&request.input_path, &output, request.media_type == MediaType::Video);
        let run = Command::new(ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(THUMBNAIL_TIMEOUT, run).await {
            Ok(Ok(status)) if status.success() && path_exists(&output).await => ThumbnailResult {
                id,
                thumbnail_path: Some(output),
                success: true,
                error_message: None,
            },
            Ok(Ok(_)) => failure("ffmpeg failed".into()),
            Ok(Err(e)) => failure(format!("Failed to generate thumbnail: {e}")),
            Err(_) => failure("Thumbnail generation timed out".into()),
        }
    }
}

#[async_trait]
impl ConversionEngine for LocalEngine {
    async fn files_info_batch(&self, paths: &[PathBuf]) -> Result<Vec<FileInfoResult>, EngineError> {
        let results = stream::iter(paths.iter().cloned())
            .map(|path| async move {
                match file_info(&path).await {
                    Ok(info) => FileInfoResult {
                        path,
                        info: Some(info),
                        error: None,
                    },
                    Err(e) => FileInfoResult {
                        path,
                        info: None,
                        error: Some(e),
                    },
                }
            })
            .buffered(MAX_CONCURRENT_METADATA)
            .collect()
            .await;
        Ok(results)
    }

    async fn generate_thumbnail(&self, request: ThumbnailRequest) -> Result<ThumbnailResult, EngineError> {
        Ok(self.thumbnail(request).await)
    }

    async fn generate_thumbnails_batch(
        &self,
        requests: Vec<ThumbnailRequest>,
    ) -> Result<Vec<ThumbnailResult>, EngineError> {
        let results = stream::iter(requests)
            .map(|request| self.thumbnail(request))
            .buffer_unordered(MAX_CONCURRENT_THUMBNAILS)
            .collect()
            .await;
        Ok(results)
    }

    async fn delete_thumbnails(&self, ids: &[ItemId]) -> Result<Vec<ItemId>, EngineError> {
        let mut failed = Vec::new();
        for &id in ids {
            let path = self.thumbnail_path(id);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::debug!(item_id = %id, "Failed to delete thumbnail: {}", e);
                    failed.push(id);
                }
            }
        }
        Ok(failed)
    }

    async fn cleanup_all_thumbnails(&self) -> Result<(), EngineError> {
        let mut entries = match tokio::fs::read_dir(&self.thumbnail_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(EngineError::Failed(e.to_string())),
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.starts_with(THUMB_PREFIX) && name.ends_with(THUMB_EXT) {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    tracing::debug!("Failed to remove {}: {}", name, e);
                }
            }
        }
        Ok(())
    }

    async fn convert(&self, request: ConversionRequest) -> Result<ConversionResult, EngineError> {
        let id = request.id;
        let input = request.input_path.clone();
        let (token, _entry) = self.register(id);

        if !path_exists(&input).await {
            return Err(EngineError::Failed(format!("File not found: {}", input.display())));
        }

        let format = if request.processing_enabled {
            Some(
                request
                    .output_format
                    .parse::<OutputFormat>()
                    .map_err(|_| EngineError::Failed(format!("Unsupported output format: {}", request.output_format)))?,
            )
        } else {
            None
        };
        let extension = match format {
            Some(f) => f.extension().to_string(),
            None => extension_of(&input),
        };

        let output = self.resolve_output_path(&request, &extension).await?;
        if let Some(parent) = output.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| EngineError::Failed(format!("Failed to create output directory: {e}")))?;
        }

        if token.is_cancelled() {
            self.emit_progress(id, 0, ProcessStatus::Cancelled, Some(CANCELLED_MESSAGE));
            return Err(EngineError::Cancelled { id });
        }

        let outcome = match format {
            None => self.copy_file(id, &input, &output, &token).await,
            Some(format) => {
                let resize = request.resize_config.as_ref();
                let job = EncodeJob {
                    input: &input,
                    output: &output,
                    format,
                    quality: request.quality_percent,
                    resize,
                    muted: request.is_muted,
                    strip_metadata: request.strip_metadata,
                    overwrite: request.conflict_mode == ConflictMode::Overwrite,
                    max_bitrate: request.max_bitrate,
                };
                self.encode(id, ffmpeg::encode_args(&job), &output, &token).await
            }
        };

        match outcome {
            Ok(()) => {
                let result = ConversionResult {
                    id,
                    success: true,
                    output_path: Some(output),
                    error_message: None,
                };
                self.emit(EngineEvent::Complete(result.clone()));
                Ok(result)
            }
            Err(EngineError::Cancelled { id }) => Err(EngineError::Cancelled { id }),
            Err(e) => {
                self.emit(EngineEvent::Complete(ConversionResult {
                    id,
                    success: false,
                    output_path: None,
                    error_message: Some(e.to_string()),
                }));
                Err(e)
            }
        }
    }

    async fn cancel(&self, id: ItemId) -> Result<(), EngineError> {
        match self.running.lock().get(&id) {
            Some(token) => {
                tracing::info!(item_id = %id, "Cancelling conversion");
                token.cancel();
            }
            None => tracing::debug!(item_id = %id, "No running conversion to cancel"),
        }
        Ok(())
    }

    async fn file_exists(&self, path: &Path) -> bool {
        path_exists(path).await
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.event_tx.subscribe()
    }
}

async fn file_info(path: &Path) -> Result<FileInfo, String> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Err("File not found".into()),
        Err(e) => return Err(e.to_string()),
    };
    if !metadata.is_file() {
        return Err("Not a file".into());
    }
    let media_type = media_type_of(path).ok_or_else(|| "Unsupported format".to_string())?;

    Ok(FileInfo {
        path: path.to_path_buf(),
        name: file_name_of(path),
        size: metadata.len(),
        media_type,
    })
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::debug!("Failed to remove partial output {:?}: {}", path, e);
        }
    }
}

fn with_extension(stem: &str, extension: &str) -> String {
    if extension.is_empty() {
        stem.to_string()
    } else {
        format!("{stem}.{extension}")
    }
}

fn describe_failure(code: Option<i32>, log: &str) -> String {
    if log.contains("Output file does not contain any stream") {
        "Conversion failed: Input file has no suitable audio stream.".to_string()
    } else if log.contains("Permission denied") {
        "Conversion failed: Permission denied writing to output.".to_string()
    } else if log.contains("No space left on device") {
        "Conversion failed: Disk full.".to_string()
    } else {
        format!("ffmpeg exited with code {:?}\n{}", code, log)
    }
}
