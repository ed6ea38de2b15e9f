//! Boundary to the conversion engine.
//!
//! The queue never touches media itself. Everything it needs from the
//! outside world (file metadata, thumbnails, conversions, cancellation) goes
//! through [`ConversionEngine`]. [`LocalEngine`] is the in-process binding
//! that drives `ffmpeg`.

mod ffmpeg;
mod local;
pub mod naming;
mod tools;

pub use local::LocalEngine;
pub use tools::{check_tools, find_ffmpeg, ToolInfo};

use crate::settings::NamingConfig;
use aether_common::{BackgroundColor, ConflictMode, ItemId, MediaType, ProcessStatus, ResizeMode};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::broadcast;

/// Message used when a conversion is stopped on request.
pub const CANCELLED_MESSAGE: &str = "Cancelled by user";

/// Metadata for one readable, supported file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub media_type: MediaType,
}

/// Per-path outcome of a batch metadata lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfoResult {
    pub path: PathBuf,
    pub info: Option<FileInfo>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailRequest {
    pub id: ItemId,
    pub input_path: PathBuf,
    pub media_type: MediaType,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ThumbnailResult {
    pub id: ItemId,
    pub thumbnail_path: Option<PathBuf>,
    pub success: bool,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResizeConfig {
    pub width: u32,
    pub height: u32,
    pub mode: ResizeMode,
    pub background_color: BackgroundColor,
}

/// One conversion job as submitted to the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    pub id: ItemId,
    pub input_path: PathBuf,
    /// Target extension; may be an input-only container when the original
    /// format is kept.
    pub output_format: String,
    pub quality_percent: u8,
    pub strip_metadata: bool,
    pub is_muted: bool,
    pub resize_config: Option<ResizeConfig>,
    pub naming_config: NamingConfig,
    pub output_directory: Option<PathBuf>,
    pub conflict_mode: ConflictMode,
    pub processing_enabled: bool,
    pub max_bitrate: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub id: ItemId,
    pub success: bool,
    pub output_path: Option<PathBuf>,
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: ItemId,
    pub progress: u8,
    pub status: ProcessStatus,
    pub message: Option<String>,
}

/// Push notifications emitted by the engine while it works.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum EngineEvent {
    Progress(ProgressEvent),
    Complete(ConversionResult),
}

/// Failure of an engine call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EngineError {
    /// The conversion was stopped through [`ConversionEngine::cancel`].
    #[error("Conversion cancelled: {id}")]
    Cancelled { id: ItemId },

    /// The output path exists and the conflict policy is `skip`.
    #[error("Output file already exists: {}", path.display())]
    Conflict { path: PathBuf },

    /// The engine ran the request and it failed.
    #[error("{0}")]
    Failed(String),

    /// The engine could not be reached or did not answer.
    #[error("Engine transport error: {0}")]
    Transport(String),
}

impl EngineError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

impl From<EngineError> for aether_common::Error {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Cancelled { .. } => Self::Cancelled,
            other => Self::engine(other.to_string()),
        }
    }
}

/// Request/response interface of the conversion engine.
#[async_trait]
pub trait ConversionEngine: Send + Sync {
    /// Metadata for each path. Per-path failures are reported in the result,
    /// a failure of the whole call as `Err`.
    async fn files_info_batch(&self, paths: &[PathBuf]) -> Result<Vec<FileInfoResult>, EngineError>;

    async fn generate_thumbnail(&self, request: ThumbnailRequest) -> Result<ThumbnailResult, EngineError>;

    async fn generate_thumbnails_batch(
        &self,
        requests: Vec<ThumbnailRequest>,
    ) -> Result<Vec<ThumbnailResult>, EngineError>;

    /// Delete thumbnails for the given items; returns the ids that failed.
    async fn delete_thumbnails(&self, ids: &[ItemId]) -> Result<Vec<ItemId>, EngineError>;

    /// Remove every thumbnail the engine has produced.
    async fn cleanup_all_thumbnails(&self) -> Result<(), EngineError>;

    async fn convert(&self, request: ConversionRequest) -> Result<ConversionResult, EngineError>;

    /// Best-effort cancel of an in-flight conversion.
    async fn cancel(&self, id: ItemId) -> Result<(), EngineError>;

    async fn file_exists(&self, path: &Path) -> bool;

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_classification() {
        let id = ItemId::new();
        assert!(EngineError::Cancelled { id }.is_cancellation());
        assert!(!EngineError::Failed("x".into()).is_cancellation());

        let common: aether_common::Error = EngineError::Cancelled { id }.into();
        assert!(matches!(common, aether_common::Error::Cancelled));

        let common: aether_common::Error = EngineError::Transport("down".into()).into();
        assert!(common.to_string().contains("down"));
    }

    #[test]
    fn test_event_serialization() {
        let id = ItemId::new();
        let event = EngineEvent::Progress(ProgressEvent {
            id,
            progress: 12,
            status: ProcessStatus::Processing,
            message: None,
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "progress");
        assert_eq!(json["progress"], 12);
    }
}
