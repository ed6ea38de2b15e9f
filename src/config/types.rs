use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub ingest: IngestConfig,

    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Directory holding the persisted queue, settings and preferences
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from(shellexpand::tilde("~/.local/share/aether").as_ref())
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Number of paths handled per metadata batch
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Pause between ingestion chunks, in milliseconds
    #[serde(default = "default_chunk_yield_ms")]
    pub chunk_yield_ms: u64,

    /// Pause between thumbnail revalidation chunks, in milliseconds
    #[serde(default = "default_validate_yield_ms")]
    pub validate_yield_ms: u64,
}

fn default_chunk_size() -> usize {
    50
}
fn default_chunk_yield_ms() -> u64 {
    10
}
fn default_validate_yield_ms() -> u64 {
    50
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_yield_ms: default_chunk_yield_ms(),
            validate_yield_ms: default_validate_yield_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,

    /// Where generated thumbnails are written (defaults to a temp subdirectory)
    #[serde(default)]
    pub thumbnail_dir: Option<PathBuf>,

    /// Upper bound for a single ffmpeg invocation
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    3600
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            thumbnail_dir: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}
