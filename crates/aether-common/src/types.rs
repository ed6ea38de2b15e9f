//! Core type definitions for queue items and conversion settings.
//!
//! All enums serialize in lowercase (or snake_case for multi-word variants)
//! so that persisted sessions and engine requests stay stable across
//! releases.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Media category of an input file, derived from its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    /// Video container (mp4, mkv, ...).
    Video,
    /// Still image (jpg, png, ...).
    Image,
    /// Audio-only file (mp3, flac, ...).
    Audio,
}

impl MediaType {
    /// Output format used when neither an override nor the original
    /// extension yields one.
    pub fn default_output_format(self) -> &'static str {
        match self {
            Self::Video => "mp4",
            Self::Image => "png",
            Self::Audio => "mp3",
        }
    }

    /// Whether items of this category can have a visual thumbnail.
    pub fn has_thumbnail(self) -> bool {
        !matches!(self, Self::Audio)
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "video"),
            Self::Image => write!(f, "image"),
            Self::Audio => write!(f, "audio"),
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "video" => Ok(Self::Video),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            other => Err(format!("unknown media type: {other}")),
        }
    }
}

/// Processing status of a queue item.
///
/// ```text
/// pending ──▶ processing ──▶ completed ─(retry completed)─▶ pending
///                 │
///                 ├──▶ error ─────(resume)──▶ pending
///                 ├──▶ cancelled ─(resume)──▶ pending
///                 └──▶ conflict ──(resume)──▶ pending
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    /// Waiting to be picked up by the scheduler.
    #[default]
    Pending,
    /// Submitted to the engine, not yet resolved.
    Processing,
    /// Converted successfully.
    Completed,
    /// Conversion failed.
    Error,
    /// Conversion was stopped before it finished.
    Cancelled,
    /// Output path already existed and the conflict policy refused it.
    Conflict,
}

impl ProcessStatus {
    /// Terminal states are the ones a drain leaves behind.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Error | Self::Cancelled | Self::Conflict
        )
    }

    /// Whether `self → next` is a legal lifecycle transition.
    ///
    /// Anything not listed is rejected; callers treat a rejected
    /// transition as a no-op.
    pub fn can_transition_to(self, next: ProcessStatus) -> bool {
        use ProcessStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Error)
                | (Processing, Cancelled)
                | (Processing, Conflict)
                | (Cancelled, Pending)
                | (Error, Pending)
                | (Completed, Pending)
        )
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Completed => write!(f, "completed"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Conflict => write!(f, "conflict"),
        }
    }
}

/// Thumbnail sub-state of a queue item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailStatus {
    #[default]
    Pending,
    Loading,
    Loaded,
    Error,
}

/// Policy applied when the computed output path already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictMode {
    /// Leave the existing file alone and report a conflict.
    #[default]
    Skip,
    /// Replace the existing file.
    Overwrite,
    /// Write next to it with a numeric suffix.
    KeepBoth,
}

impl fmt::Display for ConflictMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Skip => write!(f, "skip"),
            Self::Overwrite => write!(f, "overwrite"),
            Self::KeepBoth => write!(f, "keep_both"),
        }
    }
}

impl std::str::FromStr for ConflictMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "skip" => Ok(Self::Skip),
            "overwrite" => Ok(Self::Overwrite),
            "keep_both" | "keep-both" => Ok(Self::KeepBoth),
            other => Err(format!("unknown conflict mode: {other}")),
        }
    }
}

/// How a resized frame is fitted into the target box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMode {
    /// Stretch to the exact target size.
    Fill,
    /// Scale to cover the box, cropping overflow.
    Cover,
    /// Scale to fit inside the box, padding the remainder.
    #[default]
    Contain,
}

/// Padding color used by [`ResizeMode::Contain`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackgroundColor {
    Transparent,
    #[default]
    Black,
    White,
}

impl BackgroundColor {
    /// Color name as understood by ffmpeg filters.
    pub fn as_ffmpeg(self) -> &'static str {
        match self {
            Self::Transparent => "black@0",
            Self::Black => "black",
            Self::White => "white",
        }
    }
}

/// Output container for video items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    Mp4,
    Mkv,
    Mov,
    Webm,
}

/// Output format for image items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpg,
    Png,
    Webp,
}

/// Output format for audio items (and audio extraction from video).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    Aac,
    M4a,
    Ogg,
}

impl VideoFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp4 => "mp4",
            Self::Mkv => "mkv",
            Self::Mov => "mov",
            Self::Webm => "webm",
        }
    }
}

impl ImageFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
        }
    }
}

impl AudioFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Mp3 => "mp3",
            Self::Aac => "aac",
            Self::M4a => "m4a",
            Self::Ogg => "ogg",
        }
    }
}

impl std::str::FromStr for VideoFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp4" => Ok(Self::Mp4),
            "mkv" => Ok(Self::Mkv),
            "mov" => Ok(Self::Mov),
            "webm" => Ok(Self::Webm),
            other => Err(format!("unsupported video format: {other}")),
        }
    }
}

impl std::str::FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            other => Err(format!("unsupported image format: {other}")),
        }
    }
}

impl std::str::FromStr for AudioFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mp3" => Ok(Self::Mp3),
            "aac" => Ok(Self::Aac),
            "m4a" => Ok(Self::M4a),
            "ogg" => Ok(Self::Ogg),
            other => Err(format!("unsupported audio format: {other}")),
        }
    }
}

/// A concrete output format, grouped by the media family it produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Video(VideoFormat),
    Image(ImageFormat),
    Audio(AudioFormat),
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Video(f) => f.extension(),
            Self::Image(f) => f.extension(),
            Self::Audio(f) => f.extension(),
        }
    }

    /// Formats that can carry an alpha channel through a padded resize.
    pub fn supports_transparency(self) -> bool {
        matches!(
            self,
            Self::Image(ImageFormat::Png | ImageFormat::Webp) | Self::Video(VideoFormat::Webm)
        )
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse()
            .map(Self::Video)
            .or_else(|_| s.parse().map(Self::Image))
            .or_else(|_| s.parse().map(Self::Audio))
            .map_err(|_: String| format!("unsupported output format: {s}"))
    }
}
