//! Path utilities for classifying files by extension.
//!
//! Classification is purely lexical: nothing here touches the filesystem.
//! Both `/` and `\` are accepted as separators so that paths recorded on
//! one platform still resolve to a sensible display name on another.

use std::path::Path;

use crate::types::MediaType;

/// List of supported video file extensions.
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "webm", "avi", "wmv", "flv", "m4v"];

/// List of supported image file extensions.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "bmp", "tiff", "tif"];

/// List of supported audio file extensions.
const AUDIO_EXTENSIONS: &[&str] = &["mp3", "aac", "m4a", "ogg", "wav", "flac", "wma", "opus"];

/// Lowercased extension of the final path component, without the dot.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use aether_common::paths::extension_of;
///
/// assert_eq!(extension_of(Path::new("/media/Clip.MP4")), "mp4");
/// assert_eq!(extension_of(Path::new("README")), "");
/// ```
pub fn extension_of(path: &Path) -> String {
    let name = file_name_of(path);
    match name.rfind('.') {
        Some(idx) if idx + 1 < name.len() => name[idx + 1..].to_lowercase(),
        _ => String::new(),
    }
}

/// Classify an extension (with or without a leading dot).
pub fn media_type_for_extension(extension: &str) -> Option<MediaType> {
    let ext = extension.trim_start_matches('.').to_lowercase();
    if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Video)
    } else if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Image)
    } else if AUDIO_EXTENSIONS.contains(&ext.as_str()) {
        Some(MediaType::Audio)
    } else {
        None
    }
}

/// Classify a path by its extension. `None` means unsupported.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use aether_common::{paths::media_type_of, MediaType};
///
/// assert_eq!(media_type_of(Path::new("a.mp4")), Some(MediaType::Video));
/// assert_eq!(media_type_of(Path::new("c.xyz")), None);
/// ```
pub fn media_type_of(path: &Path) -> Option<MediaType> {
    media_type_for_extension(&extension_of(path))
}

/// Final path component, splitting on both `/` and `\`.
pub fn file_name_of(path: &Path) -> String {
    let raw = path.to_string_lossy();
    raw.rsplit(['/', '\\']).next().unwrap_or_default().to_string()
}

/// File name without its last extension. Dotfiles keep their leading dot.
pub fn file_stem_of(path: &Path) -> String {
    let name = file_name_of(path);
    match name.rfind('.') {
        Some(idx) if idx > 0 => name[..idx].to_string(),
        _ => name,
    }
}

/// Extension normalized for use as an output format (`jpeg` → `jpg`).
pub fn normalized_extension(path: &Path) -> String {
    let ext = extension_of(path);
    if ext == "jpeg" {
        "jpg".to_string()
    } else {
        ext
    }
}

/// All extensions accepted at ingestion.
pub fn supported_extensions() -> impl Iterator<Item = &'static str> {
    VIDEO_EXTENSIONS
        .iter()
        .chain(IMAGE_EXTENSIONS)
        .chain(AUDIO_EXTENSIONS)
        .copied()
}
