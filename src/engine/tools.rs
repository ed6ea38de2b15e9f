//! Discovery of the external `ffmpeg` binary.

use crate::config::ToolsConfig;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Availability of an external tool, as shown by `aether check-tools`.
#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub name: String,
    pub available: bool,
    /// First line of `-version` output.
    pub version: Option<String>,
    pub path: Option<PathBuf>,
}

/// Resolve ffmpeg: the configured path when it exists, otherwise `PATH`.
pub fn find_ffmpeg(config: &ToolsConfig) -> Option<PathBuf> {
    match config.ffmpeg_path.as_deref() {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => {
            tracing::warn!("Configured ffmpeg not found at {:?}, searching PATH", p);
            which::which("ffmpeg").ok()
        }
        None => which::which("ffmpeg").ok(),
    }
}

/// Check every tool the local engine depends on.
pub fn check_tools(config: &ToolsConfig) -> Vec<ToolInfo> {
    let path = find_ffmpeg(config);
    let version = path.as_deref().and_then(detect_version);
    vec![ToolInfo {
        name: "ffmpeg".to_string(),
        available: path.is_some(),
        version,
        path,
    }]
}

fn detect_version(path: &Path) -> Option<String> {
    let output = std::process::Command::new(path)
        .arg("-version")
        .output()
        .ok()?;

    if !output.status.success() {
        return None;
    }

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .next()
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn check_tools_reports_ffmpeg() {
        // ffmpeg may or may not be installed; the call must not panic.
        let tools = check_tools(&ToolsConfig::default());
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "ffmpeg");
        assert_eq!(tools[0].available, tools[0].path.is_some());
    }

    #[test]
    fn missing_configured_path_falls_back() {
        let config = ToolsConfig {
            ffmpeg_path: Some(PathBuf::from("/nonexistent/ffmpeg-xyz")),
            ..Default::default()
        };
        assert_eq!(find_ffmpeg(&config), which::which("ffmpeg").ok());
    }
}
