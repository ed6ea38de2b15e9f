mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let mut config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    expand_paths(&mut config);
    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<AppConfig> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = ["./aether.toml", "~/.config/aether/config.toml"];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(AppConfig::default())
}

fn expand_paths(config: &mut AppConfig) {
    let expand = |p: &Path| -> std::path::PathBuf {
        shellexpand::tilde(&p.to_string_lossy()).as_ref().into()
    };

    config.storage.data_dir = expand(&config.storage.data_dir);
    if let Some(ref path) = config.tools.ffmpeg_path {
        config.tools.ffmpeg_path = Some(expand(path));
    }
    if let Some(ref path) = config.tools.thumbnail_dir {
        config.tools.thumbnail_dir = Some(expand(path));
    }
}

/// Validate configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.ingest.chunk_size == 0 {
        anyhow::bail!("Ingest chunk_size cannot be 0");
    }

    if config.tools.timeout_secs == 0 {
        anyhow::bail!("Tool timeout_secs cannot be 0");
    }

    if let Some(ref path) = config.tools.ffmpeg_path {
        if !path.exists() {
            tracing::warn!("Configured ffmpeg path does not exist: {:?}", path);
        }
    }

    Ok(())
}
