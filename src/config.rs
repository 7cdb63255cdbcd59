use crate::formats;
use crate::paths::AppPaths;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloaderConfig {
    /// Explicit yt-dlp executable; falls back to the bundled copy, then PATH.
    pub ytdlp_path: Option<String>,
    /// Explicit ffmpeg executable handed to yt-dlp via `--ffmpeg-location`.
    pub ffmpeg_path: Option<String>,
    pub force_ipv4: bool,
    /// Preset id (see `formats::PRESETS`) used when the caller does not pick one.
    pub default_format: String,
    /// Kill a single download after this many seconds. `None` waits forever.
    pub job_timeout_secs: Option<u64>,
}

impl Default for DownloaderConfig {
    fn default() -> Self {
        Self {
            ytdlp_path: None,
            ffmpeg_path: None,
            force_ipv4: false,
            default_format: formats::DEFAULT_PRESET_ID.to_string(),
            job_timeout_secs: None,
        }
    }
}

pub fn load_downloader_config(paths: &AppPaths) -> Result<DownloaderConfig> {
    let path = paths.downloader_config_path();
    if !path.exists() {
        return Ok(DownloaderConfig::default());
    }
    let bytes = std::fs::read(&path)?;
    let parsed: DownloaderConfig = serde_json::from_slice(&bytes).map_err(|e| {
        EngineError::Config(format!(
            "failed to parse downloader config at {}: {e}",
            path.to_string_lossy()
        ))
    })?;
    if formats::find_preset(&parsed.default_format).is_none() {
        return Err(EngineError::Config(format!(
            "default_format {:?} is not a known preset",
            parsed.default_format
        )));
    }
    Ok(parsed)
}

pub fn save_downloader_config(paths: &AppPaths, config: &DownloaderConfig) -> Result<()> {
    let path = paths.downloader_config_path();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(&path, format!("{json}\n"))?;
    Ok(())
}
