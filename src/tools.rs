use crate::config::DownloaderConfig;
use crate::paths::AppPaths;
use crate::EngineError;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Executables handed to the downloader and the metadata fetcher.
#[derive(Debug, Clone)]
pub struct ResolvedTools {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ToolStatus {
    pub tool: String,
    pub available: bool,
    pub path: String,
    pub version: Option<String>,
}

pub fn resolve_tools(paths: &AppPaths, config: &DownloaderConfig) -> ResolvedTools {
    ResolvedTools {
        ytdlp: resolve_ytdlp(paths, config),
        ffmpeg: resolve_ffmpeg(paths, config),
    }
}

pub fn resolve_ytdlp(paths: &AppPaths, config: &DownloaderConfig) -> PathBuf {
    if let Some(explicit) = non_blank(config.ytdlp_path.as_deref()) {
        return PathBuf::from(explicit);
    }
    let bundled = paths.bundled_ytdlp_path();
    if bundled.exists() {
        return bundled;
    }
    PathBuf::from("yt-dlp")
}

pub fn resolve_ffmpeg(paths: &AppPaths, config: &DownloaderConfig) -> PathBuf {
    if let Some(explicit) = non_blank(config.ffmpeg_path.as_deref()) {
        return PathBuf::from(explicit);
    }
    let bundled = paths.bundled_ffmpeg_path();
    if bundled.exists() {
        return bundled;
    }
    PathBuf::from("ffmpeg")
}

pub fn tools_status(tools: &ResolvedTools) -> Vec<ToolStatus> {
    vec![
        probe_tool("yt-dlp", &tools.ytdlp, "--version"),
        probe_tool("ffmpeg", &tools.ffmpeg, "-version"),
    ]
}

fn probe_tool(name: &str, program: &Path, version_arg: &str) -> ToolStatus {
    let version = tool_version_first_line(program, version_arg);
    ToolStatus {
        tool: name.to_string(),
        available: version.is_some(),
        path: program.to_string_lossy().to_string(),
        version,
    }
}

fn tool_version_first_line(program: &Path, arg: &str) -> Option<String> {
    let output = crate::cmd::command(program).arg(arg).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout);
    let first = text.lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    Some(first.to_string())
}

/// Maps a failed spawn of `program` to the engine error surfaced to users.
pub(crate) fn spawn_error(program: &Path, err: std::io::Error) -> EngineError {
    if err.kind() == std::io::ErrorKind::NotFound {
        EngineError::ExternalToolMissing {
            tool: program.to_string_lossy().to_string(),
        }
    } else {
        EngineError::Io(err)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
