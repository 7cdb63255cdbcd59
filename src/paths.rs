use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub base_dir: PathBuf,
}

impl AppPaths {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn config_dir(&self) -> PathBuf {
        self.base_dir.join("config")
    }

    pub fn downloader_config_path(&self) -> PathBuf {
        self.config_dir().join("downloader.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn batch_logs_dir(&self) -> PathBuf {
        self.logs_dir().join("batches")
    }

    pub fn batch_log_path(&self, scope_id: &str) -> PathBuf {
        self.batch_logs_dir().join(format!("{scope_id}.jsonl"))
    }

    pub fn download_dir_override_path(&self) -> PathBuf {
        self.config_dir().join("download_dir.txt")
    }

    pub fn default_download_dir(&self) -> PathBuf {
        if let Ok(exe_path) = std::env::current_exe() {
            if let Some(parent) = exe_path.parent() {
                return parent.join("downloads");
            }
        }
        self.base_dir.join("downloads")
    }

    /// Directory saved by `set_download_dir_override`, if any. A missing or
    /// blank file means no override.
    pub fn download_dir_override(&self) -> std::io::Result<Option<PathBuf>> {
        match std::fs::read_to_string(self.download_dir_override_path()) {
            Ok(raw) => {
                let dir = raw.trim();
                Ok((!dir.is_empty()).then(|| PathBuf::from(dir)))
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Where a batch writes its files.
    pub fn effective_download_dir(&self) -> std::io::Result<PathBuf> {
        Ok(self
            .download_dir_override()?
            .unwrap_or_else(|| self.default_download_dir()))
    }

    pub fn set_download_dir_override(&self, dir: &Path) -> std::io::Result<()> {
        let file = self.download_dir_override_path();
        if let Some(parent) = file.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(file, dir.to_string_lossy().as_bytes())
    }

    pub fn clear_download_dir_override(&self) -> std::io::Result<()> {
        match std::fs::remove_file(self.download_dir_override_path()) {
            Err(err) if err.kind() != ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }

    pub fn tools_dir(&self) -> PathBuf {
        self.base_dir.join("tools")
    }

    pub fn bundled_ytdlp_path(&self) -> PathBuf {
        let mut path = self.tools_dir().join("yt-dlp").join("yt-dlp");
        if cfg!(windows) {
            path.set_extension("exe");
        }
        path
    }

    pub fn bundled_ffmpeg_path(&self) -> PathBuf {
        let mut path = self.tools_dir().join("ffmpeg").join("ffmpeg");
        if cfg!(windows) {
            path.set_extension("exe");
        }
        path
    }

    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(self.config_dir())?;
        std::fs::create_dir_all(self.batch_logs_dir())?;
        std::fs::create_dir_all(self.tools_dir())?;
        Ok(())
    }
}
