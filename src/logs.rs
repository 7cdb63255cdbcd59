use crate::paths::AppPaths;
use crate::Result;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

const BATCH_LOG_ROTATE_BYTES: u64 = 10 * 1024 * 1024;
const BATCH_LOG_MAX_BACKUPS: usize = 3;
const BATCH_LOG_MAX_AGE_DAYS: u64 = 30;
const BATCH_LOG_TOTAL_CAP_BYTES: u64 = 256 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
}

impl Level {
    fn as_str(&self) -> &'static str {
        match self {
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

/// JSONL log for one batch run or one metadata fetch.
#[derive(Debug, Clone)]
pub struct BatchLog {
    paths: AppPaths,
    scope_id: String,
}

impl BatchLog {
    pub fn new(paths: AppPaths, scope_id: impl Into<String>) -> Self {
        Self {
            paths,
            scope_id: scope_id.into(),
        }
    }

    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn path(&self) -> PathBuf {
        self.paths.batch_log_path(&self.scope_id)
    }

    /// Best effort; a full disk must not take a running batch down with it.
    pub fn record(&self, level: Level, event: &str, data: serde_json::Value) {
        let _ = log_line(&self.paths, &self.scope_id, level, event, data);
    }
}

pub fn log_line(
    paths: &AppPaths,
    scope_id: &str,
    level: Level,
    event: &str,
    data: serde_json::Value,
) -> Result<()> {
    let line = serde_json::json!({
        "ts_ms": now_ms(),
        "scope_id": scope_id,
        "level": level.as_str(),
        "event": event,
        "data": data
    })
    .to_string();

    let path = paths.batch_log_path(scope_id);
    std::fs::create_dir_all(paths.batch_logs_dir())?;
    rotate_log_if_needed(&path)?;
    std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(format!("{line}\n").as_bytes())?;
    Ok(())
}

/// Drops logs older than the retention window, then the oldest ones until the
/// directory fits the size cap. Returns how many files were removed.
pub fn prune_batch_logs(paths: &AppPaths) -> Result<usize> {
    let dir = paths.batch_logs_dir();
    if !dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(Duration::from_secs(BATCH_LOG_MAX_AGE_DAYS * 24 * 60 * 60))
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0_usize;
    let mut candidates: Vec<(PathBuf, SystemTime, u64)> = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = match entry {
            Ok(v) => v,
            Err(_) => continue,
        };
        let meta = match entry.metadata() {
            Ok(v) => v,
            Err(_) => continue,
        };
        if !meta.is_file() {
            continue;
        }
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        let path = entry.path();

        if modified < cutoff {
            if std::fs::remove_file(&path).is_ok() {
                removed += 1;
            }
            continue;
        }

        candidates.push((path, modified, meta.len()));
    }

    candidates.sort_by_key(|(_, modified, _)| *modified);
    let mut total: u64 = candidates.iter().map(|(_, _, size)| *size).sum();
    for (path, _modified, size) in candidates {
        if total <= BATCH_LOG_TOTAL_CAP_BYTES {
            break;
        }
        if std::fs::remove_file(&path).is_ok() {
            removed += 1;
        }
        total = total.saturating_sub(size);
    }

    Ok(removed)
}

fn rotate_log_if_needed(path: &Path) -> Result<()> {
    let len = match std::fs::metadata(path) {
        Ok(m) => m.len(),
        Err(_) => return Ok(()),
    };
    if len >= BATCH_LOG_ROTATE_BYTES {
        shift_backups(path)?;
    }
    Ok(())
}

/// `<scope>.jsonl` becomes `<scope>.jsonl.1`, `.1` becomes `.2`, and so on; the
/// oldest generation falls off the end.
fn shift_backups(path: &Path) -> std::io::Result<()> {
    let oldest = backup_path(path, BATCH_LOG_MAX_BACKUPS);
    if oldest.exists() {
        std::fs::remove_file(&oldest)?;
    }
    for generation in (1..BATCH_LOG_MAX_BACKUPS).rev() {
        let from = backup_path(path, generation);
        if from.exists() {
            std::fs::rename(&from, backup_path(path, generation + 1))?;
        }
    }
    std::fs::rename(path, backup_path(path, 1))
}

fn backup_path(path: &Path, generation: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{generation}"));
    PathBuf::from(name)
}

pub(crate) fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::{set_file_mtime, FileTime};

    #[test]
    fn log_line_appends_json_records() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        let log = BatchLog::new(paths.clone(), "batch-1");

        log.record(Level::Info, "batch_started", serde_json::json!({ "total": 2 }));
        log.record(Level::Error, "job_failed", serde_json::json!({ "index": 1 }));

        let text = std::fs::read_to_string(log.path()).expect("read");
        let records: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).expect("json"))
            .collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0]["event"], "batch_started");
        assert_eq!(records[0]["data"]["total"], 2);
        assert_eq!(records[1]["level"], "error");
        assert_eq!(records[1]["scope_id"], "batch-1");
    }

    #[test]
    fn full_backup_chain_drops_the_oldest_generation() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        let log = paths.batch_log_path("batch-7");
        std::fs::create_dir_all(paths.batch_logs_dir()).expect("mkdir");

        std::fs::write(&log, "current").expect("write");
        for generation in 1..=BATCH_LOG_MAX_BACKUPS {
            std::fs::write(backup_path(&log, generation), format!("gen{generation}"))
                .expect("write backup");
        }

        shift_backups(&log).expect("shift");

        assert!(!log.exists());
        let read = |generation| std::fs::read_to_string(backup_path(&log, generation)).expect("read");
        assert_eq!(read(1), "current");
        assert_eq!(read(2), "gen1");
        assert_eq!(read(3), "gen2");
        assert!(!backup_path(&log, BATCH_LOG_MAX_BACKUPS + 1).exists());
        assert!(backup_path(&log, 1)
            .to_string_lossy()
            .ends_with("batch-7.jsonl.1"));
    }

    #[test]
    fn prune_removes_logs_past_retention() {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = AppPaths::new(dir.path().to_path_buf());
        std::fs::create_dir_all(paths.batch_logs_dir()).expect("mkdir");

        let old = paths.batch_log_path("old");
        let fresh = paths.batch_log_path("fresh");
        std::fs::write(&old, "{}\n").expect("write old");
        std::fs::write(&fresh, "{}\n").expect("write fresh");

        let long_ago = SystemTime::now() - Duration::from_secs(90 * 24 * 60 * 60);
        set_file_mtime(&old, FileTime::from_system_time(long_ago)).expect("mtime");

        let removed = prune_batch_logs(&paths).expect("prune");
        assert_eq!(removed, 1);
        assert!(!old.exists());
        assert!(fresh.exists());
    }
}
