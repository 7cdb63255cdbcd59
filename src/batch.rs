//! Sequential batch downloader. One yt-dlp process per URL, never two at once.
//!
//! A run can be cancelled from any thread via [`CancelHandle`]; the in-flight
//! process is killed and no further job starts.

use crate::cmd;
use crate::formats::FormatSpec;
use crate::logs::{BatchLog, Level};
use crate::metadata::EXTRACTOR_HINT;
use crate::paths::AppPaths;
use crate::progress::parse_progress_percent;
use crate::reporter::Reporter;
use crate::tools;
use crate::urls::redact_url_for_log;
use crate::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, ExitStatus, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

const OUTPUT_TEMPLATE: &str = "%(title)s (%(id)s).%(ext)s";
const PROCESS_POLL_INTERVAL_MS: u64 = 100;
const OUTPUT_DRAIN_GRACE_MS: u64 = 500;
const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadJob {
    pub url: String,
    pub index: usize,
    pub status: JobStatus,
    pub last_progress_percent: Option<u8>,
    pub error: Option<String>,
}

impl DownloadJob {
    fn new(url: String, index: usize) -> Self {
        Self {
            url,
            index,
            status: JobStatus::Pending,
            last_progress_percent: None,
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOutcome {
    AllSucceeded,
    Partial,
    AllFailed,
    Cancelled,
}

impl BatchOutcome {
    pub fn classify(success_count: usize, total_count: usize, cancelled: bool) -> Self {
        if cancelled {
            BatchOutcome::Cancelled
        } else if success_count >= total_count {
            BatchOutcome::AllSucceeded
        } else if success_count == 0 {
            BatchOutcome::AllFailed
        } else {
            BatchOutcome::Partial
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub batch_id: String,
    pub jobs: Vec<DownloadJob>,
    pub success_count: usize,
    pub total_count: usize,
    pub cancelled: bool,
    pub outcome: BatchOutcome,
    pub output_dir: PathBuf,
}

impl BatchReport {
    /// Jobs that got past Pending.
    pub fn attempted_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|j| j.status != JobStatus::Pending)
            .count()
    }

    pub fn failure_count(&self) -> usize {
        self.total_count.saturating_sub(self.success_count)
    }
}

#[derive(Debug, Clone)]
pub struct DownloaderSettings {
    pub ytdlp: PathBuf,
    pub ffmpeg: PathBuf,
    pub output_dir: PathBuf,
    /// Watchdog for a single job; `None` lets a hung process block until cancelled.
    pub job_timeout: Option<Duration>,
}

/// Per-run cancellation state: the flag plus the one live child process.
#[derive(Debug, Default)]
struct RunControl {
    cancelled: AtomicBool,
    active: Mutex<Option<Child>>,
}

impl RunControl {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn active(&self) -> MutexGuard<'_, Option<Child>> {
        match self.active.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(child) = self.active().as_mut() {
            cmd::kill_process_tree(child);
        }
    }

    /// Takes ownership of a freshly spawned child. The flag is re-checked after
    /// the slot is filled so a concurrent `cancel` cannot miss the process.
    fn install(&self, child: Child) {
        let mut slot = self.active();
        *slot = Some(child);
        if self.is_cancelled() {
            if let Some(child) = slot.as_mut() {
                cmd::kill_process_tree(child);
            }
        }
    }

    fn try_wait(&self) -> std::io::Result<Option<ExitStatus>> {
        match self.active().as_mut() {
            Some(child) => child.try_wait(),
            None => Err(std::io::Error::other("no active process")),
        }
    }

    fn kill_active(&self) {
        if let Some(child) = self.active().as_mut() {
            cmd::kill_process_tree(child);
        }
    }

    fn release(&self) {
        if let Some(mut child) = self.active().take() {
            let _ = child.wait();
        }
    }
}

type CurrentRun = Arc<Mutex<Option<Arc<RunControl>>>>;

/// Occupies the downloader's run slot; frees it and stops any leftover process
/// even when the run unwinds.
struct ActiveRun<'a> {
    current: &'a CurrentRun,
    control: Arc<RunControl>,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        self.control.kill_active();
        self.control.release();
        *lock_current(self.current) = None;
    }
}

fn lock_current(current: &CurrentRun) -> MutexGuard<'_, Option<Arc<RunControl>>> {
    match current.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Cancels whatever batch the owning downloader is running. Cloneable and safe to
/// call from any thread, any number of times.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    current: CurrentRun,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let run = lock_current(&self.current).clone();
        if let Some(run) = run {
            run.cancel();
        }
    }
}

#[derive(Debug)]
pub struct BatchDownloader {
    paths: AppPaths,
    settings: DownloaderSettings,
    current: CurrentRun,
}

enum JobOutcome {
    Succeeded,
    Failed(String),
    Cancelled,
}

#[derive(Debug, Clone, Copy)]
enum Stream {
    Stdout,
    Stderr,
}

enum StreamEvent {
    Line(Stream, String),
    ReaderError(Stream, String),
}

impl BatchDownloader {
    pub fn new(paths: AppPaths, settings: DownloaderSettings) -> Self {
        Self {
            paths,
            settings,
            current: Arc::new(Mutex::new(None)),
        }
    }

    pub fn settings(&self) -> &DownloaderSettings {
        &self.settings
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            current: self.current.clone(),
        }
    }

    pub fn cancel(&self) {
        self.cancel_handle().cancel();
    }

    pub fn is_running(&self) -> bool {
        lock_current(&self.current).is_some()
    }

    /// Downloads every URL in order and blocks until the batch completes or is
    /// cancelled. Per-job failures are contained in the report; only a broken
    /// precondition or an unusable output directory is an `Err`.
    pub fn run(
        &self,
        urls: &[String],
        format: &FormatSpec,
        reporter: &dyn Reporter,
    ) -> Result<BatchReport> {
        if urls.is_empty() {
            return Err(EngineError::EmptyBatch);
        }

        let slot = {
            let mut current = lock_current(&self.current);
            if current.is_some() {
                return Err(EngineError::BatchInProgress);
            }
            let control = Arc::new(RunControl::default());
            *current = Some(control.clone());
            ActiveRun {
                current: &self.current,
                control,
            }
        };

        self.run_batch(&slot.control, urls, format, reporter)
    }

    fn run_batch(
        &self,
        control: &RunControl,
        urls: &[String],
        format: &FormatSpec,
        reporter: &dyn Reporter,
    ) -> Result<BatchReport> {
        std::fs::create_dir_all(&self.settings.output_dir)?;

        let batch_id = Uuid::new_v4().to_string();
        let log = BatchLog::new(self.paths.clone(), format!("batch-{batch_id}"));
        let total = urls.len();
        let mut jobs: Vec<DownloadJob> = urls
            .iter()
            .enumerate()
            .map(|(i, url)| DownloadJob::new(url.clone(), i + 1))
            .collect();
        let mut success_count = 0_usize;

        log.record(
            Level::Info,
            "batch_started",
            serde_json::json!({
                "batch_id": batch_id,
                "total": total,
                "format": format.label(),
                "selector": format.selector,
                "output_dir": self.settings.output_dir.to_string_lossy(),
            }),
        );
        reporter.batch_started(total);

        for job in jobs.iter_mut() {
            if control.is_cancelled() {
                break;
            }

            reporter.job_starting(job.index, total);
            log.record(
                Level::Info,
                "job_started",
                serde_json::json!({ "index": job.index, "url": redact_url_for_log(&job.url) }),
            );

            match self.run_job(control, job, format, reporter) {
                JobOutcome::Succeeded => {
                    job.status = JobStatus::Succeeded;
                    success_count += 1;
                    log.record(
                        Level::Info,
                        "job_succeeded",
                        serde_json::json!({ "index": job.index }),
                    );
                }
                JobOutcome::Cancelled => {
                    job.status = JobStatus::Cancelled;
                    log.record(
                        Level::Info,
                        "job_canceled",
                        serde_json::json!({ "index": job.index }),
                    );
                }
                JobOutcome::Failed(detail) => {
                    job.status = JobStatus::Failed;
                    log.record(
                        Level::Error,
                        "job_failed",
                        serde_json::json!({
                            "index": job.index,
                            "url": redact_url_for_log(&job.url),
                            "error": detail,
                        }),
                    );
                    job.error = Some(detail);
                }
            }
        }

        let cancelled = control.is_cancelled();
        let report = BatchReport {
            batch_id,
            outcome: BatchOutcome::classify(success_count, total, cancelled),
            jobs,
            success_count,
            total_count: total,
            cancelled,
            output_dir: self.settings.output_dir.clone(),
        };
        log.record(
            Level::Info,
            "batch_finished",
            serde_json::json!({
                "outcome": report.outcome,
                "success_count": report.success_count,
                "attempted": report.attempted_count(),
                "total": report.total_count,
            }),
        );
        reporter.batch_finished(&report);
        Ok(report)
    }

    fn run_job(
        &self,
        control: &RunControl,
        job: &mut DownloadJob,
        format: &FormatSpec,
        reporter: &dyn Reporter,
    ) -> JobOutcome {
        let mut command = cmd::command(&self.settings.ytdlp);
        command
            .args(download_args(&self.settings, format, &job.url))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                let detail = tools::spawn_error(&self.settings.ytdlp, err).to_string();
                return classify_unfinished(control, detail);
            }
        };

        let (tx, rx) = mpsc::channel();
        if let Some(stdout) = child.stdout.take() {
            spawn_line_reader(stdout, Stream::Stdout, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            spawn_line_reader(stderr, Stream::Stderr, tx);
        }

        control.install(child);
        job.status = JobStatus::Running;

        let started = Instant::now();
        let mut stderr_tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut timed_out = false;
        let poll = Duration::from_millis(PROCESS_POLL_INTERVAL_MS);

        let wait_result = loop {
            match rx.recv_timeout(poll) {
                Ok(event) => handle_stream_event(event, job, reporter, &mut stderr_tail),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => thread::sleep(poll),
            }

            if !timed_out {
                if let Some(limit) = self.settings.job_timeout {
                    if started.elapsed() >= limit {
                        control.kill_active();
                        timed_out = true;
                    }
                }
            }

            match control.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) => {}
                Err(err) => {
                    control.kill_active();
                    break Err(err);
                }
            }
        };

        drain_remaining(&rx, job, reporter, &mut stderr_tail);
        control.release();

        let status = match wait_result {
            Ok(status) => status,
            Err(err) => {
                return classify_unfinished(control, format!("failed to wait for yt-dlp: {err}"));
            }
        };

        if status.success() {
            return JobOutcome::Succeeded;
        }
        if timed_out && !control.is_cancelled() {
            let secs = self.settings.job_timeout.map(|d| d.as_secs()).unwrap_or_default();
            return JobOutcome::Failed(format!("yt-dlp timed out after {secs}s"));
        }

        let detail = match stderr_tail.back() {
            Some(last) => format!("yt-dlp exited with code {:?}: {last}", status.code()),
            None => format!("yt-dlp exited with code {:?}", status.code()),
        };
        classify_unfinished(control, detail)
    }
}

/// Outcome for a job that did not exit cleanly: cancellation wins over failure.
fn classify_unfinished(control: &RunControl, detail: String) -> JobOutcome {
    if control.is_cancelled() {
        JobOutcome::Cancelled
    } else {
        JobOutcome::Failed(detail)
    }
}

pub(crate) fn download_args(
    settings: &DownloaderSettings,
    format: &FormatSpec,
    url: &str,
) -> Vec<String> {
    vec![
        "-o".to_string(),
        settings
            .output_dir
            .join(OUTPUT_TEMPLATE)
            .to_string_lossy()
            .to_string(),
        "--ffmpeg-location".to_string(),
        settings.ffmpeg.to_string_lossy().to_string(),
        "--format".to_string(),
        format.selector.clone(),
        "--recode-video".to_string(),
        format.container.clone(),
        "--extractor-args".to_string(),
        EXTRACTOR_HINT.to_string(),
        "--progress".to_string(),
        url.to_string(),
    ]
}

fn handle_stream_event(
    event: StreamEvent,
    job: &mut DownloadJob,
    reporter: &dyn Reporter,
    stderr_tail: &mut VecDeque<String>,
) {
    match event {
        StreamEvent::Line(Stream::Stdout, line) => {
            if let Some(percent) = parse_progress_percent(&line) {
                job.last_progress_percent = Some(percent);
                reporter.job_progress(percent);
            }
        }
        StreamEvent::Line(Stream::Stderr, line) => push_tail(stderr_tail, line),
        StreamEvent::ReaderError(stream, error) => {
            push_tail(stderr_tail, format!("{stream:?} reader error: {error}"));
        }
    }
}

/// Picks up output still buffered after exit. Bounded because grandchildren
/// (ffmpeg) may hold the pipes open past yt-dlp's own exit.
fn drain_remaining(
    rx: &Receiver<StreamEvent>,
    job: &mut DownloadJob,
    reporter: &dyn Reporter,
    stderr_tail: &mut VecDeque<String>,
) {
    let deadline = Instant::now() + Duration::from_millis(OUTPUT_DRAIN_GRACE_MS);
    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        match rx.recv_timeout(remaining) {
            Ok(event) => handle_stream_event(event, job, reporter, stderr_tail),
            Err(_) => break,
        }
    }
}

fn push_tail(tail: &mut VecDeque<String>, line: String) {
    if tail.len() == STDERR_TAIL_LINES {
        tail.pop_front();
    }
    tail.push_back(line);
}

/// yt-dlp rewrites its progress line with `\r`, so both `\r` and `\n` end a line.
fn spawn_line_reader<R>(mut reader: R, stream: Stream, tx: Sender<StreamEvent>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut buf = [0_u8; 4096];
        let mut pending: Vec<u8> = Vec::new();

        loop {
            match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(read) => {
                    for &byte in &buf[..read] {
                        if byte == b'\n' || byte == b'\r' {
                            if let Some(line) = flush_pending_line(&mut pending) {
                                if tx.send(StreamEvent::Line(stream, line)).is_err() {
                                    return;
                                }
                            }
                        } else {
                            pending.push(byte);
                        }
                    }
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    let _ = tx.send(StreamEvent::ReaderError(stream, err.to_string()));
                    break;
                }
            }
        }

        if let Some(line) = flush_pending_line(&mut pending) {
            let _ = tx.send(StreamEvent::Line(stream, line));
        }
    });
}

fn flush_pending_line(pending: &mut Vec<u8>) -> Option<String> {
    if pending.is_empty() {
        return None;
    }
    let line = String::from_utf8_lossy(pending).trim().to_string();
    pending.clear();
    if line.is_empty() {
        None
    } else {
        Some(line)
    }
}
