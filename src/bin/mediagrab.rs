use std::io::{BufRead, BufReader, Read, Write};
use std::path::PathBuf;

use mediagrab_engine::batch::{BatchOutcome, BatchReport, CancelHandle};
use mediagrab_engine::formats::PRESETS;
use mediagrab_engine::paths::AppPaths;
use mediagrab_engine::reporter::Reporter;
use mediagrab_engine::session::MediaSession;
use mediagrab_engine::{logs, tools};

struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn batch_started(&self, total: usize) {
        eprintln!("Starting batch of {total} download(s). Type q + Enter to cancel.");
    }

    fn job_starting(&self, index: usize, total: usize) {
        eprintln!("[{index}/{total}] starting");
    }

    fn job_progress(&self, percent: u8) {
        eprint!("\r  {percent:>3}%");
        let _ = std::io::stderr().flush();
    }

    fn batch_finished(&self, report: &BatchReport) {
        eprintln!();
        if report.cancelled {
            eprintln!("Batch cancelled.");
            return;
        }
        match report.outcome {
            BatchOutcome::AllSucceeded => {
                eprintln!("All {} download(s) finished.", report.total_count)
            }
            BatchOutcome::Partial => eprintln!(
                "{} of {} download(s) finished, {} failed.",
                report.success_count,
                report.total_count,
                report.failure_count()
            ),
            BatchOutcome::AllFailed => {
                eprintln!("All {} download(s) failed.", report.total_count)
            }
            BatchOutcome::Cancelled => {}
        }
        eprintln!("Output: {}", report.output_dir.to_string_lossy());
    }

    fn notify_failure(&self, message: &str) {
        eprintln!("error: {message}");
    }
}

enum Command {
    Download,
    Details,
    Formats,
    Tools,
}

fn main() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 || args.iter().any(|a| a == "-h" || a == "--help") {
        print_help();
        return Ok(());
    }

    let command = match args[1].as_str() {
        "download" => Command::Download,
        "details" => Command::Details,
        "formats" => Command::Formats,
        "tools" => Command::Tools,
        other => return Err(format!("unknown command: {other} (try --help)")),
    };

    let mut base_dir: Option<PathBuf> = None;
    let mut format: Option<String> = None;
    let mut urls_file: Option<PathBuf> = None;
    let mut as_json = false;
    let mut urls: Vec<String> = Vec::new();

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--base-dir" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--base-dir requires a value".to_string())?;
                base_dir = Some(PathBuf::from(v));
            }
            "--format" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--format requires a value".to_string())?;
                format = Some(v.to_string());
            }
            "--urls-file" => {
                i += 1;
                let v = args
                    .get(i)
                    .ok_or_else(|| "--urls-file requires a value".to_string())?;
                urls_file = Some(PathBuf::from(v));
            }
            "--json" => as_json = true,
            other if other.starts_with("--") => {
                return Err(format!("unknown arg: {other} (try --help)"))
            }
            url => urls.push(url.to_string()),
        }
        i += 1;
    }

    if let Command::Formats = command {
        for preset in PRESETS {
            println!("{:<18} {:<26} {}", preset.id, preset.title, preset.token);
        }
        return Ok(());
    }

    let base_dir = base_dir
        .or_else(default_base_dir)
        .ok_or_else(|| "could not determine base dir; pass --base-dir".to_string())?;
    let paths = AppPaths::new(base_dir);
    let session = MediaSession::open(paths).map_err(|e| e.to_string())?;
    let _ = logs::prune_batch_logs(session.paths());

    if let Command::Tools = command {
        for status in tools::tools_status(session.tools()) {
            println!(
                "{:<7} {:<5} {} {}",
                status.tool,
                if status.available { "ok" } else { "missing" },
                status.path,
                status.version.unwrap_or_default()
            );
        }
        return Ok(());
    }

    let stdin_is_input = urls.is_empty() && urls_file.is_none();
    let raw_urls = collect_raw_urls(&urls, urls_file.as_deref(), stdin_is_input)?;

    match command {
        Command::Download => {
            let format = format.unwrap_or_else(|| session.config().default_format.clone());
            cancel_on_interrupt(session.cancel_handle());
            if let Some(input) = cancel_input(stdin_is_input) {
                let cancel = session.cancel_handle();
                std::thread::spawn(move || {
                    for line in input.lines() {
                        let Ok(line) = line else { break };
                        if matches!(line.trim(), "q" | "quit" | "cancel") {
                            cancel.cancel();
                            break;
                        }
                    }
                });
            }

            let report = session
                .submit_batch(&raw_urls, &format, &ConsoleReporter)
                .map_err(|e| e.to_string())?;
            if as_json {
                let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
                println!("{json}");
            }
            if !report.cancelled && report.outcome != BatchOutcome::AllSucceeded {
                return Err(format!("{} download(s) failed", report.failure_count()));
            }
        }
        Command::Details => {
            let listing = session
                .fetch_listing(&raw_urls, &ConsoleReporter)
                .map_err(|e| e.to_string())?;
            if as_json {
                let json = serde_json::to_string_pretty(&listing).map_err(|e| e.to_string())?;
                println!("{json}");
                return Ok(());
            }
            for item in &listing.items {
                println!("{}", item.title.as_deref().unwrap_or("(untitled)"));
                if let Some(uploader) = &item.uploader {
                    println!("  by {uploader}");
                }
                if let Some(duration) = item.duration_label() {
                    println!("  duration {duration}");
                }
                if let Some(date) = item.upload_date_label() {
                    println!("  uploaded {date}");
                }
                if let Some(views) = item.view_count {
                    println!("  {views} views");
                }
                if let Some(url) = &item.webpage_url {
                    println!("  {url}");
                }
            }
            if listing.dropped_lines > 0 {
                eprintln!("({} unreadable record(s) skipped)", listing.dropped_lines);
            }
        }
        Command::Formats | Command::Tools => {}
    }

    Ok(())
}

fn collect_raw_urls(
    args: &[String],
    urls_file: Option<&std::path::Path>,
    read_stdin: bool,
) -> Result<String, String> {
    let mut raw = args.join("\n");
    if let Some(path) = urls_file {
        let text = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.to_string_lossy()))?;
        raw.push('\n');
        raw.push_str(&text);
    }
    if read_stdin {
        std::io::stdin()
            .read_to_string(&mut raw)
            .map_err(|e| format!("failed to read stdin: {e}"))?;
    }
    Ok(raw)
}

/// Where "q" is read from while a download runs. Stdin is already drained when it
/// carried the URL list, so the controlling terminal is used instead.
fn cancel_input(stdin_is_input: bool) -> Option<Box<dyn BufRead + Send>> {
    if !stdin_is_input {
        return Some(Box::new(BufReader::new(std::io::stdin())));
    }
    let console = if cfg!(windows) { "CONIN$" } else { "/dev/tty" };
    let file = std::fs::File::open(console).ok()?;
    Some(Box::new(BufReader::new(file)))
}

/// Downloads run in their own process group, so the terminal's Ctrl-C does not
/// reach them; it cancels the batch instead. A second Ctrl-C exits at once.
#[cfg(unix)]
fn cancel_on_interrupt(cancel: CancelHandle) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static INTERRUPTED: AtomicBool = AtomicBool::new(false);

    extern "C" fn on_sigint(_signal: libc::c_int) {
        if INTERRUPTED.swap(true, Ordering::SeqCst) {
            unsafe { libc::_exit(130) };
        }
    }

    let handler: extern "C" fn(libc::c_int) = on_sigint;
    unsafe {
        libc::signal(libc::SIGINT, handler as libc::sighandler_t);
    }
    std::thread::spawn(move || loop {
        if INTERRUPTED.load(Ordering::SeqCst) {
            cancel.cancel();
            break;
        }
        std::thread::sleep(std::time::Duration::from_millis(100));
    });
}

#[cfg(not(unix))]
fn cancel_on_interrupt(_cancel: CancelHandle) {}

fn default_base_dir() -> Option<PathBuf> {
    if let Ok(v) = std::env::var("MEDIAGRAB_BASE_DIR") {
        let t = v.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t));
        }
    }

    if cfg!(windows) {
        if let Ok(appdata) = std::env::var("APPDATA") {
            let t = appdata.trim();
            if !t.is_empty() {
                return Some(PathBuf::from(t).join("mediagrab"));
            }
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let t = home.trim();
        if !t.is_empty() {
            return Some(PathBuf::from(t).join(".mediagrab"));
        }
    }

    None
}

fn print_help() {
    println!(
        r#"mediagrab

Downloads batches of media URLs through yt-dlp, one at a time.

Usage:
  mediagrab download [--format <preset|token>] [--urls-file <path>] [--json] [URL...]
  mediagrab details [--urls-file <path>] [--json] [URL...]
  mediagrab formats
  mediagrab tools

URLs are read from stdin when none are given on the command line or via --urls-file.
While a download runs, type q + Enter to cancel it. When the URLs came from
stdin, the cancel command is read from the terminal instead; without one the
batch can still be cancelled with Ctrl-C.

Options:
  --base-dir <path>     Override base dir (default: $MEDIAGRAB_BASE_DIR, else ~/.mediagrab)
  --format <choice>     Preset id from `mediagrab formats` or a kind|selector#container token
  --urls-file <path>    Read newline-separated URLs from a file
  --json                Print the batch report or media listing as JSON
"#
    );
}
