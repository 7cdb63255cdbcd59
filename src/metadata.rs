use crate::cmd;
use crate::logs::{BatchLog, Level};
use crate::paths::AppPaths;
use crate::reporter::Reporter;
use crate::tools;
use crate::urls::redact_url_for_log;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::process::Stdio;
use uuid::Uuid;

pub(crate) const EXTRACTOR_HINT: &str = "youtube:player_client=android_vr";

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MediaDescriptor {
    pub title: Option<String>,
    pub uploader: Option<String>,
    pub duration_seconds: Option<f64>,
    /// `YYYYMMDD` as reported by the extractor.
    pub upload_date: Option<String>,
    pub view_count: Option<u64>,
    pub webpage_url: Option<String>,
    pub thumbnail_url: Option<String>,
    pub description: Option<String>,
    pub extractor_key: Option<String>,
}

impl MediaDescriptor {
    pub fn duration_label(&self) -> Option<String> {
        let total = self.duration_seconds?;
        if !total.is_finite() || total < 0.0 {
            return None;
        }
        let total = total.round() as u64;
        let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
        Some(if h > 0 {
            format!("{h}:{m:02}:{s:02}")
        } else {
            format!("{m}:{s:02}")
        })
    }

    pub fn upload_date_label(&self) -> Option<String> {
        let raw = self.upload_date.as_deref()?.trim();
        if raw.len() != 8 || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        Some(format!("{}-{}-{}", &raw[..4], &raw[4..6], &raw[6..]))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct MetadataListing {
    pub items: Vec<MediaDescriptor>,
    /// Non-blank stdout lines that were not a metadata record.
    pub dropped_lines: usize,
}

#[derive(Debug, Deserialize)]
struct InfoJson {
    title: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    upload_date: Option<String>,
    view_count: Option<u64>,
    webpage_url: Option<String>,
    thumbnail: Option<String>,
    description: Option<String>,
    extractor_key: Option<String>,
}

impl From<InfoJson> for MediaDescriptor {
    fn from(info: InfoJson) -> Self {
        MediaDescriptor {
            title: info
                .title
                .map(|t| sanitize_title(&t))
                .filter(|t| !t.is_empty()),
            uploader: info.uploader,
            duration_seconds: info.duration,
            upload_date: info.upload_date,
            view_count: info.view_count,
            webpage_url: info.webpage_url,
            thumbnail_url: info.thumbnail,
            description: info.description,
            extractor_key: info.extractor_key,
        }
    }
}

/// Runs `yt-dlp --dump-json` over a whole URL set in one process.
#[derive(Debug, Clone)]
pub struct MetadataFetcher {
    paths: AppPaths,
    ytdlp: PathBuf,
    force_ipv4: bool,
}

impl MetadataFetcher {
    pub fn new(paths: AppPaths, ytdlp: PathBuf, force_ipv4: bool) -> Self {
        Self {
            paths,
            ytdlp,
            force_ipv4,
        }
    }

    pub fn fetch(&self, urls: &[String], reporter: &dyn Reporter) -> Vec<MediaDescriptor> {
        self.fetch_listing(urls, reporter).items
    }

    /// Never fails: infrastructure errors become one reporter notification and an
    /// empty listing.
    pub fn fetch_listing(&self, urls: &[String], reporter: &dyn Reporter) -> MetadataListing {
        if urls.is_empty() {
            return MetadataListing::default();
        }

        let log = BatchLog::new(self.paths.clone(), format!("details-{}", Uuid::new_v4()));
        log.record(
            Level::Info,
            "metadata_fetch_started",
            serde_json::json!({
                "count": urls.len(),
                "urls": urls.iter().map(|u| redact_url_for_log(u)).collect::<Vec<_>>(),
                "force_ipv4": self.force_ipv4,
            }),
        );

        let output = cmd::command(&self.ytdlp)
            .args(self.build_args(urls))
            .stdin(Stdio::null())
            .output();

        let output = match output {
            Ok(output) => output,
            Err(err) => {
                let err = tools::spawn_error(&self.ytdlp, err);
                let message = format!("Could not fetch media details: {err}");
                log.record(
                    Level::Error,
                    "metadata_fetch_failed",
                    serde_json::json!({ "error": err.to_string() }),
                );
                reporter.notify_failure(&message);
                return MetadataListing::default();
            }
        };

        let listing = parse_listing(&String::from_utf8_lossy(&output.stdout));
        if !output.status.success() {
            log.record(
                Level::Warn,
                "metadata_engine_nonzero_exit",
                serde_json::json!({
                    "code": output.status.code(),
                    "stderr_tail": last_non_blank_line(&String::from_utf8_lossy(&output.stderr)),
                }),
            );
        }
        log.record(
            Level::Info,
            "metadata_fetch_finished",
            serde_json::json!({
                "items": listing.items.len(),
                "dropped_lines": listing.dropped_lines,
            }),
        );
        listing
    }

    fn build_args(&self, urls: &[String]) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        if self.force_ipv4 {
            args.push("--force-ipv4".to_string());
        }
        args.extend(
            [
                "--dump-json",
                "--ignore-errors",
                "--no-warnings",
                "--extractor-args",
                EXTRACTOR_HINT,
            ]
            .map(String::from),
        );
        args.extend(urls.iter().cloned());
        args
    }
}

pub(crate) fn parse_listing(stdout: &str) -> MetadataListing {
    let mut listing = MetadataListing::default();
    for line in stdout.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<InfoJson>(trimmed) {
            Ok(info) => listing.items.push(info.into()),
            Err(_) => listing.dropped_lines += 1,
        }
    }
    listing
}

/// Strips characters that break file names or markdown and collapses whitespace.
pub fn sanitize_title(input: &str) -> String {
    let cleaned: String = input
        .chars()
        .map(|ch| {
            if ch.is_control()
                || matches!(
                    ch,
                    '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '`' | '_' | '[' | ']'
                        | '#' | '~'
                )
            {
                ' '
            } else {
                ch
            }
        })
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn last_non_blank_line(text: &str) -> Option<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .next_back()
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{ChannelReporter, ReporterEvent};

    const GOOD_LINE: &str = r#"{"title":"Cats: the *movie* | part 1","uploader":"Someone","duration":3723.4,"upload_date":"20240131","view_count":1200,"webpage_url":"https://www.youtube.com/watch?v=abc","thumbnail":"https://i.ytimg.com/vi/abc/hq.jpg","description":"desc","extractor_key":"Youtube","formats":[{"format_id":"18"}]}"#;

    #[test]
    fn malformed_lines_are_dropped_and_counted() {
        let stdout = format!("{GOOD_LINE}\n{{\"title\": \"cut off\n\n{GOOD_LINE}\n");
        let listing = parse_listing(&stdout);
        assert_eq!(listing.items.len(), 2);
        assert_eq!(listing.dropped_lines, 1);
    }

    #[test]
    fn record_fields_are_mapped_and_title_sanitized() {
        let listing = parse_listing(GOOD_LINE);
        let item = &listing.items[0];
        assert_eq!(item.title.as_deref(), Some("Cats the movie part 1"));
        assert_eq!(item.uploader.as_deref(), Some("Someone"));
        assert_eq!(item.view_count, Some(1200));
        assert_eq!(
            item.thumbnail_url.as_deref(),
            Some("https://i.ytimg.com/vi/abc/hq.jpg")
        );
        assert_eq!(item.extractor_key.as_deref(), Some("Youtube"));
        assert_eq!(item.duration_label().as_deref(), Some("1:02:03"));
        assert_eq!(item.upload_date_label().as_deref(), Some("2024-01-31"));
    }

    #[test]
    fn non_object_json_is_dropped() {
        let listing = parse_listing("42\n[1,2]\n\"text\"\n");
        assert!(listing.items.is_empty());
        assert_eq!(listing.dropped_lines, 3);
    }

    #[test]
    fn sanitize_title_collapses_whitespace() {
        assert_eq!(sanitize_title("  a/b\\c \t[d]  "), "a b c d");
        assert_eq!(sanitize_title("???"), "");
    }

    #[test]
    fn short_durations_omit_hours() {
        let item = MediaDescriptor {
            duration_seconds: Some(65.0),
            ..MediaDescriptor::default()
        };
        assert_eq!(item.duration_label().as_deref(), Some("1:05"));
        let bad_date = MediaDescriptor {
            upload_date: Some("2024".to_string()),
            ..MediaDescriptor::default()
        };
        assert_eq!(bad_date.upload_date_label(), None);
    }

    #[test]
    fn ipv4_flag_leads_and_urls_trail() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = MetadataFetcher::new(
            AppPaths::new(dir.path().to_path_buf()),
            PathBuf::from("yt-dlp"),
            true,
        );
        let urls = vec!["https://a.example/1".to_string(), "https://b.example/2".to_string()];
        let args = fetcher.build_args(&urls);
        assert_eq!(args[0], "--force-ipv4");
        assert!(args.contains(&"--dump-json".to_string()));
        assert!(args.contains(&"--ignore-errors".to_string()));
        assert!(args.contains(&"--no-warnings".to_string()));
        assert_eq!(args[args.len() - 2..], urls[..]);
    }

    #[test]
    fn spawn_failure_yields_empty_list_and_one_notification() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fetcher = MetadataFetcher::new(
            AppPaths::new(dir.path().to_path_buf()),
            dir.path().join("no-such-yt-dlp"),
            false,
        );
        let (reporter, rx) = ChannelReporter::new();
        let items = fetcher.fetch(&["https://example.com/v".to_string()], &reporter);
        assert!(items.is_empty());

        let events: Vec<ReporterEvent> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ReporterEvent::Failure { .. }));
    }
}
