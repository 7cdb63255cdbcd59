use crate::batch::{BatchDownloader, BatchReport, CancelHandle, DownloaderSettings};
use crate::config::{self, DownloaderConfig};
use crate::formats::{self, FormatSpec};
use crate::metadata::{MediaDescriptor, MetadataFetcher, MetadataListing};
use crate::paths::AppPaths;
use crate::reporter::Reporter;
use crate::tools::{self, ResolvedTools};
use crate::{urls, EngineError, Result};
use std::time::Duration;

/// Entry point for front ends: validates raw input, then hands off to the batch
/// downloader or the metadata fetcher.
#[derive(Debug)]
pub struct MediaSession {
    paths: AppPaths,
    config: DownloaderConfig,
    tools: ResolvedTools,
    downloader: BatchDownloader,
    fetcher: MetadataFetcher,
}

impl MediaSession {
    pub fn open(paths: AppPaths) -> Result<Self> {
        paths.ensure_dirs()?;
        let config = config::load_downloader_config(&paths)?;
        Self::with_config(paths, config)
    }

    pub fn with_config(paths: AppPaths, config: DownloaderConfig) -> Result<Self> {
        let tools = tools::resolve_tools(&paths, &config);
        let settings = DownloaderSettings {
            ytdlp: tools.ytdlp.clone(),
            ffmpeg: tools.ffmpeg.clone(),
            output_dir: paths.effective_download_dir()?,
            job_timeout: config.job_timeout_secs.map(Duration::from_secs),
        };
        let downloader = BatchDownloader::new(paths.clone(), settings);
        let fetcher =
            MetadataFetcher::new(paths.clone(), tools.ytdlp.clone(), config.force_ipv4);
        Ok(Self {
            paths,
            config,
            tools,
            downloader,
            fetcher,
        })
    }

    pub fn paths(&self) -> &AppPaths {
        &self.paths
    }

    pub fn config(&self) -> &DownloaderConfig {
        &self.config
    }

    pub fn tools(&self) -> &ResolvedTools {
        &self.tools
    }

    /// Format used when the caller has no explicit choice.
    pub fn default_format(&self) -> Result<FormatSpec> {
        formats::resolve_preset(&self.config.default_format)
    }

    /// Blocks until the batch completes or is cancelled through
    /// [`MediaSession::cancel_batch`] or a [`CancelHandle`].
    pub fn submit_batch(
        &self,
        raw_urls: &str,
        format_choice: &str,
        reporter: &dyn Reporter,
    ) -> Result<BatchReport> {
        let format = formats::resolve_choice(format_choice)?;
        let urls = validated_urls(raw_urls)?;
        self.downloader.run(&urls, &format, reporter)
    }

    pub fn cancel_batch(&self) {
        self.downloader.cancel();
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.downloader.cancel_handle()
    }

    pub fn fetch_details(
        &self,
        raw_urls: &str,
        reporter: &dyn Reporter,
    ) -> Result<Vec<MediaDescriptor>> {
        Ok(self.fetch_listing(raw_urls, reporter)?.items)
    }

    pub fn fetch_listing(
        &self,
        raw_urls: &str,
        reporter: &dyn Reporter,
    ) -> Result<MetadataListing> {
        let urls = validated_urls(raw_urls)?;
        Ok(self.fetcher.fetch_listing(&urls, reporter))
    }
}

fn validated_urls(raw: &str) -> Result<Vec<String>> {
    let urls = urls::normalize_urls(raw);
    if urls.is_empty() {
        return Err(EngineError::NoValidUrls);
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reporter::{ChannelReporter, NullReporter};

    fn session(dir: &std::path::Path) -> MediaSession {
        let paths = AppPaths::new(dir.to_path_buf());
        paths
            .set_download_dir_override(&dir.join("downloads"))
            .expect("override");
        let config = DownloaderConfig {
            ytdlp_path: Some(dir.join("missing-yt-dlp").to_string_lossy().to_string()),
            ..DownloaderConfig::default()
        };
        MediaSession::with_config(paths, config).expect("session")
    }

    #[test]
    fn input_without_urls_never_starts_a_batch() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session(dir.path());
        let (reporter, rx) = ChannelReporter::new();
        let err = session
            .submit_batch("just words\n\n", "video-best-mp4", &reporter)
            .expect_err("no urls");
        assert!(matches!(err, EngineError::NoValidUrls));
        assert_eq!(rx.try_iter().count(), 0);
    }

    #[test]
    fn bad_format_choice_is_reported_before_anything_runs() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session(dir.path());
        let err = session
            .submit_batch("https://example.com/v", "video|best", &NullReporter)
            .expect_err("bad token");
        assert!(matches!(err, EngineError::InvalidFormatToken(_)));
    }

    #[test]
    fn download_dir_override_becomes_output_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session(dir.path());
        let report = session
            .submit_batch("https://example.com/v", "audio-best-mp3", &NullReporter)
            .expect("report");
        assert_eq!(report.output_dir, dir.path().join("downloads"));
        assert!(dir.path().join("downloads").is_dir());
    }

    #[test]
    fn default_format_comes_from_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let session = session(dir.path());
        let spec = session.default_format().expect("default");
        assert_eq!(spec.container, "mp4");
    }
}
