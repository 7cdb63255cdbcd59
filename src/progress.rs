//! yt-dlp progress scraping. The output format is not a stable interface, so all
//! knowledge of it stays in this module.

use regex::Regex;
use std::sync::OnceLock;

/// Returns the floored percentage from a `[download]  42.5% ...` line.
/// `None` means the line carried no progress; `Some(0)` is a real update.
pub fn parse_progress_percent(line: &str) -> Option<u8> {
    static PROGRESS_RE: OnceLock<Regex> = OnceLock::new();
    let re = PROGRESS_RE.get_or_init(|| Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%").unwrap());

    let caps = re.captures(line)?;
    let value: f64 = caps.get(1)?.as_str().parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(value.floor().clamp(0.0, 100.0) as u8)
}
