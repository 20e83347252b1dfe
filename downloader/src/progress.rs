/// Parsing of yt-dlp's `--newline` progress output.
use once_cell::sync::Lazy;
use regex::Regex;
use yrp_shared::models::DownloadProgress;

static PROGRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^\[download\]\s+(?P<percent>\d+(?:\.\d+)?)%(?:\s+of\s+~?\s*(?P<total>\S+))?(?:\s+at\s+(?P<speed>\S+))?(?:\s+ETA\s+(?P<eta>\S+))?",
    )
    .unwrap()
});

/// Turn a `[download]  42.3% of 10.00MiB at 1.20MiB/s ETA 00:05` line into progress.
pub fn parse_progress_line(line: &str) -> Option<DownloadProgress> {
    let caps = PROGRESS_RE.captures(line.trim())?;
    let percent = caps.name("percent")?.as_str().parse::<f32>().ok()?;

    // yt-dlp prints "Unknown" placeholders before sizes and rates are known
    let field = |name: &str| {
        caps.name(name)
            .map(|m| m.as_str().to_string())
            .filter(|v| !v.starts_with("Unknown"))
    };

    Some(DownloadProgress {
        percent,
        total: field("total"),
        speed: field("speed"),
        eta: field("eta"),
    })
}
