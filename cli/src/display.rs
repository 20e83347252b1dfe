/// Terminal rendering of library contents.
use chrono::{DateTime, Datelike, Months, Utc};
use yrp_shared::models::{Channel, DownloadProgress};
use yrp_shared::queue::TrackedDownload;
use yrp_shared::Video;

/// Largest calendar unit between `then` and `now`, e.g. "3 hours ago".
pub fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    if then >= now {
        return "1 min ago".to_string();
    }

    let mut months = (now.year() - then.year()) * 12 + now.month() as i32 - then.month() as i32;
    let mut anchor = then;
    if months > 0 {
        match then.checked_add_months(Months::new(months as u32)) {
            Some(shifted) if shifted <= now => anchor = shifted,
            _ => {
                months -= 1;
                if months > 0 {
                    anchor = then
                        .checked_add_months(Months::new(months as u32))
                        .unwrap_or(then);
                }
            }
        }
    } else {
        months = 0;
    }

    let rest = now - anchor;
    let units = [
        (months / 12, "year"),
        (months % 12, "month"),
        (rest.num_days() as i32, "day"),
        ((rest.num_hours() % 24) as i32, "hour"),
        ((rest.num_minutes() % 60) as i32, "minute"),
    ];

    units
        .iter()
        .find(|(value, _)| *value > 0)
        .map(|(value, unit)| {
            let s = if *value > 1 { "s" } else { "" };
            format!("{value} {unit}{s} ago")
        })
        .unwrap_or_else(|| "1 min ago".to_string())
}

fn status_marker(video: &Video) -> &'static str {
    if video.downloading {
        "downloading"
    } else if video.downloaded {
        "downloaded"
    } else if video.watched {
        "watched"
    } else {
        ""
    }
}

pub fn print_videos(videos: &[Video], now: DateTime<Utc>) {
    if videos.is_empty() {
        println!("No videos.");
        return;
    }
    for video in videos {
        println!(
            "{}  {:<14} {:<24} {} {}",
            video.id,
            format_time_ago(video.publication_dt, now),
            truncate(&video.channel_title, 24),
            video.title,
            status_marker(video),
        );
    }
}

pub fn print_channels(channels: &[Channel], now: DateTime<Utc>) {
    if channels.is_empty() {
        println!("No channels configured.");
        return;
    }
    for channel in channels {
        let updated = channel
            .last_updated
            .map(|dt| format!("updated {}", format_time_ago(dt, now)))
            .unwrap_or_else(|| "never fetched".to_string());
        println!(
            "{}  {:<32} {}",
            channel.id,
            channel.title.as_deref().unwrap_or("-"),
            updated
        );
    }
}

/// Progress line for `video_id`, printed once per ten percent step.
pub fn progress_line(video_id: &str, last: Option<u8>, progress: &DownloadProgress) -> Option<String> {
    let percent = progress.whole_percent();
    if last.is_some_and(|l| percent / 10 <= l / 10) {
        return None;
    }
    let line = match progress.speed.as_deref() {
        Some(speed) => format!("{video_id}: {percent}% {speed}"),
        None => format!("{video_id}: {percent}%"),
    };
    Some(line)
}

pub fn print_download(download: &TrackedDownload) {
    let speed = download.speed.as_deref().unwrap_or("");
    println!(
        "{}  {:?} {:>3}% {}",
        download.video_id, download.state, download.progress, speed
    );
}

fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}
