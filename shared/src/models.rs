/// Database models shared across all yrp crates.
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Channel followed by the user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct Channel {
    pub id: String,
    /// Unknown until the channel's feed has been fetched once.
    pub title: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Video row joined with the title of the channel it belongs to.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, PartialEq, Eq)]
pub struct VideoListing {
    pub id: String,
    pub channel_id: String,
    pub channel_title: Option<String>,
    pub title: String,
    pub publication_dt: DateTime<Utc>,
    pub downloading: bool,
    pub watched: bool,
}

/// Feed entry ready to be stored.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewVideo {
    pub id: String,
    pub title: String,
    pub publication_dt: DateTime<Utc>,
}

/// Result of reconciling the channel table with the configured channel set.
#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct ChannelDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl ChannelDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Progress of a running yt-dlp download.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DownloadProgress {
    pub percent: f32,
    pub total: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

impl DownloadProgress {
    /// Percentage clamped to a whole number in `0..=100`.
    pub fn whole_percent(&self) -> u8 {
        self.percent.clamp(0.0, 100.0).round() as u8
    }
}
