/// YouTube channel feeds: URLs and Atom parsing.
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::errors::FeedError;
pub use yrp_shared::config::is_valid_channel_id;
use yrp_shared::models::NewVideo;

pub const FEED_PREFIX: &str = "https://www.youtube.com/feeds/videos.xml?channel_id=";

static FEED_URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^{}([A-Za-z0-9_-]{{24}})$",
        regex::escape(FEED_PREFIX)
    ))
    .unwrap()
});

pub fn feed_url(channel_id: &str) -> String {
    format!("{FEED_PREFIX}{channel_id}")
}

/// Extract the channel id from a YouTube feed URL.
pub fn extract_channel_id(url: &str) -> Result<String, FeedError> {
    FEED_URL_RE
        .captures(url)
        .map(|cap| cap[1].to_string())
        .ok_or_else(|| FeedError::NotAYoutubeFeed(url.to_string()))
}

/// A parsed channel feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFeed {
    pub title: String,
    pub channel_id: Option<String>,
    pub entries: Vec<FeedEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedEntry {
    pub video_id: String,
    pub title: String,
    pub published: DateTime<Utc>,
}

impl From<&FeedEntry> for NewVideo {
    fn from(entry: &FeedEntry) -> Self {
        NewVideo {
            id: entry.video_id.clone(),
            title: entry.title.clone(),
            publication_dt: entry.published,
        }
    }
}

// quick-xml matches elements by local name, so `yt:videoId` is `videoId`.
#[derive(Debug, Deserialize)]
struct AtomFeed {
    title: String,
    #[serde(rename = "channelId", default)]
    channel_id: Option<String>,
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    #[serde(rename = "videoId")]
    video_id: String,
    title: String,
    published: String,
}

/// Parse the Atom document served for a channel.
pub fn parse_feed(xml: &str) -> Result<ParsedFeed, FeedError> {
    let feed: AtomFeed = quick_xml::de::from_str(xml)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let published = DateTime::parse_from_rfc3339(entry.published.trim())
                .map_err(|source| FeedError::InvalidTimestamp {
                    video_id: entry.video_id.clone(),
                    value: entry.published.clone(),
                    source,
                })?
                .with_timezone(&Utc);
            Ok(FeedEntry {
                video_id: entry.video_id,
                title: entry.title,
                published,
            })
        })
        .collect::<Result<Vec<_>, FeedError>>()?;

    Ok(ParsedFeed {
        title: feed.title,
        channel_id: feed.channel_id,
        entries,
    })
}
