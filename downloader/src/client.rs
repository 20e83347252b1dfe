/// HTTP access to channel feeds and video thumbnails.
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::FeedError;
use crate::feed::{parse_feed, ParsedFeed, FEED_PREFIX};

pub const THUMBNAIL_BASE: &str = "http://img.youtube.com/vi";

/// Thin wrapper over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct FeedClient {
    http: reqwest::Client,
    feed_prefix: String,
    thumbnail_base: String,
}

impl Default for FeedClient {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl FeedClient {
    pub fn new(http: reqwest::Client) -> Self {
        Self {
            http,
            feed_prefix: FEED_PREFIX.to_string(),
            thumbnail_base: THUMBNAIL_BASE.to_string(),
        }
    }

    /// Point the client at other endpoints (mirrors, test servers).
    pub fn with_endpoints(mut self, feed_prefix: impl Into<String>, thumbnail_base: impl Into<String>) -> Self {
        self.feed_prefix = feed_prefix.into();
        self.thumbnail_base = thumbnail_base.into();
        self
    }

    pub fn thumbnail_url(&self, video_id: &str) -> String {
        format!("{}/{}/mqdefault.jpg", self.thumbnail_base.trim_end_matches('/'), video_id)
    }

    /// Fetch and parse a channel's feed. Non-200 responses yield `None`.
    pub async fn fetch_feed(&self, channel_id: &str) -> Result<Option<ParsedFeed>, FeedError> {
        let url = format!("{}{}", self.feed_prefix, channel_id);
        let resp = self.http.get(&url).send().await?;

        if resp.status() != reqwest::StatusCode::OK {
            warn!("Feed for channel {} returned status {}", channel_id, resp.status());
            return Ok(None);
        }

        let text = resp.text().await?;
        let feed = parse_feed(&text)?;
        debug!("Fetched feed for {}: {} entries", channel_id, feed.entries.len());
        Ok(Some(feed))
    }

    /// Download a thumbnail to `path` unless it is already there.
    ///
    /// The bytes go to a `.part` sibling first and are renamed into place, so
    /// `path` never holds a truncated image. Returns whether a file was written.
    pub async fn download_thumbnail(&self, video_id: &str, path: &Path) -> Result<bool, FeedError> {
        if path.is_file() {
            return Ok(false);
        }

        let resp = self.http.get(self.thumbnail_url(video_id)).send().await?;
        if resp.status() != reqwest::StatusCode::OK {
            warn!("Thumbnail for {} returned status {}", video_id, resp.status());
            return Ok(false);
        }

        let bytes = resp.bytes().await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let partial = partial_path(path);
        if let Err(e) = write_then_rename(&partial, path, &bytes).await {
            let _ = tokio::fs::remove_file(&partial).await;
            return Err(e.into());
        }
        debug!("Thumbnail for {} saved ({} bytes)", video_id, bytes.len());
        Ok(true)
    }
}

fn partial_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn write_then_rename(partial: &Path, path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(partial, bytes).await?;
    tokio::fs::rename(partial, path).await
}
