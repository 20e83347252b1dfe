/// Errors raised by feed fetching and yt-dlp downloads.
use thiserror::Error;
use yrp_shared::YrpError;

/// Errors related to fetching and parsing channel feeds.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("RSS feed doesn't match Youtube's RSS feed format: {0}")]
    NotAYoutubeFeed(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid feed XML: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("Entry {video_id} has an invalid publication date '{value}': {source}")]
    InvalidTimestamp {
        video_id: String,
        value: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors related to running yt-dlp.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Failed to spawn {binary}: {source}")]
    SpawnFailed {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("yt-dlp exited with code {code:?}: {stderr}")]
    Exited { code: Option<i32>, stderr: String },

    #[error("Video {0} is already being downloaded")]
    AlreadyQueued(String),

    #[error("Download queue closed before {0} could start")]
    QueueClosed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Library(#[from] YrpError),
}
