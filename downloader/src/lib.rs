//! Feed fetching, thumbnail downloads and the yt-dlp driver for yrp.
pub mod client;
pub mod errors;
pub mod feed;
pub mod progress;
pub mod sync;
pub mod ytdlp;

pub use client::FeedClient;
pub use errors::{DownloadError, FeedError};
pub use sync::{download_video, sync, SyncEvent, SyncReport};
pub use ytdlp::YtDlp;
