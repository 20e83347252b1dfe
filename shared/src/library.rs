/// The local video library: database rows plus their files on disk.
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::SqlitePool;
use std::collections::HashSet;
use std::path::PathBuf;
use tracing::info;

use crate::assets::{AssetLayout, CleanReport};
use crate::db;
use crate::errors::{YrpError, YrpResult};
use crate::models::VideoListing;

const MISSING_CHANNEL_TITLE: &str = "Missing channel title";

/// A stored video with the location and state of its files.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Video {
    pub id: String,
    pub title: String,
    pub publication_dt: DateTime<Utc>,
    pub channel_id: String,
    pub channel_title: String,
    pub watched: bool,
    pub downloading: bool,
    pub path: PathBuf,
    pub thumbnail_path: PathBuf,
    pub downloaded: bool,
    pub thumbnail_downloaded: bool,
}

/// Database pool, asset directories and retention window.
#[derive(Clone)]
pub struct Library {
    pub pool: SqlitePool,
    pub assets: AssetLayout,
    pub max_age: chrono::Duration,
}

impl Library {
    pub fn new(pool: SqlitePool, assets: AssetLayout, max_age: chrono::Duration) -> Self {
        Self {
            pool,
            assets,
            max_age,
        }
    }

    /// Videos published before this instant are out of the window.
    ///
    /// Windows reaching past the representable range start at the epoch.
    pub fn cutoff(&self) -> DateTime<Utc> {
        Utc::now()
            .checked_sub_signed(self.max_age)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    fn to_video(&self, listing: VideoListing) -> Video {
        Video {
            path: self.assets.video_path(&listing.id),
            thumbnail_path: self.assets.thumbnail_path(&listing.id),
            downloaded: self.assets.is_video_downloaded(&listing.id),
            thumbnail_downloaded: self.assets.is_thumbnail_downloaded(&listing.id),
            channel_title: listing
                .channel_title
                .unwrap_or_else(|| MISSING_CHANNEL_TITLE.to_string()),
            id: listing.id,
            title: listing.title,
            publication_dt: listing.publication_dt,
            channel_id: listing.channel_id,
            watched: listing.watched,
            downloading: listing.downloading,
        }
    }

    /// Unwatched videos inside the window, newest first.
    pub async fn videos(&self) -> YrpResult<Vec<Video>> {
        let listings = db::list_videos(&self.pool, self.cutoff()).await?;
        Ok(listings.into_iter().map(|l| self.to_video(l)).collect())
    }

    /// Every stored video regardless of age or watched state.
    pub async fn all_videos(&self) -> YrpResult<Vec<Video>> {
        let listings = db::list_all_videos(&self.pool).await?;
        Ok(listings.into_iter().map(|l| self.to_video(l)).collect())
    }

    pub async fn video(&self, video_id: &str) -> YrpResult<Video> {
        db::get_video(&self.pool, video_id)
            .await?
            .map(|l| self.to_video(l))
            .ok_or_else(|| YrpError::UnknownVideo(video_id.to_string()))
    }

    /// Mark a video watched and drop its files.
    pub async fn mark_watched(&self, video_id: &str) -> YrpResult<()> {
        if !db::set_watched(&self.pool, video_id, true).await? {
            return Err(YrpError::UnknownVideo(video_id.to_string()));
        }
        self.assets.delete_video_assets(video_id).await?;
        info!("Video {} marked as watched", video_id);
        Ok(())
    }

    pub async fn mark_unwatched(&self, video_id: &str) -> YrpResult<()> {
        if !db::set_watched(&self.pool, video_id, false).await? {
            return Err(YrpError::UnknownVideo(video_id.to_string()));
        }
        Ok(())
    }

    /// Delete a video's files, then its row.
    pub async fn delete_video(&self, video_id: &str) -> YrpResult<()> {
        self.assets.delete_video_assets(video_id).await?;
        if !db::delete_video(&self.pool, video_id).await? {
            return Err(YrpError::UnknownVideo(video_id.to_string()));
        }
        info!("Video {} deleted", video_id);
        Ok(())
    }

    /// Remove files of videos that are gone, watched, or out of the window.
    pub async fn clean_assets(&self) -> YrpResult<CleanReport> {
        let keep: HashSet<String> = db::list_video_ids(&self.pool, self.cutoff(), Some(false))
            .await?
            .into_iter()
            .collect();
        let in_flight: HashSet<String> = db::downloading_video_ids(&self.pool)
            .await?
            .into_iter()
            .collect();
        self.assets.clean_assets(&keep, &in_flight).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::tests::test_pool;
    use crate::models::NewVideo;
    use chrono::Duration;
    use std::collections::BTreeSet;
    use tempfile::TempDir;

    async fn library() -> (TempDir, TempDir, Library) {
        let (db_dir, pool) = test_pool().await;
        let asset_dir = tempfile::tempdir().unwrap();
        let assets = AssetLayout::new(
            asset_dir.path().join("thumbnails"),
            asset_dir.path().join("videos"),
        )
        .unwrap();
        assets.ensure_dirs().await.unwrap();

        let channels: BTreeSet<String> = ["A".to_string()].into_iter().collect();
        db::reconcile_channels(&pool, &channels).await.unwrap();
        let now = Utc::now();
        let entries = [
            NewVideo { id: "fresh".into(), title: "Fresh".into(), publication_dt: now - Duration::hours(1) },
            NewVideo { id: "stale".into(), title: "Stale".into(), publication_dt: now - Duration::days(5) },
        ];
        db::upload_feed_data(&pool, "A", "Channel A", &entries).await.unwrap();

        (db_dir, asset_dir, Library::new(pool, assets, Duration::days(1)))
    }

    fn touch(path: &std::path::Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[tokio::test]
    async fn test_videos_carry_paths_and_flags() {
        let (_db, _assets, library) = library().await;
        touch(&library.assets.thumbnail_path("fresh"));

        let videos = library.videos().await.unwrap();
        assert_eq!(videos.len(), 1);
        let video = &videos[0];
        assert_eq!(video.id, "fresh");
        assert_eq!(video.channel_title, "Channel A");
        assert!(video.thumbnail_downloaded);
        assert!(!video.downloaded);
        assert_eq!(video.path, library.assets.video_path("fresh"));
    }

    #[tokio::test]
    async fn test_mark_watched_removes_assets_and_hides_video() {
        let (_db, _assets, library) = library().await;
        touch(&library.assets.video_path("fresh"));
        touch(&library.assets.thumbnail_path("fresh"));

        library.mark_watched("fresh").await.unwrap();
        assert!(!library.assets.is_video_downloaded("fresh"));
        assert!(!library.assets.is_thumbnail_downloaded("fresh"));
        assert!(library.videos().await.unwrap().is_empty());
        assert!(library.video("fresh").await.unwrap().watched);

        library.mark_unwatched("fresh").await.unwrap();
        assert_eq!(library.videos().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_huge_window_lists_everything() {
        let (_db, _assets, mut library) = library().await;
        library.max_age = Duration::hours(4_000_000_000);

        assert_eq!(library.cutoff(), DateTime::<Utc>::UNIX_EPOCH);
        let ids: Vec<String> = library.videos().await.unwrap().into_iter().map(|v| v.id).collect();
        assert_eq!(ids, vec!["fresh", "stale"]);
    }

    #[tokio::test]
    async fn test_unknown_video() {
        let (_db, _assets, library) = library().await;
        assert!(matches!(library.video("nope").await, Err(YrpError::UnknownVideo(_))));
        assert!(matches!(library.mark_watched("nope").await, Err(YrpError::UnknownVideo(_))));
        assert!(matches!(library.delete_video("nope").await, Err(YrpError::UnknownVideo(_))));
    }

    #[tokio::test]
    async fn test_delete_video() {
        let (_db, _assets, library) = library().await;
        touch(&library.assets.video_path("fresh"));

        library.delete_video("fresh").await.unwrap();
        assert!(!library.assets.is_video_downloaded("fresh"));
        assert!(matches!(library.video("fresh").await, Err(YrpError::UnknownVideo(_))));
    }

    #[tokio::test]
    async fn test_clean_assets_keeps_only_fresh_unwatched() {
        let (_db, _assets, library) = library().await;
        for id in ["fresh", "stale", "orphan"] {
            touch(&library.assets.video_path(id));
            touch(&library.assets.thumbnail_path(id));
        }

        let report = library.clean_assets().await.unwrap();
        assert_eq!(report.removed.len(), 4);
        assert!(library.assets.is_video_downloaded("fresh"));
        assert!(library.assets.is_thumbnail_downloaded("fresh"));
        assert!(!library.assets.is_video_downloaded("stale"));
        assert!(!library.assets.is_thumbnail_downloaded("orphan"));
    }

    #[tokio::test]
    async fn test_all_videos_ignores_window() {
        let (_db, _assets, library) = library().await;
        assert_eq!(library.all_videos().await.unwrap().len(), 2);
    }
}
