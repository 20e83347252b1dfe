/// Feed synchronization and video downloads against the local library.
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::client::FeedClient;
use crate::errors::DownloadError;
use crate::ytdlp::YtDlp;
use yrp_shared::config::Config;
use yrp_shared::db;
use yrp_shared::models::{ChannelDiff, DownloadProgress, NewVideo};
use yrp_shared::queue::DownloadQueue;
use yrp_shared::{Library, YrpResult};

const THUMBNAIL_CONCURRENCY: usize = 8;

/// Emitted while a sync runs so frontends can refresh incrementally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    NewVideo(String),
    ThumbnailReady(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub channels: ChannelDiff,
    pub feeds_fetched: usize,
    pub feeds_failed: usize,
    pub new_videos: usize,
    pub thumbnails_downloaded: usize,
}

fn emit(events: &Option<mpsc::UnboundedSender<SyncEvent>>, event: SyncEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event);
    }
}

/// Bring the library up to date with the configured channels.
///
/// Database failures abort the run; failures of individual feeds or
/// thumbnails are logged and counted.
pub async fn sync(
    library: &Library,
    client: &FeedClient,
    config: &Config,
    events: Option<mpsc::UnboundedSender<SyncEvent>>,
) -> YrpResult<SyncReport> {
    let mut report = SyncReport {
        channels: db::reconcile_channels(&library.pool, &config.channel_ids()).await?,
        ..Default::default()
    };

    let channel_ids = db::list_channel_ids(&library.pool).await?;
    info!("Syncing {} channels", channel_ids.len());

    let mut fetches = JoinSet::new();
    for channel_id in channel_ids {
        let client = client.clone();
        fetches.spawn(async move {
            let result = client.fetch_feed(&channel_id).await;
            (channel_id, result)
        });
    }

    while let Some(joined) = fetches.join_next().await {
        let (channel_id, result) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                error!("Feed task panicked: {}", e);
                report.feeds_failed += 1;
                continue;
            }
        };

        let feed = match result {
            Ok(Some(feed)) => feed,
            Ok(None) => {
                report.feeds_failed += 1;
                continue;
            }
            Err(e) => {
                warn!("Failed to fetch feed for {}: {}", channel_id, e);
                report.feeds_failed += 1;
                continue;
            }
        };
        report.feeds_fetched += 1;

        let filter = config.filter(&channel_id);
        let entries: Vec<NewVideo> = feed
            .entries
            .iter()
            .filter(|entry| filter.map_or(true, |f| f.accepts(&entry.title)))
            .map(NewVideo::from)
            .collect();
        let skipped = feed.entries.len() - entries.len();
        if skipped > 0 {
            debug!("Channel {}: {} entries filtered out", channel_id, skipped);
        }

        let inserted = db::upload_feed_data(&library.pool, &channel_id, &feed.title, &entries).await?;
        report.new_videos += inserted.len();
        for video_id in inserted {
            emit(&events, SyncEvent::NewVideo(video_id));
        }
    }

    report.thumbnails_downloaded = download_thumbnails(library, client, &events).await?;

    info!(
        "Sync done: {} feeds fetched, {} failed, {} new videos, {} thumbnails",
        report.feeds_fetched, report.feeds_failed, report.new_videos, report.thumbnails_downloaded
    );
    Ok(report)
}

/// Fetch missing thumbnails of unwatched videos inside the retention window.
async fn download_thumbnails(
    library: &Library,
    client: &FeedClient,
    events: &Option<mpsc::UnboundedSender<SyncEvent>>,
) -> YrpResult<usize> {
    let video_ids = db::list_video_ids(&library.pool, library.cutoff(), Some(false)).await?;
    let semaphore = Arc::new(Semaphore::new(THUMBNAIL_CONCURRENCY));
    let mut downloads = JoinSet::new();

    for video_id in video_ids {
        let path = library.assets.thumbnail_path(&video_id);
        if path.is_file() {
            continue;
        }
        let client = client.clone();
        let semaphore = semaphore.clone();
        downloads.spawn(async move {
            let _permit = semaphore.acquire_owned().await;
            let result = client.download_thumbnail(&video_id, &path).await;
            (video_id, result)
        });
    }

    let mut downloaded = 0;
    while let Some(joined) = downloads.join_next().await {
        match joined {
            Ok((video_id, Ok(true))) => {
                downloaded += 1;
                emit(events, SyncEvent::ThumbnailReady(video_id));
            }
            Ok((_, Ok(false))) => {}
            Ok((video_id, Err(e))) => warn!("Failed to download thumbnail for {}: {}", video_id, e),
            Err(e) => error!("Thumbnail task panicked: {}", e),
        }
    }
    Ok(downloaded)
}

/// Download one video through the queue.
///
/// The `downloading` flag is set for the duration of the yt-dlp run and
/// cleared whatever its outcome.
pub async fn download_video(
    library: &Library,
    ytdlp: &YtDlp,
    queue: &DownloadQueue,
    video_id: &str,
    progress: Option<mpsc::UnboundedSender<DownloadProgress>>,
) -> Result<(), DownloadError> {
    library.video(video_id).await?;

    if !queue.enqueue(video_id).await {
        return Err(DownloadError::AlreadyQueued(video_id.to_string()));
    }
    if !queue.acquire(video_id).await {
        return Err(DownloadError::QueueClosed(video_id.to_string()));
    }

    // Relay progress into the queue before handing it on
    let (relay_tx, mut relay_rx) = mpsc::unbounded_channel::<DownloadProgress>();
    let relay = {
        let queue = queue.clone();
        let video_id = video_id.to_string();
        tokio::spawn(async move {
            while let Some(update) = relay_rx.recv().await {
                queue.update_progress(&video_id, &update).await;
                if let Some(tx) = &progress {
                    let _ = tx.send(update);
                }
            }
        })
    };

    if let Err(e) = db::set_downloading(&library.pool, video_id, true).await {
        queue.fail(video_id).await;
        return Err(e.into());
    }

    let result = ytdlp
        .download(video_id, &library.assets.video_dir, Some(relay_tx))
        .await;
    let _ = relay.await;

    let reset = db::set_downloading(&library.pool, video_id, false).await;

    match (result, reset) {
        (Ok(()), Ok(_)) => {
            queue.complete(video_id).await;
            Ok(())
        }
        (Ok(()), Err(e)) => {
            queue.fail(video_id).await;
            Err(e.into())
        }
        (Err(e), reset) => {
            if let Err(reset_err) = reset {
                error!("Failed to clear downloading flag of {}: {}", video_id, reset_err);
            }
            queue.fail(video_id).await;
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::tests::client_for;
    use crate::feed::tests::SAMPLE_FEED;
    use std::path::Path;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};
    use yrp_shared::assets::AssetLayout;
    use yrp_shared::queue::DownloadState;

    const CHANNEL: &str = "UCXuqSBlHAE6Xw-yeJA0Tunw";
    const BROKEN_CHANNEL: &str = "UCBJycsmduvYEL83R_U4JriQ";

    async fn library(max_age: chrono::Duration) -> (TempDir, Library) {
        let dir = tempfile::tempdir().unwrap();
        let pool = db::create_pool(&dir.path().join("yrp.db")).await.unwrap();
        db::run_migrations(&pool).await.unwrap();
        let assets = AssetLayout::new(dir.path().join("thumbnails"), dir.path().join("videos")).unwrap();
        assets.ensure_dirs().await.unwrap();
        (dir, Library::new(pool, assets, max_age))
    }

    fn config(text: &str) -> Config {
        Config::parse(text, Path::new("yrp.toml")).unwrap()
    }

    async fn feed_server() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feeds/videos.xml"))
            .and(query_param("channel_id", CHANNEL))
            .respond_with(ResponseTemplate::new(200).set_body_string(SAMPLE_FEED))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/feeds/videos.xml"))
            .and(query_param("channel_id", BROKEN_CHANNEL))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/vi/aaaaaaaaaaa/mqdefault.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"jpeg".to_vec()))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_sync_filters_and_fetches_thumbnails() {
        let server = feed_server().await;
        let (_dir, library) = library(chrono::Duration::days(365 * 100)).await;
        let config = config(&format!(
            r##"
            channels = [
                {{ id = "{CHANNEL}", exclude = ["#Shorts"] }},
                "{BROKEN_CHANNEL}",
            ]
            "##
        ));
        let (tx, mut rx) = mpsc::unbounded_channel();

        let report = sync(&library, &client_for(&server), &config, Some(tx)).await.unwrap();
        assert_eq!(report.channels.added.len(), 2);
        assert_eq!(report.feeds_fetched, 1);
        assert_eq!(report.feeds_failed, 1);
        assert_eq!(report.new_videos, 1);
        assert_eq!(report.thumbnails_downloaded, 1);

        assert_eq!(rx.recv().await, Some(SyncEvent::NewVideo("aaaaaaaaaaa".into())));
        assert_eq!(rx.recv().await, Some(SyncEvent::ThumbnailReady("aaaaaaaaaaa".into())));

        let videos = library.videos().await.unwrap();
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].channel_title, "Linus Tech Tips & Friends");
        assert!(videos[0].thumbnail_downloaded);
    }

    #[tokio::test]
    async fn test_resync_keeps_flags() {
        let server = feed_server().await;
        let (_dir, library) = library(chrono::Duration::days(365 * 100)).await;
        let config = config(&format!(r#"channels = ["{CHANNEL}"]"#));
        let client = client_for(&server);

        let first = sync(&library, &client, &config, None).await.unwrap();
        assert_eq!(first.new_videos, 2);
        library.mark_watched("bbbbbbbbbbb").await.unwrap();

        let second = sync(&library, &client, &config, None).await.unwrap();
        assert!(second.channels.is_empty());
        assert_eq!(second.new_videos, 0);
        assert!(library.video("bbbbbbbbbbb").await.unwrap().watched);
    }

    #[tokio::test]
    async fn test_watched_videos_get_no_thumbnails() {
        let server = feed_server().await;
        let (_dir, library) = library(chrono::Duration::days(365 * 100)).await;
        let config = config(&format!(r#"channels = ["{CHANNEL}"]"#));
        let client = client_for(&server);

        let first = sync(&library, &client, &config, None).await.unwrap();
        assert_eq!(first.thumbnails_downloaded, 1);
        library.mark_watched("aaaaaaaaaaa").await.unwrap();
        assert!(!library.assets.thumbnail_path("aaaaaaaaaaa").exists());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let second = sync(&library, &client, &config, Some(tx)).await.unwrap();
        assert_eq!(second.thumbnails_downloaded, 0);
        assert_eq!(rx.recv().await, None);
        assert!(!library.assets.thumbnail_path("aaaaaaaaaaa").exists());
    }

    #[tokio::test]
    async fn test_removed_channel_drops_videos() {
        let server = feed_server().await;
        let (_dir, library) = library(chrono::Duration::days(365 * 100)).await;
        let client = client_for(&server);

        sync(&library, &client, &config(&format!(r#"channels = ["{CHANNEL}"]"#)), None)
            .await
            .unwrap();
        let report = sync(&library, &client, &config(""), None).await.unwrap();

        assert_eq!(report.channels.removed, vec![CHANNEL.to_string()]);
        assert!(library.all_videos().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_old_videos_get_no_thumbnails() {
        let server = feed_server().await;
        let (_dir, library) = library(chrono::Duration::hours(24)).await;
        let config = config(&format!(r#"channels = ["{CHANNEL}"]"#));

        let report = sync(&library, &client_for(&server), &config, None).await.unwrap();
        assert_eq!(report.new_videos, 2);
        assert_eq!(report.thumbnails_downloaded, 0);
        assert!(library.videos().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_unknown_video() {
        let (_dir, library) = library(chrono::Duration::hours(24)).await;
        let queue = DownloadQueue::new(1);
        let err = download_video(&library, &YtDlp::new(Default::default()), &queue, "nope", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Library(_)));
        assert!(queue.get_status("nope").await.is_none());
    }

    #[cfg(unix)]
    fn fake_ytdlp(dir: &Path, exit_code: i32) -> YtDlp {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join(format!("fake-ytdlp-{exit_code}"));
        std::fs::write(
            &script,
            format!(
                r#"#!/bin/sh
while [ "$#" -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
echo '[download]  50.0% of 1.00MiB at 1.00MiB/s ETA 00:01'
if [ {exit_code} -ne 0 ]; then echo 'ERROR: boom' >&2; exit {exit_code}; fi
touch "$(dirname "$out")/$(basename "$out" .%\(ext\)s).mkv"
"#
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        YtDlp::new(yrp_shared::config::YtDlpConfig {
            binary: script.to_string_lossy().to_string(),
            ..Default::default()
        })
    }

    #[cfg(unix)]
    async fn library_with_video() -> (TempDir, Library) {
        let server = feed_server().await;
        let (dir, library) = library(chrono::Duration::days(365 * 100)).await;
        let config = config(&format!(r#"channels = ["{CHANNEL}"]"#));
        sync(&library, &client_for(&server), &config, None).await.unwrap();
        (dir, library)
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_video_success() {
        let (dir, library) = library_with_video().await;
        let ytdlp = fake_ytdlp(dir.path(), 0);
        let queue = DownloadQueue::new(1);
        let (tx, mut rx) = mpsc::unbounded_channel();

        download_video(&library, &ytdlp, &queue, "aaaaaaaaaaa", Some(tx))
            .await
            .unwrap();

        let video = library.video("aaaaaaaaaaa").await.unwrap();
        assert!(video.downloaded);
        assert!(!video.downloading);
        assert_eq!(rx.recv().await.unwrap().whole_percent(), 50);
        assert_eq!(
            queue.get_status("aaaaaaaaaaa").await.unwrap().state,
            DownloadState::Done
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_download_video_failure_resets_flag() {
        let (dir, library) = library_with_video().await;
        let ytdlp = fake_ytdlp(dir.path(), 2);
        let queue = DownloadQueue::new(1);

        let err = download_video(&library, &ytdlp, &queue, "aaaaaaaaaaa", None)
            .await
            .unwrap_err();
        assert!(matches!(err, DownloadError::Exited { code: Some(2), .. }));

        let video = library.video("aaaaaaaaaaa").await.unwrap();
        assert!(!video.downloading);
        assert!(!video.downloaded);
        assert_eq!(
            queue.get_status("aaaaaaaaaaa").await.unwrap().state,
            DownloadState::Failed
        );
    }
}
