/// Subcommand handlers.
use anyhow::{Context, Result};
use chrono::Utc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use yrp_downloader::{download_video, sync, FeedClient, SyncEvent, YtDlp};
use yrp_shared::config::Config;
use yrp_shared::db;
use yrp_shared::models::DownloadProgress;
use yrp_shared::queue::DownloadQueue;
use yrp_shared::Library;

use crate::cli::Command;
use crate::display;

/// Shared application state passed to handlers.
pub struct App {
    pub library: Library,
    pub config: Config,
    pub client: FeedClient,
    pub ytdlp: YtDlp,
    pub queue: DownloadQueue,
}

impl App {
    pub fn new(library: Library, config: Config) -> Self {
        Self {
            client: FeedClient::default(),
            ytdlp: YtDlp::new(config.ytdlp.clone()),
            queue: DownloadQueue::new(config.max_concurrent_downloads),
            library,
            config,
        }
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Sync { no_clean } => self.sync(!no_clean).await.map(|_| ()),
            Command::List { json, all } => self.list(json, all).await,
            Command::Download { ids } => self.download(&ids).await,
            Command::Watched { id } => {
                self.library.mark_watched(&id).await?;
                println!("{id} marked as watched");
                Ok(())
            }
            Command::Unwatched { id } => {
                self.library.mark_unwatched(&id).await?;
                println!("{id} marked as unwatched");
                Ok(())
            }
            Command::Delete { id } => {
                self.library.delete_video(&id).await?;
                println!("{id} deleted");
                Ok(())
            }
            Command::Clean => {
                let report = self.library.clean_assets().await?;
                println!("Removed {} files", report.removed.len());
                Ok(())
            }
            Command::Channels => {
                let channels = db::list_channels(&self.library.pool).await?;
                display::print_channels(&channels, Utc::now());
                Ok(())
            }
            Command::Watch { interval, download } => {
                let interval = interval
                    .map(Duration::from_secs)
                    .unwrap_or(self.config.poll_interval);
                self.watch(interval.max(Duration::from_secs(1)), download).await
            }
        }
    }

    /// Run one sync; returns the ids of newly stored videos.
    async fn sync(&self, clean: bool) -> Result<Vec<String>> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let collect = tokio::spawn(async move {
            let mut new_ids = Vec::new();
            while let Some(event) = rx.recv().await {
                if let SyncEvent::NewVideo(id) = event {
                    new_ids.push(id);
                }
            }
            new_ids
        });

        let report = sync(&self.library, &self.client, &self.config, Some(tx))
            .await
            .context("Sync failed")?;
        let new_ids = collect.await.unwrap_or_default();

        println!(
            "{} new videos from {} feeds ({} failed), {} thumbnails",
            report.new_videos, report.feeds_fetched, report.feeds_failed, report.thumbnails_downloaded
        );

        if clean {
            let cleaned = self.library.clean_assets().await?;
            if !cleaned.removed.is_empty() {
                info!("Removed {} stale files", cleaned.removed.len());
            }
        }
        Ok(new_ids)
    }

    async fn list(&self, json: bool, all: bool) -> Result<()> {
        let videos = if all {
            self.library.all_videos().await?
        } else {
            self.library.videos().await?
        };

        if json {
            println!("{}", serde_json::to_string_pretty(&videos)?);
        } else {
            display::print_videos(&videos, Utc::now());
        }
        Ok(())
    }

    /// Download videos concurrently, bounded by the queue.
    async fn download(&self, ids: &[String]) -> Result<()> {
        let mut handles = Vec::new();
        for id in ids {
            let library = self.library.clone();
            let ytdlp = self.ytdlp.clone();
            let queue = self.queue.clone();
            let id = id.clone();
            handles.push(tokio::spawn(async move {
                let (tx, mut rx) = mpsc::unbounded_channel::<DownloadProgress>();
                let printer = {
                    let id = id.clone();
                    tokio::spawn(async move {
                        let mut last = None;
                        while let Some(progress) = rx.recv().await {
                            if let Some(line) = display::progress_line(&id, last, &progress) {
                                println!("{line}");
                                last = Some(progress.whole_percent());
                            }
                        }
                    })
                };
                let result = download_video(&library, &ytdlp, &queue, &id, Some(tx)).await;
                let _ = printer.await;
                (id, result)
            }));
        }

        let mut failed = 0;
        for handle in handles {
            match handle.await {
                Ok((id, Ok(()))) => println!("{id}: done"),
                Ok((id, Err(e))) => {
                    error!("Download of {} failed: {}", id, e);
                    eprintln!("{id}: {e}");
                    failed += 1;
                }
                Err(e) => {
                    error!("Download task panicked: {}", e);
                    failed += 1;
                }
            }
        }

        for id in ids {
            if let Some(status) = self.queue.get_status(id).await {
                display::print_download(&status);
            }
        }

        if failed > 0 {
            anyhow::bail!("{failed} of {} downloads failed", ids.len());
        }
        Ok(())
    }

    /// Sync on an interval until Ctrl-C.
    async fn watch(&self, interval: Duration, download: bool) -> Result<()> {
        info!("Watching feeds every {}s", interval.as_secs());
        let mut ticker = tokio::time::interval(interval);
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Interrupted, stopping");
                    return Ok(());
                }
                _ = self.poll_once(&mut ticker, download) => {}
            }
        }
    }

    async fn poll_once(&self, ticker: &mut tokio::time::Interval, download: bool) {
        ticker.tick().await;

        let new_ids = match self.sync(true).await {
            Ok(ids) => ids,
            Err(e) => {
                warn!("{:#}", e);
                return;
            }
        };

        if download && !new_ids.is_empty() {
            // Only videos inside the retention window are worth fetching
            let listed = match self.library.videos().await {
                Ok(videos) => videos,
                Err(e) => {
                    warn!("Failed to list videos: {}", e);
                    return;
                }
            };
            let wanted: Vec<String> = listed
                .into_iter()
                .filter(|v| !v.downloaded && new_ids.contains(&v.id))
                .map(|v| v.id)
                .collect();
            if !wanted.is_empty() {
                if let Err(e) = self.download(&wanted).await {
                    warn!("{:#}", e);
                }
            }
        }

        self.queue.cleanup_old(3600).await;
    }
}
