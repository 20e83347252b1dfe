/// Concurrent download queue.
///
/// Uses a tokio Semaphore to bound how many yt-dlp processes run at once and
/// tracks the state of every video handed to it.
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedSemaphorePermit, Semaphore};
use tracing::{info, warn};

use crate::models::DownloadProgress;

/// State of a tracked download.
#[derive(Debug, Clone)]
pub struct TrackedDownload {
    pub video_id: String,
    pub state: DownloadState,
    pub progress: u8,
    pub speed: Option<String>,
    pub enqueued_at: chrono::DateTime<Utc>,
    pub started_at: Option<chrono::DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadState {
    Queued,
    Running,
    Done,
    Failed,
}

impl DownloadState {
    pub fn is_finished(&self) -> bool {
        matches!(self, DownloadState::Done | DownloadState::Failed)
    }
}

/// Download queue with concurrency control. Cloning shares the same queue.
#[derive(Clone)]
pub struct DownloadQueue {
    /// Semaphore to limit concurrent downloads.
    semaphore: Arc<Semaphore>,
    /// Active permits (held while a download runs).
    permits: Arc<Mutex<HashMap<String, OwnedSemaphorePermit>>>,
    /// Tracked download metadata.
    downloads: Arc<Mutex<HashMap<String, TrackedDownload>>>,
}

impl DownloadQueue {
    /// Create a new queue with the given concurrency limit.
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent.max(1))),
            permits: Arc::new(Mutex::new(HashMap::new())),
            downloads: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Enqueue a video. Returns false if it is already queued or running;
    /// finished downloads may be enqueued again.
    pub async fn enqueue(&self, video_id: &str) -> bool {
        let mut downloads = self.downloads.lock().await;
        if let Some(existing) = downloads.get(video_id) {
            if !existing.state.is_finished() {
                warn!("Video {} already in download queue", video_id);
                return false;
            }
        }

        downloads.insert(
            video_id.to_string(),
            TrackedDownload {
                video_id: video_id.to_string(),
                state: DownloadState::Queued,
                progress: 0,
                speed: None,
                enqueued_at: Utc::now(),
                started_at: None,
            },
        );

        info!("Video {} enqueued for download", video_id);
        true
    }

    /// Acquire a concurrency permit. Waits if at capacity; returns false
    /// only if the semaphore has been closed.
    pub async fn acquire(&self, video_id: &str) -> bool {
        let permit = match self.semaphore.clone().acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                warn!("Semaphore closed for video {}", video_id);
                return false;
            }
        };

        if let Some(download) = self.downloads.lock().await.get_mut(video_id) {
            download.state = DownloadState::Running;
            download.started_at = Some(Utc::now());
        }
        self.permits.lock().await.insert(video_id.to_string(), permit);

        info!("Video {} acquired download slot", video_id);
        true
    }

    /// Record progress for a running download.
    pub async fn update_progress(&self, video_id: &str, progress: &DownloadProgress) {
        if let Some(download) = self.downloads.lock().await.get_mut(video_id) {
            download.progress = progress.whole_percent();
            download.speed = progress.speed.clone();
        }
    }

    /// Mark a download as completed and release its permit.
    pub async fn complete(&self, video_id: &str) {
        if let Some(download) = self.downloads.lock().await.get_mut(video_id) {
            download.state = DownloadState::Done;
            download.progress = 100;
        }
        self.permits.lock().await.remove(video_id);
        info!("Video {} downloaded, slot released", video_id);
    }

    /// Mark a download as failed and release its permit.
    pub async fn fail(&self, video_id: &str) {
        if let Some(download) = self.downloads.lock().await.get_mut(video_id) {
            download.state = DownloadState::Failed;
        }
        self.permits.lock().await.remove(video_id);
        warn!("Video {} download failed, slot released", video_id);
    }

    pub async fn get_status(&self, video_id: &str) -> Option<TrackedDownload> {
        self.downloads.lock().await.get(video_id).cloned()
    }

    /// Forget finished downloads older than the retention period.
    pub async fn cleanup_old(&self, max_age_secs: i64) {
        let cutoff = Utc::now() - chrono::Duration::seconds(max_age_secs);
        let mut downloads = self.downloads.lock().await;
        downloads.retain(|_, d| !d.state.is_finished() || d.enqueued_at > cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_and_acquire() {
        let queue = DownloadQueue::new(2);
        assert!(queue.enqueue("v1").await);
        assert!(queue.acquire("v1").await);
        let status = queue.get_status("v1").await.unwrap();
        assert_eq!(status.state, DownloadState::Running);
        assert!(status.started_at.is_some());
    }

    #[tokio::test]
    async fn test_complete_releases_slot() {
        let queue = DownloadQueue::new(1);
        queue.enqueue("v1").await;
        queue.enqueue("v2").await;
        queue.acquire("v1").await;

        let waiting = {
            let queue = queue.clone();
            tokio::spawn(async move { queue.acquire("v2").await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!waiting.is_finished());
        assert_eq!(queue.get_status("v2").await.unwrap().state, DownloadState::Queued);

        queue.complete("v1").await;
        assert!(waiting.await.unwrap());
        assert_eq!(queue.get_status("v1").await.unwrap().progress, 100);
        assert_eq!(queue.get_status("v2").await.unwrap().state, DownloadState::Running);
    }

    #[tokio::test]
    async fn test_duplicate_enqueue() {
        let queue = DownloadQueue::new(2);
        assert!(queue.enqueue("v1").await);
        assert!(!queue.enqueue("v1").await);
    }

    #[tokio::test]
    async fn test_failed_download_can_be_requeued() {
        let queue = DownloadQueue::new(1);
        queue.enqueue("v1").await;
        queue.acquire("v1").await;
        queue.fail("v1").await;
        assert!(queue.enqueue("v1").await);
        assert_eq!(queue.get_status("v1").await.unwrap().state, DownloadState::Queued);
    }

    #[tokio::test]
    async fn test_progress_is_recorded() {
        let queue = DownloadQueue::new(1);
        queue.enqueue("v1").await;
        queue.acquire("v1").await;
        let progress = DownloadProgress {
            percent: 41.6,
            speed: Some("1.20MiB/s".into()),
            ..Default::default()
        };
        queue.update_progress("v1", &progress).await;

        let status = queue.get_status("v1").await.unwrap();
        assert_eq!(status.progress, 42);
        assert_eq!(status.speed.as_deref(), Some("1.20MiB/s"));
    }

    #[tokio::test]
    async fn test_cleanup_keeps_active_downloads() {
        let queue = DownloadQueue::new(2);
        queue.enqueue("done").await;
        queue.acquire("done").await;
        queue.complete("done").await;
        queue.enqueue("waiting").await;

        queue.cleanup_old(-1).await;
        assert!(queue.get_status("done").await.is_none());
        assert!(queue.get_status("waiting").await.is_some());
    }
}
