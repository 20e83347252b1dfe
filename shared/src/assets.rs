/// On-disk layout of thumbnails and videos, and their reconciliation with
/// the database.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::errors::{YrpError, YrpResult};

pub const VIDEO_FORMAT: &str = "mkv";
pub const THUMBNAIL_FORMAT: &str = "jpg";

/// Directories holding downloaded thumbnails and videos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLayout {
    pub thumbnail_dir: PathBuf,
    pub video_dir: PathBuf,
}

/// Files removed by [`AssetLayout::clean_assets`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanReport {
    pub removed: Vec<PathBuf>,
}

impl AssetLayout {
    /// Create a layout, making relative directories absolute against the
    /// current working directory.
    pub fn new(thumbnail_dir: impl Into<PathBuf>, video_dir: impl Into<PathBuf>) -> YrpResult<Self> {
        Ok(Self {
            thumbnail_dir: absolute(thumbnail_dir.into())?,
            video_dir: absolute(video_dir.into())?,
        })
    }

    /// Create both directories if they do not exist yet.
    pub async fn ensure_dirs(&self) -> YrpResult<()> {
        for dir in [&self.thumbnail_dir, &self.video_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| YrpError::asset(dir, e))?;
        }
        debug!(
            "Asset dirs ready: thumbnails={} videos={}",
            self.thumbnail_dir.display(),
            self.video_dir.display()
        );
        Ok(())
    }

    pub fn thumbnail_path(&self, video_id: &str) -> PathBuf {
        self.thumbnail_dir.join(format!("{video_id}.{THUMBNAIL_FORMAT}"))
    }

    pub fn video_path(&self, video_id: &str) -> PathBuf {
        self.video_dir.join(format!("{video_id}.{VIDEO_FORMAT}"))
    }

    pub fn is_video_downloaded(&self, video_id: &str) -> bool {
        self.video_path(video_id).is_file()
    }

    pub fn is_thumbnail_downloaded(&self, video_id: &str) -> bool {
        self.thumbnail_path(video_id).is_file()
    }

    /// Remove the video and thumbnail files of one video. Missing files are fine.
    pub async fn delete_video_assets(&self, video_id: &str) -> YrpResult<()> {
        for path in [self.video_path(video_id), self.thumbnail_path(video_id)] {
            remove_if_exists(&path).await?;
        }
        Ok(())
    }

    /// Delete every asset that does not belong to a video in `keep`.
    ///
    /// A file survives when it carries the directory's format and its stem is
    /// in `keep`. Files whose name starts with an id in `in_flight` are left
    /// alone so partial yt-dlp output is not pulled from under a download.
    pub async fn clean_assets(
        &self,
        keep: &HashSet<String>,
        in_flight: &HashSet<String>,
    ) -> YrpResult<CleanReport> {
        let mut report = CleanReport::default();
        for (dir, format) in [
            (&self.video_dir, VIDEO_FORMAT),
            (&self.thumbnail_dir, THUMBNAIL_FORMAT),
        ] {
            clean_dir(dir, format, keep, in_flight, &mut report).await?;
        }

        if !report.removed.is_empty() {
            info!("Removed {} orphaned asset files", report.removed.len());
        }
        Ok(report)
    }
}

async fn clean_dir(
    dir: &Path,
    format: &str,
    keep: &HashSet<String>,
    in_flight: &HashSet<String>,
    report: &mut CleanReport,
) -> YrpResult<()> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(YrpError::asset(dir, e)),
    };

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| YrpError::asset(dir, e))?
    {
        let path = entry.path();
        let file_type = entry
            .file_type()
            .await
            .map_err(|e| YrpError::asset(&path, e))?;
        if !file_type.is_file() {
            continue;
        }

        let name = entry.file_name().to_string_lossy().to_string();
        if in_flight.iter().any(|id| belongs_to(&name, id)) {
            continue;
        }
        if is_kept(&path, format, keep) {
            continue;
        }

        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed orphaned asset {}", path.display());
                report.removed.push(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to remove {}: {}", path.display(), e);
                return Err(YrpError::asset(&path, e));
            }
        }
    }

    Ok(())
}

/// `{id}.` followed by anything, as written by yt-dlp for that id.
fn belongs_to(file_name: &str, video_id: &str) -> bool {
    file_name
        .strip_prefix(video_id)
        .is_some_and(|rest| rest.starts_with('.'))
}

fn is_kept(path: &Path, format: &str, keep: &HashSet<String>) -> bool {
    let has_format = path.extension().and_then(|e| e.to_str()) == Some(format);
    let stem = path.file_stem().and_then(|s| s.to_str());
    has_format && stem.is_some_and(|s| keep.contains(s))
}

async fn remove_if_exists(path: &Path) -> YrpResult<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!("Deleted {}", path.display());
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(YrpError::asset(path, e)),
    }
}

fn absolute(path: PathBuf) -> YrpResult<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
