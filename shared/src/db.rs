/// Database connection pool and helpers for yrp.
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, info};

use crate::errors::{YrpError, YrpResult};
use crate::models::{Channel, ChannelDiff, NewVideo, VideoListing};

/// Create SQLite connection pool with WAL mode and busy timeout.
///
/// The file is created on first use.
pub async fn create_pool(path: &Path) -> YrpResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(std::time::Duration::from_secs(10))
        .foreign_keys(true)
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    info!("Connected to database: {}", path.display());
    Ok(pool)
}

/// Run migrations from the migrations directory.
pub async fn run_migrations(pool: &SqlitePool) -> YrpResult<()> {
    sqlx::migrate!("../migrations").run(pool).await?;

    info!("Database migrations completed");
    Ok(())
}

// ====== CHANNELS ======

/// Make the channel table hold exactly `wanted`.
///
/// Videos of removed channels are deleted explicitly rather than relying on
/// the foreign key cascade.
pub async fn reconcile_channels(
    pool: &SqlitePool,
    wanted: &BTreeSet<String>,
) -> YrpResult<ChannelDiff> {
    let mut tx = pool.begin().await?;

    let existing: BTreeSet<String> = sqlx::query_scalar::<_, String>("SELECT id FROM channel")
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

    let removed: Vec<String> = existing.difference(wanted).cloned().collect();
    for channel_id in &removed {
        sqlx::query("DELETE FROM video WHERE channel_id = ?")
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM channel WHERE id = ?")
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;
    }

    let added: Vec<String> = wanted.difference(&existing).cloned().collect();
    for channel_id in &added {
        sqlx::query("INSERT INTO channel (id) VALUES (?)")
            .bind(channel_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;

    if !removed.is_empty() || !added.is_empty() {
        info!("Channels reconciled: {} added, {} removed", added.len(), removed.len());
    }
    Ok(ChannelDiff { added, removed })
}

/// Ids of all stored channels.
pub async fn list_channel_ids(pool: &SqlitePool) -> YrpResult<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>("SELECT id FROM channel ORDER BY id")
        .fetch_all(pool)
        .await?;

    Ok(ids)
}

/// All stored channels.
pub async fn list_channels(pool: &SqlitePool) -> YrpResult<Vec<Channel>> {
    let channels = sqlx::query_as::<_, Channel>(
        "SELECT id, title, last_updated FROM channel ORDER BY title, id",
    )
    .fetch_all(pool)
    .await?;

    Ok(channels)
}

// ====== FEED UPLOAD ======

/// Store a fetched feed for `channel_id`.
///
/// Updates the channel title and `last_updated`, then inserts entries whose
/// id is not stored yet. Existing rows are left untouched so that `watched`
/// and `downloading` survive re-syncs. Returns the ids actually inserted.
pub async fn upload_feed_data(
    pool: &SqlitePool,
    channel_id: &str,
    channel_title: &str,
    entries: &[NewVideo],
) -> YrpResult<Vec<String>> {
    let mut tx = pool.begin().await?;

    let updated = sqlx::query("UPDATE channel SET title = ?, last_updated = ? WHERE id = ?")
        .bind(channel_title)
        .bind(Utc::now())
        .bind(channel_id)
        .execute(&mut *tx)
        .await?;
    if updated.rows_affected() == 0 {
        return Err(YrpError::UnknownChannel(channel_id.to_string()));
    }

    let mut inserted = Vec::new();
    for entry in entries {
        let result = sqlx::query(
            r#"
            INSERT INTO video (id, channel_id, title, publication_dt, downloading, watched)
            VALUES (?, ?, ?, ?, 0, 0)
            ON CONFLICT(id) DO NOTHING
            "#,
        )
        .bind(&entry.id)
        .bind(channel_id)
        .bind(&entry.title)
        .bind(entry.publication_dt)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() > 0 {
            inserted.push(entry.id.clone());
        }
    }

    tx.commit().await?;

    debug!("Channel {}: {} new videos", channel_id, inserted.len());
    Ok(inserted)
}

// ====== VIDEO QUERIES ======

const VIDEO_LISTING_SELECT: &str = r#"
    SELECT video.id, video.channel_id, channel.title AS channel_title, video.title,
           video.publication_dt, video.downloading, video.watched
    FROM video JOIN channel ON channel.id = video.channel_id
"#;

/// Unwatched videos published after `cutoff`, newest first.
pub async fn list_videos(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
) -> YrpResult<Vec<VideoListing>> {
    let sql = format!(
        "{VIDEO_LISTING_SELECT} WHERE video.publication_dt > ? AND video.watched = 0 \
         ORDER BY video.publication_dt DESC"
    );
    let videos = sqlx::query_as::<_, VideoListing>(&sql)
        .bind(cutoff)
        .fetch_all(pool)
        .await?;

    Ok(videos)
}

/// Every stored video, watched or not, newest first.
pub async fn list_all_videos(pool: &SqlitePool) -> YrpResult<Vec<VideoListing>> {
    let sql = format!("{VIDEO_LISTING_SELECT} ORDER BY video.publication_dt DESC");
    let videos = sqlx::query_as::<_, VideoListing>(&sql)
        .fetch_all(pool)
        .await?;

    Ok(videos)
}

/// Ids of videos published after `cutoff`, newest first, optionally filtered
/// by watched state.
pub async fn list_video_ids(
    pool: &SqlitePool,
    cutoff: DateTime<Utc>,
    watched: Option<bool>,
) -> YrpResult<Vec<String>> {
    let ids = if let Some(w) = watched {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT id FROM video
            WHERE publication_dt > ? AND watched = ?
            ORDER BY publication_dt DESC
            "#,
        )
        .bind(cutoff)
        .bind(w)
        .fetch_all(pool)
        .await?
    } else {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT id FROM video
            WHERE publication_dt > ?
            ORDER BY publication_dt DESC
            "#,
        )
        .bind(cutoff)
        .fetch_all(pool)
        .await?
    };

    Ok(ids)
}

/// Get a single video by id.
pub async fn get_video(pool: &SqlitePool, video_id: &str) -> YrpResult<Option<VideoListing>> {
    let sql = format!("{VIDEO_LISTING_SELECT} WHERE video.id = ?");
    let video = sqlx::query_as::<_, VideoListing>(&sql)
        .bind(video_id)
        .fetch_optional(pool)
        .await?;

    Ok(video)
}

/// Ids of videos currently flagged as downloading.
pub async fn downloading_video_ids(pool: &SqlitePool) -> YrpResult<Vec<String>> {
    let ids = sqlx::query_scalar::<_, String>("SELECT id FROM video WHERE downloading = 1")
        .fetch_all(pool)
        .await?;

    Ok(ids)
}

// ====== VIDEO UPDATES ======

/// Set the downloading flag. Returns false if the video does not exist.
pub async fn set_downloading(pool: &SqlitePool, video_id: &str, downloading: bool) -> YrpResult<bool> {
    let result = sqlx::query("UPDATE video SET downloading = ? WHERE id = ?")
        .bind(downloading)
        .bind(video_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Set the watched flag. Returns false if the video does not exist.
pub async fn set_watched(pool: &SqlitePool, video_id: &str, watched: bool) -> YrpResult<bool> {
    let result = sqlx::query("UPDATE video SET watched = ? WHERE id = ?")
        .bind(watched)
        .bind(video_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Delete a video row. Returns false if it did not exist.
pub async fn delete_video(pool: &SqlitePool, video_id: &str) -> YrpResult<bool> {
    let result = sqlx::query("DELETE FROM video WHERE id = ?")
        .bind(video_id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Clear downloading flags left behind by an interrupted run.
pub async fn reset_stale_downloads(pool: &SqlitePool) -> YrpResult<u64> {
    let result = sqlx::query("UPDATE video SET downloading = 0 WHERE downloading = 1")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
