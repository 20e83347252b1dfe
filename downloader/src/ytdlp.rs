/// yt-dlp subprocess driver.
///
/// Spawns `yt-dlp` for a single video, parses progress from stdout and
/// forwards stderr to tracing logs.
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::errors::DownloadError;
use crate::progress::parse_progress_line;
use yrp_shared::assets::VIDEO_FORMAT;
use yrp_shared::config::YtDlpConfig;
use yrp_shared::models::DownloadProgress;

const WATCH_URL: &str = "https://www.youtube.com/watch?v=";
const STDERR_TAIL_LINES: usize = 20;

const WINDOWS_FFMPEG_DIRS: &[&str] = &[r"C:\ffmpeg\bin", r"C:\Program Files\ffmpeg\bin"];
const UNIX_FFMPEG_DIRS: &[&str] = &[
    "/usr/bin",
    "/usr/local/bin",
    "/snap/bin",
    "/opt/homebrew/bin",
    "/home/linuxbrew/.linuxbrew/bin",
];

/// Discover extra PATH entries needed for ffmpeg.
/// Checks FFMPEG_PATH first, then common install locations.
fn discover_extra_paths() -> Vec<String> {
    let mut extra = Vec::new();

    if let Ok(ffmpeg_path) = std::env::var("FFMPEG_PATH") {
        extra.push(ffmpeg_path);
    }

    let (candidates, binary) = if cfg!(target_os = "windows") {
        (WINDOWS_FFMPEG_DIRS, "ffmpeg.exe")
    } else {
        (UNIX_FFMPEG_DIRS, "ffmpeg")
    };

    for path in candidates {
        if PathBuf::from(path).join(binary).exists() {
            extra.push(path.to_string());
        }
    }

    extra
}

fn augmented_path() -> String {
    let current_path = std::env::var("PATH").unwrap_or_default();
    let extra_paths = discover_extra_paths();
    if extra_paths.is_empty() {
        return current_path;
    }
    let sep = if cfg!(target_os = "windows") { ";" } else { ":" };
    debug!("Adding to yt-dlp PATH: {}", extra_paths.join(sep));
    format!("{}{}{}", current_path, sep, extra_paths.join(sep))
}

pub fn watch_url(video_id: &str) -> String {
    format!("{WATCH_URL}{video_id}")
}

/// Runs yt-dlp with the configured binary and format ranking.
#[derive(Debug, Clone)]
pub struct YtDlp {
    config: YtDlpConfig,
}

impl YtDlp {
    pub fn new(config: YtDlpConfig) -> Self {
        Self { config }
    }

    pub fn binary(&self) -> &str {
        &self.config.binary
    }

    /// Arguments for downloading `video_id` into `video_dir`.
    pub fn command_args(&self, video_id: &str, video_dir: &Path) -> Vec<String> {
        let output = video_dir.join(format!("{video_id}.%(ext)s"));
        let mut args = vec![
            "--format".to_string(),
            self.config.formats.join("/"),
            "--remux-video".to_string(),
            VIDEO_FORMAT.to_string(),
            "--merge-output-format".to_string(),
            VIDEO_FORMAT.to_string(),
            "--newline".to_string(),
            "--no-colors".to_string(),
            "--no-playlist".to_string(),
            "-o".to_string(),
            output.to_string_lossy().to_string(),
        ];
        args.extend(self.config.extra_args.iter().cloned());
        args.push(watch_url(video_id));
        args
    }

    /// Download one video, sending progress updates if a channel is given.
    pub async fn download(
        &self,
        video_id: &str,
        video_dir: &Path,
        progress: Option<mpsc::UnboundedSender<DownloadProgress>>,
    ) -> Result<(), DownloadError> {
        let args = self.command_args(video_id, video_dir);
        info!("Starting yt-dlp for {} ({})", video_id, self.config.binary);

        let mut child = Command::new(&self.config.binary)
            .args(&args)
            .env("PATH", augmented_path())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| DownloadError::SpawnFailed {
                binary: self.config.binary.clone(),
                source,
            })?;

        debug!("yt-dlp spawned (pid: {:?})", child.id());

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let stdout_task = tokio::spawn(async move {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_progress_line(&line) {
                    Some(update) => {
                        if let Some(tx) = &progress {
                            // Receiver gone means nobody is watching; keep draining
                            let _ = tx.send(update);
                        }
                    }
                    None => debug!(target: "ytdlp", "{}", line),
                }
            }
        });

        let stderr_task = tokio::spawn(async move {
            let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
            let Some(stderr) = stderr else { return tail };
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "ytdlp", "{}", line);
                if tail.len() == STDERR_TAIL_LINES {
                    tail.pop_front();
                }
                tail.push_back(line);
            }
            tail
        });

        let status = child.wait().await?;
        if let Err(e) = stdout_task.await {
            warn!("yt-dlp stdout reader for {} ended abnormally: {}", video_id, e);
        }
        let tail = stderr_task.await.unwrap_or_default();

        if status.success() {
            info!("yt-dlp finished {}", video_id);
            Ok(())
        } else {
            let stderr = Vec::from(tail).join("\n");
            warn!("yt-dlp failed for {} with {:?}", video_id, status.code());
            Err(DownloadError::Exited {
                code: status.code(),
                stderr,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_command_args() {
        let ytdlp = YtDlp::new(YtDlpConfig {
            binary: "yt-dlp".into(),
            formats: vec!["bestvideo+bestaudio".into(), "best".into()],
            extra_args: vec!["--limit-rate".into(), "5M".into()],
        });
        let args = ytdlp.command_args("aaaaaaaaaaa", Path::new("/videos"));
        assert_eq!(
            args,
            vec![
                "--format",
                "bestvideo+bestaudio/best",
                "--remux-video",
                "mkv",
                "--merge-output-format",
                "mkv",
                "--newline",
                "--no-colors",
                "--no-playlist",
                "-o",
                "/videos/aaaaaaaaaaa.%(ext)s",
                "--limit-rate",
                "5M",
                "https://www.youtube.com/watch?v=aaaaaaaaaaa",
            ]
        );
    }

    #[test]
    fn test_default_format_ranking() {
        let args = YtDlp::new(YtDlpConfig::default()).command_args("x", Path::new("/v"));
        assert_eq!(
            args[1],
            "bestvideo[width=2560][vcodec=vp9]+bestaudio/bestvideo[width=2560]+bestaudio/bestvideo[width<=2560]+bestaudio/best"
        );
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_spawn() {
        let ytdlp = YtDlp::new(YtDlpConfig {
            binary: "/nonexistent/yt-dlp-binary".into(),
            ..YtDlpConfig::default()
        });
        let dir = tempfile::tempdir().unwrap();
        let err = ytdlp.download("x", dir.path(), None).await.unwrap_err();
        assert!(matches!(err, DownloadError::SpawnFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_zero_exit_keeps_stderr() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("fake-ytdlp");
        std::fs::write(
            &script,
            "#!/bin/sh\necho '[download]  50.0% of 1.00MiB at 1.00MiB/s ETA 00:01'\necho 'ERROR: video unavailable' >&2\nexit 1\n",
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        let ytdlp = YtDlp::new(YtDlpConfig {
            binary: script.to_string_lossy().to_string(),
            ..YtDlpConfig::default()
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let err = ytdlp.download("x", dir.path(), Some(tx)).await.unwrap_err();

        match err {
            DownloadError::Exited { code, stderr } => {
                assert_eq!(code, Some(1));
                assert_eq!(stderr, "ERROR: video unavailable");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(rx.recv().await.unwrap().whole_percent(), 50);
    }
}
