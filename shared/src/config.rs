/// Configuration file and filesystem locations.
///
/// The config file is `$XDG_CONFIG_HOME/yrp/yrp.toml`; the database lives
/// under `$XDG_DATA_HOME/yrp` and downloaded assets under `$XDG_CACHE_HOME/yrp`.
/// `YRP_CONFIG_FILE`, `YRP_DATA_DIR` and `YRP_CACHE_DIR` override each location.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::errors::ConfigError;
use crate::filter::TitleFilter;

pub const APP_NAME: &str = "yrp";

static CHANNEL_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]{24}$").unwrap());

/// Whether `id` looks like a YouTube channel id.
pub fn is_valid_channel_id(id: &str) -> bool {
    CHANNEL_ID_RE.is_match(id)
}

/// A followed channel and its title filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ChannelEntry {
    pub id: String,
    #[serde(default)]
    pub include: Vec<String>,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub include_regex: Vec<String>,
    #[serde(default)]
    pub exclude_regex: Vec<String>,
}

impl ChannelEntry {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// Channels may be listed as a bare id or as a table with filters.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawChannelEntry {
    Id(String),
    Entry(ChannelEntry),
}

impl From<RawChannelEntry> for ChannelEntry {
    fn from(raw: RawChannelEntry) -> Self {
        match raw {
            RawChannelEntry::Id(id) => ChannelEntry::new(id),
            RawChannelEntry::Entry(entry) => entry,
        }
    }
}

/// yt-dlp invocation settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct YtDlpConfig {
    pub binary: String,
    /// Format selectors tried in order.
    pub formats: Vec<String>,
    pub extra_args: Vec<String>,
}

impl Default for YtDlpConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            formats: vec![
                "bestvideo[width=2560][vcodec=vp9]+bestaudio".to_string(),
                "bestvideo[width=2560]+bestaudio".to_string(),
                "bestvideo[width<=2560]+bestaudio".to_string(),
                "best".to_string(),
            ],
            extra_args: Vec::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    channels: Vec<RawChannelEntry>,
    max_age_hours: u64,
    poll_interval_secs: u64,
    max_concurrent_downloads: usize,
    ytdlp: YtDlpConfig,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            channels: Vec::new(),
            max_age_hours: 24,
            poll_interval_secs: 900,
            max_concurrent_downloads: 2,
            ytdlp: YtDlpConfig::default(),
        }
    }
}

/// Validated runtime configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub channels: Vec<ChannelEntry>,
    /// Videos published longer ago than this are hidden and their assets cleaned.
    pub max_age: chrono::Duration,
    pub poll_interval: std::time::Duration,
    pub max_concurrent_downloads: usize,
    pub ytdlp: YtDlpConfig,
    filters: HashMap<String, TitleFilter>,
}

impl Default for Config {
    fn default() -> Self {
        let file = ConfigFile::default();
        Self {
            channels: Vec::new(),
            max_age: chrono::Duration::hours(file.max_age_hours as i64),
            poll_interval: std::time::Duration::from_secs(file.poll_interval_secs),
            max_concurrent_downloads: file.max_concurrent_downloads,
            ytdlp: file.ytdlp,
            filters: HashMap::new(),
        }
    }
}

impl Config {
    /// Load the config file. A missing file yields a config without channels.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, no channels configured", path.display());
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config = Self::parse(&text, path)?;
        info!(
            "Loaded config from {} ({} channels)",
            path.display(),
            config.channels.len()
        );
        Ok(config)
    }

    /// Parse TOML text. `path` is only used in error messages.
    pub fn parse(text: &str, path: &Path) -> Result<Self, ConfigError> {
        let file: ConfigFile = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_file(file)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let mut seen = BTreeSet::new();
        let mut channels = Vec::with_capacity(file.channels.len());
        let mut filters = HashMap::new();

        for raw in file.channels {
            let entry = ChannelEntry::from(raw);
            if !is_valid_channel_id(&entry.id) {
                return Err(ConfigError::InvalidChannelId(entry.id));
            }
            if !seen.insert(entry.id.clone()) {
                return Err(ConfigError::DuplicateChannel(entry.id));
            }
            filters.insert(entry.id.clone(), TitleFilter::from_entry(&entry)?);
            channels.push(entry);
        }

        let max_age = i64::try_from(file.max_age_hours)
            .ok()
            .and_then(chrono::Duration::try_hours)
            .ok_or(ConfigError::MaxAgeOutOfRange(file.max_age_hours))?;

        Ok(Self {
            channels,
            max_age,
            poll_interval: std::time::Duration::from_secs(file.poll_interval_secs.max(1)),
            max_concurrent_downloads: file.max_concurrent_downloads.max(1),
            ytdlp: file.ytdlp,
            filters,
        })
    }

    /// Ids of every configured channel.
    pub fn channel_ids(&self) -> BTreeSet<String> {
        self.channels.iter().map(|c| c.id.clone()).collect()
    }

    /// Title filter for a channel; channels not in the config get none.
    pub fn filter(&self, channel_id: &str) -> Option<&TitleFilter> {
        self.filters.get(channel_id)
    }
}

/// Filesystem locations used by yrp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_file: PathBuf,
    pub database_file: PathBuf,
    pub thumbnail_dir: PathBuf,
    pub video_dir: PathBuf,
}

impl Paths {
    /// Resolve paths from the process environment and platform directories.
    pub fn resolve(config_override: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::resolve_with(config_override, |key| std::env::var(key).ok())
    }

    /// Resolve paths with an explicit environment lookup.
    pub fn resolve_with(
        config_override: Option<PathBuf>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let config_file = match config_override.or_else(|| env("YRP_CONFIG_FILE").map(PathBuf::from)) {
            Some(path) => path,
            None => dirs::config_dir()
                .ok_or(ConfigError::MissingDirectory("config"))?
                .join(APP_NAME)
                .join(format!("{APP_NAME}.toml")),
        };

        let data_dir = match env("YRP_DATA_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::data_dir()
                .ok_or(ConfigError::MissingDirectory("data"))?
                .join(APP_NAME),
        };

        let cache_dir = match env("YRP_CACHE_DIR") {
            Some(dir) => PathBuf::from(dir),
            None => dirs::cache_dir()
                .ok_or(ConfigError::MissingDirectory("cache"))?
                .join(APP_NAME),
        };

        Ok(Self {
            config_file,
            database_file: data_dir.join(format!("{APP_NAME}.db")),
            thumbnail_dir: cache_dir.join("thumbnails"),
            video_dir: cache_dir.join("videos"),
        })
    }
}
