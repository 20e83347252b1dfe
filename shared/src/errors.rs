/// Unified error types for yrp.
use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for yrp library operations.
#[derive(Debug, Error)]
pub enum YrpError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Channel {0} is not in the channel table")]
    UnknownChannel(String),

    #[error("Video {0} does not exist in the database")]
    UnknownVideo(String),

    #[error("IO error on '{path}': {source}")]
    Asset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl YrpError {
    /// Wrap an IO error with the file it concerns.
    pub fn asset(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        YrpError::Asset {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised while loading or validating the config file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid TOML in '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("channel id '{0}' is not a valid channel ID")]
    InvalidChannelId(String),

    #[error("channel id '{0}' is listed more than once")]
    DuplicateChannel(String),

    #[error("invalid regex '{pattern}' for channel {channel_id}: {source}")]
    InvalidRegex {
        channel_id: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("max_age_hours = {0} is too large")]
    MaxAgeOutOfRange(u64),

    #[error("Could not determine the {0} directory for this platform")]
    MissingDirectory(&'static str),
}

/// Result type alias for yrp operations.
pub type YrpResult<T> = Result<T, YrpError>;
