//! Command-line arguments

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// yrp - follow YouTube channels through their RSS feeds
///
/// Keeps a local library of recent uploads from the configured channels,
/// fetches thumbnails and downloads videos with yt-dlp.
#[derive(Parser, Debug)]
#[command(name = "yrp")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file (defaults to the platform config directory)
    #[arg(short, long, value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Fetch all channel feeds and missing thumbnails
    Sync {
        /// Keep files of watched or expired videos
        #[arg(long)]
        no_clean: bool,
    },

    /// List unwatched videos inside the retention window
    List {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,

        /// Include watched and expired videos
        #[arg(long)]
        all: bool,
    },

    /// Download videos with yt-dlp
    Download {
        #[arg(value_name = "ID", required = true)]
        ids: Vec<String>,
    },

    /// Mark a video as watched and delete its files
    Watched {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Mark a video as unwatched
    Unwatched {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Delete a video and its files
    Delete {
        #[arg(value_name = "ID")]
        id: String,
    },

    /// Remove files that no longer belong to a listed video
    Clean,

    /// Show followed channels
    Channels,

    /// Sync periodically until interrupted
    Watch {
        /// Seconds between syncs (defaults to poll_interval_secs from the config)
        #[arg(long, value_name = "SECS")]
        interval: Option<u64>,

        /// Download every new video as it appears
        #[arg(long)]
        download: bool,
    },
}

impl Cli {
    /// Log directive for the workspace crates based on verbosity flags
    pub fn log_level(&self) -> &'static str {
        match self.verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}
