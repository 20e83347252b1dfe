/// yrp - Main Entry Point
///
/// Follows YouTube channels through their RSS feeds, keeps a local SQLite
/// library of recent uploads and downloads videos with yt-dlp.
mod cli;
mod commands;
mod display;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use yrp_shared::assets::AssetLayout;
use yrp_shared::config::{Config, Paths};
use yrp_shared::{db, Library};

use cli::Cli;
use commands::App;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logging(&cli);

    let paths = Paths::resolve(cli.config.clone()).context("Failed to resolve yrp directories")?;
    info!("Config file: {}", paths.config_file.display());

    let config = Config::load(&paths.config_file)?;

    if let Some(parent) = paths.database_file.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    info!("Database path: {}", paths.database_file.display());

    let pool = db::create_pool(&paths.database_file).await?;
    db::run_migrations(&pool).await?;

    // Nothing is downloading yet; flags left over from a killed run are stale
    let stale = db::reset_stale_downloads(&pool).await?;
    if stale > 0 {
        warn!("Cleared {} stale downloading flags", stale);
    }

    let assets = AssetLayout::new(&paths.thumbnail_dir, &paths.video_dir)?;
    assets.ensure_dirs().await?;

    let library = Library::new(pool.clone(), assets, config.max_age);
    let app = App::new(library, config);
    let result = app.run(cli.command).await;

    pool.close().await;
    result
}

fn init_logging(cli: &Cli) {
    let level = cli.log_level();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "warn,yrp={level},yrp_shared={level},yrp_downloader={level},ytdlp={level}"
        ))
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
