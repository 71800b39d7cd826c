//! Backgammon mistake-quiz server
//!
//! Crawls a user's finished online matches, analyzes every checker play
//! with GNU Backgammon, and serves the resulting quiz positions over HTTP.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gammon_quiz::api::{self, AppContext};
use gammon_quiz::config::Config;
use gammon_quiz::crawl::{CrawlQueue, CrawlRunner, SiteClient};
use gammon_quiz::db;
use gammon_quiz::engine::GnubgDriver;

/// Backgammon quiz server - match crawler and engine-backed quiz trainer
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Host address to bind to (overrides environment)
    #[arg(long, value_name = "HOST")]
    host: Option<String>,

    /// Port to bind to (overrides environment)
    #[arg(short, long, value_name = "PORT")]
    port: Option<u16>,

    /// Data directory holding the database (overrides environment)
    #[arg(short, long, value_name = "PATH")]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gammon_quiz={}", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Gammon quiz server starting...");

    let config = Arc::new(Config::resolve(args.host, args.port, args.data_dir)?);

    std::fs::create_dir_all(&config.data_dir)?;

    info!("Initializing database...");
    let db = db::init_database(&config.db_path()).await?;
    info!("Database initialized at: {}", config.db_path().display());

    let engine = Arc::new(GnubgDriver::new(
        config.engine_path.clone(),
        config.engine_script.clone(),
    ));

    let source = Arc::new(SiteClient::new(&config.site_url)?);

    let runner = Arc::new(CrawlRunner::new(
        db.clone(),
        engine.clone(),
        source,
        config.threshold,
    ));
    let queue = CrawlQueue::new(runner);

    let ctx = AppContext {
        db,
        engine,
        queue,
        config,
    };

    api::run(ctx).await?;

    Ok(())
}
