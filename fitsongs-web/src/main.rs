//! fitsongs-web - web service entry point

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fitsongs_common::config::Config;
use fitsongs_common::pipeline::Scraper;
use fitsongs_web::{build_router, worker, AppState};

/// Command-line arguments for fitsongs-web
#[derive(Parser, Debug)]
#[command(name = "fitsongs-web")]
#[command(about = "Web service for the workout playlist cache")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "5001", env = "FITSONGS_PORT")]
    port: u16,

    /// Path to the SQLite cache database
    #[arg(long, default_value = "fitness_cache.db", env = "FITSONGS_DB")]
    db_path: PathBuf,

    /// Seconds to pause between live fetches inside a batch job
    #[arg(long, default_value = "2", env = "FITSONGS_RATE_LIMIT_SECS")]
    rate_limit_secs: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitsongs_web=debug,fitsongs_common=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    info!("Starting fitsongs-web on port {}", args.port);
    info!("Database: {}", args.db_path.display());

    let config = Config {
        db_path: args.db_path.clone(),
        rate_limit: Duration::from_secs(args.rate_limit_secs),
        ..Config::from_env()
    };

    let pool = fitsongs_common::db::init_pool(&config.db_path)
        .await
        .context("Failed to open cache database")?;

    let scraper = Arc::new(
        Scraper::new(pool.clone(), &config).context("Failed to build scraper")?,
    );
    let runner = worker::spawn_worker(scraper, config.rate_limit);
    info!("Background worker started");

    let state = AppState::new(pool, runner);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port))
        .await
        .context("Failed to bind listener")?;
    info!("Listening on http://0.0.0.0:{}", args.port);

    axum::serve(listener, app).await?;

    Ok(())
}
