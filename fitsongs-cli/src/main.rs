//! fitsongs - command-line surface for the workout playlist scraper

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fitsongs_common::config::Config;
use fitsongs_common::db::{self, cache, schema};
use fitsongs_common::model::WorkoutResult;
use fitsongs_common::pipeline::Scraper;

/// Command-line arguments for fitsongs
#[derive(Parser, Debug)]
#[command(name = "fitsongs")]
#[command(about = "Workout playlist scraper and cache")]
#[command(version)]
struct Args {
    /// Path to the SQLite cache database
    #[arg(long, default_value = "fitness_cache.db", env = "FITSONGS_DB")]
    db_path: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scrape one workout URL and print its playlist
    Run {
        /// Workout page URL
        url: String,

        /// Output format
        #[arg(default_value = "list")]
        format: OutputFormat,
    },

    /// Mark every cached entry as needing update
    Invalidate,

    /// Collapse duplicate cache rows down to one per workout
    Dedupe,

    /// List entries pending update
    Stale,

    /// Report cache schema and row statistics
    Health,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum OutputFormat {
    List,
    Json,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fitsongs_common=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::with_db_path(&args.db_path);

    let pool = db::init_pool(&config.db_path)
        .await
        .context("Failed to open cache database")?;

    match args.command {
        Command::Run { url, format } => run(pool, &config, &url, format).await,
        Command::Invalidate => {
            let flipped = cache::invalidate_all(&pool).await?;
            println!("Invalidated {} cache entries", flipped);
            Ok(ExitCode::SUCCESS)
        }
        Command::Dedupe => {
            let report = cache::dedupe(&pool).await?;
            println!(
                "Removed {} duplicate rows across {} workouts",
                report.rows_deleted, report.duplicate_groups
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Stale => {
            let (count, urls) = cache::stale_entries(&pool).await?;
            println!("{} entries pending update", count);
            for url in urls {
                println!("{}", url);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Health => {
            let columns = schema::table_columns(&pool).await?;
            let stats = cache::stats(&pool).await?;
            println!("Database: {}", config.db_path.display());
            println!("Table: {}", schema::TABLE);
            println!("Columns: {}", columns.join(", "));
            println!();
            println!("Total entries: {}", stats.total);
            println!("Entries pending update: {}", stats.stale);
            println!("Entries with canonical URL: {}", stats.with_canonical);
            println!("Duplicate groups: {}", stats.duplicate_groups);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn run(
    pool: sqlx::SqlitePool,
    config: &Config,
    url: &str,
    format: OutputFormat,
) -> Result<ExitCode> {
    let (stale_count, _) = cache::stale_entries(&pool).await?;
    if stale_count > 0 {
        println!(
            "Note: {} cached entries need updating (use the web frontend to update them)",
            stale_count
        );
        println!();
    }

    let scraper = Arc::new(Scraper::new(pool, config).context("Failed to build scraper")?);
    let result = scraper.get_workout_songs(url).await?;

    let Some(result) = result.filter(|r| !r.songs.is_empty()) else {
        println!("No workout data found or unable to fetch the workout page.");
        return Ok(ExitCode::FAILURE);
    };

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::List => print_list(&result),
    }

    Ok(ExitCode::SUCCESS)
}

fn print_list(result: &WorkoutResult) {
    let m = &result.metadata;
    let fields = [
        ("Workout", &m.title),
        ("Trainer", &m.trainer),
        ("Duration", &m.duration),
        ("Type", &m.workout_type),
        ("Genre", &m.genre),
        ("Episode", &m.episode),
        ("Date", &m.date),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("{}: {}", label, value);
        }
    }

    println!();
    println!("Playlist ({} songs):", result.songs.len());
    for (i, song) in result.songs.iter().enumerate() {
        let mut line = format!("{}. \"{}\" by {}", i + 1, song.title, song.artist);
        if let Some(link) = &song.apple_music_url {
            line.push_str(&format!(" - {}", link));
        }
        println!("{}", line);
    }
}
