//! Configuration for the fitsongs crates
//!
//! Resolution is environment-first with built-in defaults; the binaries layer
//! clap arguments (which also read these variables) on top.

use std::path::PathBuf;
use std::time::Duration;

/// Default cache database filename, created in the working directory.
pub const DEFAULT_DB_PATH: &str = "fitness_cache.db";

/// Browser user agent sent with every page fetch. The origin serves a
/// reduced page to unknown clients, so we present as a desktop browser.
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// Per-request fetch timeout in seconds.
pub const FETCH_TIMEOUT_SECS: u64 = 10;

/// Pause between consecutive live fetches inside a batch job, in seconds.
pub const RATE_LIMIT_SECS: u64 = 2;

/// Runtime settings shared by the pipeline and the worker.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite cache database
    pub db_path: PathBuf,
    /// Bound on each network fetch
    pub fetch_timeout: Duration,
    /// Delay applied after a live fetch when more batch URLs remain
    pub rate_limit: Duration,
}

impl Config {
    /// Build a config from environment variables, falling back to defaults.
    ///
    /// Recognized variables: `FITSONGS_DB`, `FITSONGS_FETCH_TIMEOUT_SECS`,
    /// `FITSONGS_RATE_LIMIT_SECS`.
    pub fn from_env() -> Self {
        let db_path = std::env::var("FITSONGS_DB")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_DB_PATH));

        let fetch_timeout = env_secs("FITSONGS_FETCH_TIMEOUT_SECS", FETCH_TIMEOUT_SECS);
        let rate_limit = env_secs("FITSONGS_RATE_LIMIT_SECS", RATE_LIMIT_SECS);

        Self {
            db_path,
            fetch_timeout,
            rate_limit,
        }
    }

    /// Config pointing at an explicit database path, defaults elsewhere.
    pub fn with_db_path(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            ..Self::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            fetch_timeout: Duration::from_secs(FETCH_TIMEOUT_SECS),
            rate_limit: Duration::from_secs(RATE_LIMIT_SECS),
        }
    }
}

fn env_secs(var: &str, default: u64) -> Duration {
    let secs = std::env::var(var)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default);
    Duration::from_secs(secs)
}
