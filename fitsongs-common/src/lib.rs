//! fitsongs-common - shared core for the fitsongs scraper
//!
//! Holds everything both surfaces (web service and CLI) depend on:
//! URL canonicalization, the SQLite workout cache, the fetch-and-extract
//! pipeline, and the pluggable fetcher/extractor capabilities.

pub mod canon;
pub mod config;
pub mod db;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod model;
pub mod pipeline;

pub use error::{Error, Result};
