//! API route handlers

mod jobs;
mod library;

pub use jobs::job_routes;
pub use library::library_routes;
