//! # Pagemirror - paginated resource mirror
//!
//! Mirrors a paginated, nested upstream resource into SQLite and serves it
//! back in its original shape.
//!
//! Pagemirror provides:
//! - A normalized two-table projection of nested pages (`posts` + `items`)
//! - A sequential ingestion pipeline with per-page outcome reporting
//! - Range and single-page reconstruction preserving item order
//! - Transactional deletion and a cross-table consistency check
//! - An axum HTTP service exposing all of the above

pub mod page;
pub mod storage;
pub mod source;
pub mod ingest;
pub mod reconstruct;
pub mod server;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use page::{Envelope, Item, PageBody, PageRecord};
pub use storage::SqliteStore;
pub use source::{HttpPageSource, PageSource};
pub use ingest::{IngestPipeline, IngestReport, PageOutcome};
pub use reconstruct::RangeReader;

/// Result type alias for Pagemirror operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Pagemirror operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Upstream error on page {page}: {message}")]
    Upstream { page: u32, message: String },

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("An ingestion run is already in progress ({holder})")]
    IngestInProgress { holder: String },

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Consistency error: {0}")]
    Consistency(String),
}
