//! Ingestion pipeline
//!
//! One run takes the store's ingest lease, resets the store, then walks pages
//! `1..=N` strictly in order: fetch, decode, write. A second run against the
//! same database fails fast with [`crate::Error::IngestInProgress`] while the first
//! holds the lease. A transport fault aborts the run. Decode and write
//! faults are logged, recorded in the [`IngestReport`], and the run moves on
//! to the next page.

use std::sync::Arc;
use std::time::{Duration, Instant};
use crossbeam::channel::Sender;
use serde::Serialize;
use crate::Result;
use crate::page::PageBody;
use crate::source::PageSource;
use crate::storage::SqliteStore;

/// What happened to one page during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PageOutcome {
    Stored { items: usize },
    DecodeFailed { error: String },
    WriteFailed { error: String },
}

impl PageOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, PageOutcome::Stored { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageReport {
    pub page: u32,
    #[serde(flatten)]
    pub outcome: PageOutcome,
}

/// Per-page outcomes of one ingestion run, in page order
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub pages: Vec<PageReport>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl IngestReport {
    /// Number of pages written
    pub fn stored(&self) -> usize {
        self.pages.iter().filter(|p| p.outcome.is_stored()).count()
    }

    /// Total items written across all stored pages
    pub fn items(&self) -> usize {
        self.pages
            .iter()
            .map(|p| match p.outcome {
                PageOutcome::Stored { items } => items,
                _ => 0,
            })
            .sum()
    }

    pub fn failed_pages(&self) -> Vec<u32> {
        self.pages
            .iter()
            .filter(|p| !p.outcome.is_stored())
            .map(|p| p.page)
            .collect()
    }

    pub fn is_clean(&self) -> bool {
        self.pages.iter().all(|p| p.outcome.is_stored())
    }
}

/// Progress notifications for a front-end
#[derive(Debug, Clone)]
pub enum IngestEvent {
    Started { total: u32 },
    PageDone { page: u32, outcome: PageOutcome },
    Finished,
}

pub struct IngestPipeline<S> {
    store: Arc<SqliteStore>,
    source: S,
    pages: u32,
    progress: Option<Sender<IngestEvent>>,
}

impl<S: PageSource> IngestPipeline<S> {
    pub fn new(store: Arc<SqliteStore>, source: S, pages: u32) -> Self {
        Self {
            store,
            source,
            pages,
            progress: None,
        }
    }

    pub fn with_progress(mut self, tx: Sender<IngestEvent>) -> Self {
        self.progress = Some(tx);
        self
    }

    fn emit(&self, event: IngestEvent) {
        if let Some(tx) = &self.progress {
            // Receiver gone just means nobody is watching
            let _ = tx.send(event);
        }
    }

    /// Execute one full reset-and-repopulate run.
    pub async fn run(&self) -> Result<IngestReport> {
        let store = Arc::clone(&self.store);
        let holder = format!("pid {}", std::process::id());
        let _lease = tokio::task::spawn_blocking(move || store.acquire_ingest_lease(&holder))
            .await??;

        let started = Instant::now();
        tracing::info!(pages = self.pages, "ingestion started");

        self.store.run_blocking(|store| store.reset_schema()).await?;
        self.emit(IngestEvent::Started { total: self.pages });

        let mut report = IngestReport::default();
        for page in 1..=self.pages {
            let raw = self.source.fetch_page(page).await?;
            let outcome = self.ingest_page(page, &raw).await;
            self.emit(IngestEvent::PageDone {
                page,
                outcome: outcome.clone(),
            });
            report.pages.push(PageReport { page, outcome });
        }

        report.elapsed = started.elapsed();
        self.emit(IngestEvent::Finished);

        tracing::info!(
            stored = report.stored(),
            failed = ?report.failed_pages(),
            elapsed = ?report.elapsed,
            "ingestion finished"
        );
        Ok(report)
    }

    async fn ingest_page(&self, page: u32, raw: &str) -> PageOutcome {
        let body = match PageBody::decode(raw) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(page, error = %e, "skipping page: body did not decode");
                return PageOutcome::DecodeFailed { error: e.to_string() };
            }
        };

        // Stored under the page number we asked for, not the body's own `page`
        let (envelope, items) = body.into_rows(i64::from(page));
        let count = items.len();

        match self
            .store
            .run_blocking(move |store| store.insert_page(&envelope, &items))
            .await
        {
            Ok(()) => {
                tracing::debug!(page, items = count, "page stored");
                PageOutcome::Stored { items: count }
            }
            Err(e) => {
                tracing::warn!(page, error = %e, "skipping page: write failed");
                PageOutcome::WriteFailed { error: e.to_string() }
            }
        }
    }
}
