use crate::ingest::{IngestEvent, PageOutcome};
use crate::ui::theme;
use crate::ui::Icons;
use indicatif::{HumanDuration, ProgressBar};
use owo_colors::OwoColorize;
use std::thread;
use std::time::{Duration, Instant};

/// Renders ingestion progress from a channel of [`IngestEvent`]s
pub struct IngestProgress {
    bar: ProgressBar,
    handle: thread::JoinHandle<()>,
}

impl IngestProgress {
    pub fn new() -> (Self, crossbeam::channel::Sender<IngestEvent>) {
        let (tx, rx) = crossbeam::channel::unbounded::<IngestEvent>();

        let bar = if console::Term::stdout().is_term() {
            ProgressBar::new(0).with_message("Fetching pages")
        } else {
            ProgressBar::hidden()
        };

        let bar_clone = bar.clone();
        let handle = thread::spawn(move || {
            for event in rx {
                match event {
                    IngestEvent::Started { total } => {
                        bar_clone.set_length(u64::from(total));
                        bar_clone.enable_steady_tick(Duration::from_millis(100));
                    }
                    IngestEvent::PageDone { page, outcome } => {
                        bar_clone.inc(1);
                        match outcome {
                            PageOutcome::Stored { .. } => {
                                bar_clone.set_message(format!("Page {}", page));
                            }
                            _ => {
                                bar_clone.println(format!(
                                    "{} page {} skipped",
                                    Icons::WARN,
                                    page.style(theme().warn.clone())
                                ));
                            }
                        }
                    }
                    IngestEvent::Finished => {
                        bar_clone.finish_and_clear();
                    }
                }
            }
        });

        (Self { bar, handle }, tx)
    }

    /// Wait for the renderer to drain, then print a one-line summary.
    ///
    /// The sender must have been dropped first or this blocks.
    pub fn finish_with_summary(self, started: Instant, stored: usize, items: usize) {
        let _ = self.handle.join();
        self.bar.finish_and_clear();
        println!(
            "{} {}",
            Icons::CHECK.style(theme().success.clone()),
            format!("Complete in {}", HumanDuration(started.elapsed())).style(theme().success.clone())
        );
        println!(
            "  {} {}  {} {}",
            Icons::PAGE.style(theme().info.clone()),
            stored,
            Icons::DATABASE.style(theme().info.clone()),
            items
        );
    }
}
