use tabled::{settings::Style, Table, Tabled};
use crate::ingest::{IngestReport, PageOutcome};
use crate::storage::DbStats;

#[derive(Tabled)]
pub struct TableRow {
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Value")]
    pub value: String,
}

#[derive(Tabled)]
struct PageRow {
    #[tabled(rename = "Page")]
    page: u32,
    #[tabled(rename = "Status")]
    status: &'static str,
    #[tabled(rename = "Detail")]
    detail: String,
}

pub struct TableBuilder {
    rows: Vec<TableRow>,
}

impl TableBuilder {
    pub fn new() -> Self {
        Self { rows: Vec::new() }
    }

    pub fn add_row(&mut self, label: &str, value: &str) {
        self.rows.push(TableRow {
            metric: label.to_string(),
            value: value.to_string(),
        });
    }

    pub fn build(&self) -> String {
        if self.rows.is_empty() {
            return String::new();
        }

        Table::new(&self.rows).with(Style::rounded()).to_string()
    }
}

impl Default for TableBuilder {
    fn default() -> Self {
        Self::new()
    }
}

pub fn stats_table(stats: &DbStats) -> String {
    let mut builder = TableBuilder::new();
    builder.add_row("Envelopes", &stats.envelopes.to_string());
    builder.add_row("Items", &stats.items.to_string());
    builder.build()
}

/// Table of pages that were not stored; empty when the run was clean
pub fn report_table(report: &IngestReport) -> String {
    let rows: Vec<PageRow> = report
        .pages
        .iter()
        .filter_map(|p| match &p.outcome {
            PageOutcome::Stored { .. } => None,
            PageOutcome::DecodeFailed { error } => Some(PageRow {
                page: p.page,
                status: "decode failed",
                detail: error.clone(),
            }),
            PageOutcome::WriteFailed { error } => Some(PageRow {
                page: p.page,
                status: "write failed",
                detail: error.clone(),
            }),
        })
        .collect();

    if rows.is_empty() {
        return String::new();
    }
    Table::new(rows).with(Style::rounded()).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::PageReport;

    #[test]
    fn test_report_table_lists_only_failures() {
        let report = IngestReport {
            pages: vec![
                PageReport { page: 1, outcome: PageOutcome::Stored { items: 2 } },
                PageReport {
                    page: 2,
                    outcome: PageOutcome::DecodeFailed { error: "expected value".to_string() },
                },
            ],
            ..IngestReport::default()
        };

        let table = report_table(&report);
        assert!(table.contains("decode failed"));
        assert!(table.contains("expected value"));
        assert!(!table.contains("Stored"));
    }

    #[test]
    fn test_clean_report_renders_nothing() {
        assert!(report_table(&IngestReport::default()).is_empty());
    }
}
