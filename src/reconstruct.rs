//! Range reconstruction
//!
//! Reads `posts` and `items` for an inclusive id range and reassembles the
//! nested page shape. Slots are addressed by envelope id through an explicit
//! map, so gaps in the id sequence are harmless.

use std::collections::BTreeMap;
use serde::Serialize;
use crate::{Error, Result};
use crate::page::PageRecord;
use crate::storage::{DeleteSummary, SqliteStore};

/// Outcome of a cross-table consistency check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub consistent: bool,
    pub orphaned_envelope_ids: Vec<i64>,
}

/// Read/delete front for the page store
pub struct RangeReader<'a> {
    store: &'a SqliteStore,
}

impl<'a> RangeReader<'a> {
    pub fn new(store: &'a SqliteStore) -> Self {
        Self { store }
    }

    /// One record per id in `[left, right]`, in id order.
    ///
    /// Ids without an envelope row come back as empty records. `left > right`
    /// yields nothing. The range is not bounded here; callers must cap it.
    pub fn fetch_range(&self, left: i64, right: i64) -> Result<Vec<PageRecord>> {
        if left > right {
            return Ok(Vec::new());
        }

        let mut slots: BTreeMap<i64, PageRecord> =
            (left..=right).map(|id| (id, PageRecord::default())).collect();

        // Every envelope slot is filled before any item is attached
        for envelope in self.store.query_envelopes(left, right)? {
            let id = envelope.id;
            let slot = slots
                .get_mut(&id)
                .ok_or_else(|| out_of_range("envelope", id, left, right))?;
            *slot = PageRecord::from_envelope(envelope);
        }

        for item in self.store.query_items(left, right)? {
            let id = item.envelope_id;
            slots
                .get_mut(&id)
                .ok_or_else(|| out_of_range("item", id, left, right))?
                .push_item(item);
        }

        Ok(slots.into_values().collect())
    }

    /// The record for `index`, or `None` if no envelope has that id.
    pub fn fetch_one(&self, index: i64) -> Result<Option<PageRecord>> {
        let Some(envelope) = self.store.query_envelopes(index, index)?.into_iter().next() else {
            return Ok(None);
        };

        let mut record = PageRecord::from_envelope(envelope);
        for item in self.store.query_items(index, index)? {
            record.push_item(item);
        }
        Ok(Some(record))
    }

    /// Remove the envelope and its items together.
    pub fn delete_page(&self, index: i64) -> Result<DeleteSummary> {
        let summary = self.store.delete_page(index)?;
        tracing::info!(index, envelopes = summary.envelopes, items = summary.items, "page deleted");
        Ok(summary)
    }

    pub fn consistency(&self) -> Result<ConsistencyReport> {
        let orphaned = self.store.orphaned_items()?;
        Ok(ConsistencyReport {
            consistent: orphaned.is_empty(),
            orphaned_envelope_ids: orphaned,
        })
    }
}

fn out_of_range(kind: &str, id: i64, left: i64, right: i64) -> Error {
    Error::Consistency(format!("{kind} row for id {id} returned outside range [{left}, {right}]"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::PageBody;

    fn ingest(store: &SqliteStore, id: i64, raw: &str) {
        let (envelope, items) = PageBody::decode(raw).unwrap().into_rows(id);
        store.insert_page(&envelope, &items).unwrap();
    }

    const PAGE_ONE: &str = r#"{"meta":{"pagination":{"total":100,"pages":2,"page":1,"limit":50,
        "links":{"previous":"","current":"p1","next":"p2"}}},
        "data":[{"id":1,"user_id":9,"title":"a","body":"b"}]}"#;
    const PAGE_TWO: &str = r#"{"meta":{"pagination":{"total":100,"pages":2,"page":2,"limit":50,
        "links":{"previous":"p1","current":"p2","next":""}}},
        "data":[{"id":2,"user_id":9,"title":"c","body":"d"}]}"#;

    fn two_page_store() -> SqliteStore {
        let store = SqliteStore::open_in_memory().unwrap();
        ingest(&store, 1, PAGE_ONE);
        ingest(&store, 2, PAGE_TWO);
        store
    }

    #[test]
    fn test_two_page_range() {
        let store = two_page_store();
        let reader = RangeReader::new(&store);

        let records = reader.fetch_range(1, 2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0], PageBody::decode(PAGE_ONE).unwrap());
        assert_eq!(records[1], PageBody::decode(PAGE_TWO).unwrap());
        assert_eq!(records[1].meta.pagination.links.previous, "p1");
        assert_eq!(records[1].data[0].title, "c");
    }

    #[test]
    fn test_single_fetch_matches_range_entry() {
        let store = two_page_store();
        let reader = RangeReader::new(&store);

        let range = reader.fetch_range(1, 2).unwrap();
        for k in 1..=2 {
            let one = reader.fetch_one(k).unwrap().unwrap();
            assert_eq!(one, range[(k - 1) as usize]);
        }
    }

    #[test]
    fn test_empty_range() {
        let store = two_page_store();
        let reader = RangeReader::new(&store);
        assert!(reader.fetch_range(2, 1).unwrap().is_empty());
    }

    #[test]
    fn test_missing_single_is_none() {
        let store = two_page_store();
        assert!(RangeReader::new(&store).fetch_one(3).unwrap().is_none());
    }

    #[test]
    fn test_item_order_is_insertion_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        ingest(
            &store,
            1,
            r#"{"data":[{"id":30,"title":"x"},{"id":10,"title":"y"},{"id":20,"title":"z"}]}"#,
        );

        let records = RangeReader::new(&store).fetch_range(1, 1).unwrap();
        let ids: Vec<_> = records[0].data.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![30, 10, 20]);
    }

    #[test]
    fn test_gaps_yield_empty_slots() {
        let store = SqliteStore::open_in_memory().unwrap();
        ingest(&store, 1, PAGE_ONE);
        ingest(&store, 4, PAGE_TWO);

        let records = RangeReader::new(&store).fetch_range(1, 4).unwrap();
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].data[0].id, 1);
        assert_eq!(records[1], PageRecord::default());
        assert_eq!(records[2], PageRecord::default());
        assert_eq!(records[3].data[0].id, 2);
    }

    #[test]
    fn test_delete_then_range() {
        let store = two_page_store();
        let reader = RangeReader::new(&store);

        let summary = reader.delete_page(1).unwrap();
        assert_eq!(summary.envelopes, 1);
        assert_eq!(summary.items, 1);

        let records = reader.fetch_range(1, 2).unwrap();
        assert_eq!(records[0], PageRecord::default());
        assert_eq!(records[1].data.len(), 1);
        assert!(store.query_items(1, 1).unwrap().is_empty());
        assert!(reader.consistency().unwrap().consistent);
    }

    #[test]
    fn test_consistency_reports_orphans() {
        let store = two_page_store();
        store.delete_envelope(2).unwrap();

        let report = RangeReader::new(&store).consistency().unwrap();
        assert!(!report.consistent);
        assert_eq!(report.orphaned_envelope_ids, vec![2]);
    }
}
