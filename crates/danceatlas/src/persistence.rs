use std::collections::HashSet;
use std::fmt::Display;

use crate::store::{DocumentStore, StoreError};
use crate::types::{CrawlResult, SessionRecord};

pub const CLASSES_COLLECTION: &str = "classes";

/// Outcome of one persistence pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PersistReport {
    pub written: usize,
    pub failed: usize,
    pub collisions: usize,
}

impl PersistReport {
    pub fn merge(&mut self, other: PersistReport) {
        self.written += other.written;
        self.failed += other.failed;
        self.collisions += other.collisions;
    }
}

impl Display for PersistReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "\nPersisted sessions:")?;
        writeln!(f, "  Written:    {}", self.written)?;
        writeln!(f, "  Failed:     {}", self.failed)?;
        writeln!(f, "  Collisions: {}", self.collisions)
    }
}

fn upsert_record(
    store: &mut dyn DocumentStore,
    studio: &str,
    key: &str,
    record: &SessionRecord,
) -> Result<(), StoreError> {
    let date = record.date().format("%Y-%m-%d").to_string();
    let document = serde_json::to_value(record)?;
    store.upsert(&[CLASSES_COLLECTION, studio, date.as_str(), key], &document)
}

/// Writes one studio's sessions under `classes/{studio}/{date}/{key}`. A failing record is
/// logged and counted; the rest are still written.
pub fn persist_studio(
    studio: &str,
    records: &[SessionRecord],
    store: &mut dyn DocumentStore,
) -> PersistReport {
    let mut report = PersistReport::default();
    let mut seen = HashSet::new();

    log::info!("Storing {} session(s) for {}", records.len(), studio);
    for record in records {
        let key = record.composite_key();
        if !seen.insert(key.clone()) {
            log::warn!(
                "{}: key {} already written in this batch, '{}' overwrites it",
                studio,
                key,
                record
            );
            report.collisions += 1;
        }
        match upsert_record(store, studio, &key, record) {
            Ok(()) => report.written += 1,
            Err(e) => {
                log::error!("Error storing {} entry {}: {}", studio, record, e);
                report.failed += 1;
            }
        }
    }
    report
}

/// Writes every studio in `result`. A studio whose writes fail does not stop the others.
pub fn persist(result: &CrawlResult, store: &mut dyn DocumentStore) -> PersistReport {
    let mut report = PersistReport::default();
    for (studio, records) in result.iter() {
        report.merge(persist_studio(studio, records, store));
    }
    report
}
