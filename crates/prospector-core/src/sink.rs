//! The storage boundary.
//!
//! The pipeline hands validated [`BusinessRecord`] batches to a
//! [`RecordSink`]; concrete backends (Postgres, CSV file) are
//! interchangeable behind this contract. `external_id` is the natural key
//! everywhere: re-persisting a record updates rather than duplicates.

use thiserror::Error;

use crate::record::BusinessRecord;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error("batch persistence failed: {0}")]
    Batch(String),
}

/// Result of persisting one batch: per-record failures are reported, not
/// escalated — a single bad record must not take the batch down with it.
#[derive(Debug, Default)]
pub struct SinkOutcome {
    pub inserted: u64,
    /// `(external_id, reason)` for records the backend rejected.
    pub failed: Vec<(String, String)>,
}

/// A record-oriented sink with upsert semantics keyed by `external_id`.
#[allow(async_fn_in_trait)]
pub trait RecordSink {
    /// Persists a batch. A `SinkError` means the whole batch failed
    /// (callers may retry it); individually rejected records are reported
    /// through [`SinkOutcome::failed`].
    async fn persist(&mut self, batch: &[BusinessRecord]) -> Result<SinkOutcome, SinkError>;

    /// Flushes buffered state at end of crawl. Default: nothing to do.
    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// In-memory sink with upsert semantics, for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Vec<BusinessRecord>,
}

impl MemorySink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn records(&self) -> &[BusinessRecord] {
        &self.records
    }
}

impl RecordSink for MemorySink {
    async fn persist(&mut self, batch: &[BusinessRecord]) -> Result<SinkOutcome, SinkError> {
        let mut outcome = SinkOutcome::default();
        for record in batch {
            match self
                .records
                .iter_mut()
                .find(|held| held.external_id == record.external_id)
            {
                Some(held) => *held = record.clone(),
                None => self.records.push(record.clone()),
            }
            outcome.inserted += 1;
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{normalize, RawProfile};

    fn record(external_id: &str, name: &str) -> BusinessRecord {
        let raw = RawProfile {
            name: Some(name.to_string()),
            ..RawProfile::default()
        };
        normalize(raw, external_id).unwrap()
    }

    #[tokio::test]
    async fn memory_sink_upserts_by_external_id() {
        let mut sink = MemorySink::new();
        let first = sink
            .persist(&[record("a", "First"), record("b", "Other")])
            .await
            .unwrap();
        assert_eq!(first.inserted, 2);

        // Same key, newer values: exactly one stored row, reflecting the
        // latest write.
        let second = sink.persist(&[record("a", "Updated")]).await.unwrap();
        assert_eq!(second.inserted, 1);
        assert_eq!(sink.records().len(), 2);
        let held = sink
            .records()
            .iter()
            .find(|r| r.external_id == "a")
            .unwrap();
        assert_eq!(held.name, "Updated");
    }
}
