//! File-based sink for runs without a database.
//!
//! Records are buffered keyed by `external_id` (latest write wins, matching
//! the database sink's upsert semantics) and written out once on flush, so
//! an interrupted crawl still produces a complete, well-formed file.

use std::collections::BTreeMap;
use std::path::PathBuf;

use prospector_core::sink::{RecordSink, SinkError, SinkOutcome};
use prospector_core::BusinessRecord;

const HEADER: &str = "external_id,name,business_type,location,website,phone,addresses,services,rating,review_count";

pub(crate) struct CsvSink {
    path: PathBuf,
    business_type: String,
    location: String,
    records: BTreeMap<String, BusinessRecord>,
}

impl CsvSink {
    pub(crate) fn new(
        path: PathBuf,
        business_type: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            path,
            business_type: business_type.into(),
            location: location.into(),
            records: BTreeMap::new(),
        }
    }

    fn render(&self) -> String {
        let mut out = String::from(HEADER);
        out.push('\n');
        for record in self.records.values() {
            let addresses = record.addresses.join("; ");
            let services = record
                .services
                .iter()
                .map(String::as_str)
                .collect::<Vec<_>>()
                .join("; ");
            let rating = record.rating.map(|r| r.to_string()).unwrap_or_default();
            let review_count = record
                .review_count
                .map(|c| c.to_string())
                .unwrap_or_default();
            let fields = [
                record.external_id.as_str(),
                record.name.as_str(),
                self.business_type.as_str(),
                self.location.as_str(),
                record.website.as_deref().unwrap_or(""),
                record.phone.as_deref().unwrap_or(""),
                addresses.as_str(),
                services.as_str(),
                rating.as_str(),
                review_count.as_str(),
            ];
            let row = fields.map(escape_field).join(",");
            out.push_str(&row);
            out.push('\n');
        }
        out
    }
}

impl RecordSink for CsvSink {
    async fn persist(&mut self, batch: &[BusinessRecord]) -> Result<SinkOutcome, SinkError> {
        let mut outcome = SinkOutcome::default();
        for record in batch {
            self.records
                .insert(record.external_id.clone(), record.clone());
            outcome.inserted += 1;
        }
        Ok(outcome)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        tokio::fs::write(&self.path, self.render())
            .await
            .map_err(|e| SinkError::Batch(format!("writing {}: {e}", self.path.display())))?;
        tracing::info!(
            path = %self.path.display(),
            records = self.records.len(),
            "csv file written"
        );
        Ok(())
    }
}

/// Quotes a field when it contains a delimiter, quote, or newline; embedded
/// quotes are doubled.
fn escape_field(field: &str) -> String {
    if field.contains(',') || field.contains('"') || field.contains('\n') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prospector_core::{normalize, RawProfile};

    fn record(external_id: &str, name: &str) -> BusinessRecord {
        let raw = RawProfile {
            name: Some(name.to_string()),
            address: Some("100 Main St\nAustin, TX 78701".to_string()),
            rating: Some("4.8".to_string()),
            ..RawProfile::default()
        };
        normalize(raw, external_id).unwrap()
    }

    #[test]
    fn escapes_delimiters_and_quotes() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[tokio::test]
    async fn writes_deduplicated_rows_on_flush() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut sink = CsvSink::new(path.clone(), "plumber", "Austin, TX");

        sink.persist(&[record("biz-1", "Acme Plumbing")])
            .await
            .unwrap();
        // Re-persisting the same id replaces the buffered row.
        sink.persist(&[record("biz-1", "Acme Plumbing & Sons"), record("biz-2", "Bayou Drains")])
            .await
            .unwrap();
        sink.flush().await.unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 3, "header plus two rows: {written}");
        assert_eq!(lines[0], HEADER);
        assert!(lines[1].contains("Acme Plumbing & Sons"));
        assert!(lines[1].contains("\"Austin, TX\""));
        assert!(lines[2].contains("Bayou Drains"));
    }
}
