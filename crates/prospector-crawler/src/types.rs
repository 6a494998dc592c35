use std::time::Duration;

use chrono::{DateTime, Utc};
use prospector_core::AppConfig;

/// The (subject, location) pair a crawl is asked to resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchQuery {
    pub subject: String,
    pub location: String,
}

impl SearchQuery {
    #[must_use]
    pub fn new(subject: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            location: location.into(),
        }
    }

    /// The combined search phrase submitted to the target,
    /// e.g. `"dentist in Austin, TX"`.
    #[must_use]
    pub fn combined(&self) -> String {
        format!("{} in {}", self.subject, self.location)
    }
}

/// A deduplicated pointer to one business profile, produced by discovery and
/// consumed exactly once by extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileReference {
    pub external_id: String,
    pub raw_url: String,
    pub discovered_at: DateTime<Utc>,
}

/// Pipeline stage a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Discovery,
    Extraction,
    Validation,
    Storage,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Discovery => write!(f, "discovery"),
            Stage::Extraction => write!(f, "extraction"),
            Stage::Validation => write!(f, "validation"),
            Stage::Storage => write!(f, "storage"),
        }
    }
}

/// One contained failure, reported in the [`CrawlSummary`] rather than
/// aborting the crawl. `fatal` marks session-wide conditions that ended a
/// stage early.
#[derive(Debug, Clone)]
pub struct CrawlFailure {
    pub stage: Stage,
    pub external_id: Option<String>,
    pub reason: String,
    pub fatal: bool,
}

/// The user-visible result of a crawl. Always produced, even on partial or
/// fatal failure — the crawl never fails silently.
#[derive(Debug, Default)]
pub struct CrawlSummary {
    pub records_written: u64,
    pub failures: Vec<CrawlFailure>,
    pub pages_fetched: u64,
    pub references_discovered: u64,
    pub requests_issued: u64,
    pub retries: u64,
    pub elapsed: Duration,
}

impl CrawlSummary {
    /// Whether any stage hit a session-wide fatal condition.
    #[must_use]
    pub fn has_fatal_failure(&self) -> bool {
        self.failures.iter().any(|f| f.fatal)
    }
}

/// Tunables for one crawl invocation.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    /// Size of the extraction worker pool.
    pub max_concurrent_extractors: usize,
    /// Additional attempts after the first failure, per page or reference.
    pub max_retries: u32,
    /// Per-request timeout on the shared HTTP client.
    pub request_timeout: Duration,
    /// Base delay for exponential backoff between retry attempts.
    pub backoff_base_ms: u64,
    /// Capacity of the reference queue between discovery and extraction.
    /// Discovery suspends once the queue is full (backpressure).
    pub queue_capacity: usize,
    /// Records per sink batch.
    pub batch_size: usize,
    /// TTL assigned to session tokens when the target supplies no expiry.
    pub token_ttl: Duration,
    /// Pause between search-page fetches.
    pub inter_page_delay: Duration,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_concurrent_extractors: 8,
            max_retries: 3,
            request_timeout: Duration::from_secs(30),
            backoff_base_ms: 500,
            queue_capacity: 64,
            batch_size: 50,
            token_ttl: Duration::from_secs(600),
            inter_page_delay: Duration::from_millis(250),
        }
    }
}

impl CrawlConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            max_concurrent_extractors: config.max_concurrent_extractors,
            max_retries: config.max_retries,
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            backoff_base_ms: config.backoff_base_ms,
            queue_capacity: config.queue_capacity,
            batch_size: config.batch_size,
            token_ttl: Duration::from_secs(config.token_ttl_secs),
            inter_page_delay: Duration::from_millis(config.inter_page_delay_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_query_joins_subject_and_location() {
        let query = SearchQuery::new("dentist", "Austin, TX");
        assert_eq!(query.combined(), "dentist in Austin, TX");
    }

    #[test]
    fn summary_reports_fatal_failures() {
        let mut summary = CrawlSummary::default();
        assert!(!summary.has_fatal_failure());
        summary.failures.push(CrawlFailure {
            stage: Stage::Extraction,
            external_id: Some("biz-1".to_string()),
            reason: "retries exhausted".to_string(),
            fatal: false,
        });
        assert!(!summary.has_fatal_failure());
        summary.failures.push(CrawlFailure {
            stage: Stage::Discovery,
            external_id: None,
            reason: "blocked twice on the same page".to_string(),
            fatal: true,
        });
        assert!(summary.has_fatal_failure());
    }
}
