use thiserror::Error;

#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("rate limited at {url} (retry after {retry_after_secs}s)")]
    RateLimited { url: String, retry_after_secs: u64 },

    /// Anti-automation signal: 403, or a 2xx response carrying a challenge
    /// page. Handled by rotating identity and re-acquiring session tokens,
    /// never by blind retry.
    #[error("blocked by target at {url}: {reason}")]
    Blocked { url: String, reason: String },

    #[error("unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Page-level parse failure — the response shape was not recognized at
    /// all. Field-level failures never surface as errors; they produce
    /// partial records instead.
    #[error("parse error for {context}: {reason}")]
    Parse { context: String, reason: String },

    #[error(transparent)]
    Validation(#[from] prospector_core::ValidationError),
}
