//! Two-stage crawl pipeline for map-search business listings.
//!
//! The discovery stage paginates search results into a deduplicated, bounded
//! queue of profile references; the extraction stage drains that queue with a
//! bounded worker pool, parsing each profile into a
//! [`prospector_core::BusinessRecord`] and handing validated records to a
//! [`prospector_core::sink::RecordSink`]. All target-specific request
//! construction and response parsing lives behind the [`target::TargetAdapter`]
//! trait so the pipeline survives target-side format changes.

pub mod cancel;
pub mod client;
pub mod context;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod identity;
pub mod pipeline;
pub mod retry;
pub mod session;
pub mod target;
pub mod types;

pub use cancel::CancelToken;
pub use context::CrawlContext;
pub use error::CrawlError;
pub use pipeline::{run_crawl, run_crawl_with_context};
pub use target::{ProListTarget, TargetAdapter};
pub use types::{CrawlConfig, CrawlFailure, CrawlSummary, ProfileReference, SearchQuery, Stage};
