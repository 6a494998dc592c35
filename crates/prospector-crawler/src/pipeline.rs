//! Wires discovery, extraction, and persistence into one crawl.
//!
//! All three stages run concurrently in the calling task, connected by
//! bounded channels. The reference queue between discovery and extraction
//! carries the backpressure; the record channel between extraction and the
//! sink drain is sized to one batch. Stage outcomes and session counters
//! are folded into a [`CrawlSummary`] at the end, so even a crawl that hit
//! a fatal condition reports what it accomplished.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Instant;

use prospector_core::sink::RecordSink;
use prospector_core::BusinessRecord;
use tokio::sync::mpsc;

use crate::context::CrawlContext;
use crate::discovery::run_discovery;
use crate::error::CrawlError;
use crate::extract::run_extractors;
use crate::target::TargetAdapter;
use crate::types::{CrawlConfig, CrawlFailure, CrawlSummary, SearchQuery, Stage};
use crate::CancelToken;

/// Runs a full crawl for `query` against `adapter`, persisting validated
/// records through `sink`.
///
/// Always returns a [`CrawlSummary`] once the crawl has started; partial
/// and fatal outcomes are reported through [`CrawlSummary::failures`].
///
/// # Errors
///
/// Returns [`CrawlError::Http`] only when the HTTP client cannot be
/// constructed, before any request is made.
pub async fn run_crawl<A, S>(
    query: &SearchQuery,
    adapter: Arc<A>,
    config: CrawlConfig,
    sink: &mut S,
    cancel: CancelToken,
) -> Result<CrawlSummary, CrawlError>
where
    A: TargetAdapter,
    S: RecordSink,
{
    let ctx = CrawlContext::new(adapter, config, cancel)?;
    Ok(run_crawl_with_context(&ctx, query, sink).await)
}

/// The crawl proper, with a caller-built context. Used by [`run_crawl`] and
/// by tests that need to inspect session state afterwards.
pub async fn run_crawl_with_context<A, S>(
    ctx: &CrawlContext<A>,
    query: &SearchQuery,
    sink: &mut S,
) -> CrawlSummary
where
    A: TargetAdapter,
    S: RecordSink,
{
    let started = Instant::now();
    tracing::info!(
        subject = %query.subject,
        location = %query.location,
        "crawl started"
    );

    let (refs_tx, refs_rx) = mpsc::channel(ctx.config.queue_capacity.max(1));
    let (records_tx, records_rx) = mpsc::channel(ctx.config.batch_size.max(1));

    let (discovery, extraction, storage) = tokio::join!(
        run_discovery(ctx, query, refs_tx),
        run_extractors(ctx, refs_rx, records_tx),
        drain_to_sink(records_rx, sink, ctx.config.batch_size.max(1)),
    );

    let mut failures = discovery.failures;
    failures.extend(extraction.failures);
    failures.extend(storage.failures);

    let summary = CrawlSummary {
        records_written: storage.records_written,
        failures,
        pages_fetched: discovery.pages_fetched,
        references_discovered: discovery.references_emitted,
        requests_issued: ctx.session.counters.requests_issued.load(Ordering::Relaxed),
        retries: ctx.session.counters.retries.load(Ordering::Relaxed),
        elapsed: started.elapsed(),
    };
    tracing::info!(
        records_written = summary.records_written,
        pages = summary.pages_fetched,
        references = summary.references_discovered,
        failures = summary.failures.len(),
        elapsed_secs = summary.elapsed.as_secs(),
        "crawl finished"
    );
    summary
}

#[derive(Debug, Default)]
struct StorageOutcome {
    records_written: u64,
    failures: Vec<CrawlFailure>,
}

/// Buffers records into batches of `batch_size` and persists each through
/// the sink. A failed batch is retried once; losing it twice is reported as
/// fatal because records already extracted were dropped.
async fn drain_to_sink<S: RecordSink>(
    mut records_rx: mpsc::Receiver<BusinessRecord>,
    sink: &mut S,
    batch_size: usize,
) -> StorageOutcome {
    let mut outcome = StorageOutcome::default();
    let mut batch: Vec<BusinessRecord> = Vec::with_capacity(batch_size);

    while let Some(record) = records_rx.recv().await {
        batch.push(record);
        if batch.len() >= batch_size {
            persist_batch(sink, &mut batch, &mut outcome).await;
        }
    }
    if !batch.is_empty() {
        persist_batch(sink, &mut batch, &mut outcome).await;
    }
    if let Err(err) = sink.flush().await {
        outcome.failures.push(CrawlFailure {
            stage: Stage::Storage,
            external_id: None,
            reason: format!("sink flush failed: {err}"),
            fatal: true,
        });
    }
    outcome
}

async fn persist_batch<S: RecordSink>(
    sink: &mut S,
    batch: &mut Vec<BusinessRecord>,
    outcome: &mut StorageOutcome,
) {
    let result = match sink.persist(batch).await {
        Ok(sunk) => Ok(sunk),
        Err(err) => {
            tracing::warn!(size = batch.len(), error = %err, "batch persist failed — retrying");
            sink.persist(batch).await
        }
    };
    match result {
        Ok(sunk) => {
            outcome.records_written += sunk.inserted;
            for (external_id, reason) in sunk.failed {
                tracing::warn!(external_id, reason, "record rejected by sink");
                outcome.failures.push(CrawlFailure {
                    stage: Stage::Storage,
                    external_id: Some(external_id),
                    reason,
                    fatal: false,
                });
            }
        }
        Err(err) => {
            tracing::error!(size = batch.len(), error = %err, "batch lost after retry");
            outcome.failures.push(CrawlFailure {
                stage: Stage::Storage,
                external_id: None,
                reason: format!("batch of {} records lost: {err}", batch.len()),
                fatal: true,
            });
        }
    }
    batch.clear();
}
