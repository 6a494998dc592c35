//! Extraction stage: a bounded worker pool draining the reference queue.
//!
//! Workers are independent except for the session's token state. A blocked
//! worker reports the generation it was using and awaits the single-flight
//! refresh; references that exhaust their retries go to the dead-letter
//! list in the outcome instead of crashing the pool.

use std::sync::atomic::{AtomicU64, Ordering};

use futures::stream::{self, StreamExt};
use prospector_core::{normalize, BusinessRecord};
use tokio::sync::mpsc;

use crate::client::fetch_document;
use crate::context::CrawlContext;
use crate::error::CrawlError;
use crate::retry::retry_with_backoff;
use crate::target::TargetAdapter;
use crate::types::{CrawlFailure, ProfileReference, Stage};

/// Per-reference failures collected by the pool. Dead letters (stage
/// `Extraction`) and dropped records (stage `Validation`) — never fatal.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub failures: Vec<CrawlFailure>,
}

/// Consumes `refs_rx` with up to `max_concurrent_extractors` in-flight
/// extractions, sending validated records into `records_tx`.
///
/// Ends when the reference queue closes or the crawl is cancelled; in-flight
/// extractions finish under the per-request timeout either way.
pub async fn run_extractors<A: TargetAdapter>(
    ctx: &CrawlContext<A>,
    refs_rx: mpsc::Receiver<ProfileReference>,
    records_tx: mpsc::Sender<BusinessRecord>,
) -> ExtractionOutcome {
    let cancel = ctx.cancel.clone();
    let references = stream::unfold((refs_rx, cancel), |(mut rx, cancel)| async move {
        let next = tokio::select! {
            () = cancel.cancelled() => None,
            reference = rx.recv() => reference,
        };
        next.map(|reference| (reference, (rx, cancel)))
    });

    let failures: Vec<CrawlFailure> = references
        .map(|reference| extract_one(ctx, reference, &records_tx))
        .buffer_unordered(ctx.config.max_concurrent_extractors.max(1))
        .filter_map(|failure| async move { failure })
        .collect()
        .await;

    ExtractionOutcome { failures }
}

/// Fetches and parses one profile, retrying transients and riding out at
/// most one session refresh. Returns a failure descriptor when the
/// reference could not be turned into a record.
async fn extract_one<A: TargetAdapter>(
    ctx: &CrawlContext<A>,
    reference: ProfileReference,
    records_tx: &mpsc::Sender<BusinessRecord>,
) -> Option<CrawlFailure> {
    if ctx.cancel.is_cancelled() {
        return None;
    }

    let mut refreshed_once = false;
    loop {
        let observed_generation = AtomicU64::new(0);
        let result = retry_with_backoff(
            ctx.config.max_retries,
            ctx.config.backoff_base_ms,
            &ctx.session.counters.retries,
            || {
                let observed_generation = &observed_generation;
                let raw_url = &reference.raw_url;
                async move {
                    let snapshot = ctx.session.current(&ctx.extractor).await?;
                    observed_generation.store(snapshot.generation, Ordering::Relaxed);
                    ctx.session
                        .counters
                        .requests_issued
                        .fetch_add(1, Ordering::Relaxed);
                    let body = fetch_document(
                        &ctx.client,
                        ctx.adapter.as_ref(),
                        raw_url,
                        &snapshot.headers,
                        snapshot.cookie_header.as_deref(),
                    )
                    .await?;
                    ctx.adapter.parse_profile(&body)
                }
            },
        )
        .await;

        match result {
            Ok(raw) => {
                return match normalize(raw, &reference.external_id) {
                    Ok(record) => {
                        ctx.session
                            .counters
                            .records_emitted
                            .fetch_add(1, Ordering::Relaxed);
                        if records_tx.send(record).await.is_err() {
                            tracing::warn!(
                                external_id = %reference.external_id,
                                "record channel closed before persistence"
                            );
                        }
                        None
                    }
                    Err(err) => {
                        ctx.session.counters.failures.fetch_add(1, Ordering::Relaxed);
                        tracing::warn!(
                            external_id = %reference.external_id,
                            error = %err,
                            "record dropped by validation"
                        );
                        Some(CrawlFailure {
                            stage: Stage::Validation,
                            external_id: Some(reference.external_id),
                            reason: err.to_string(),
                            fatal: false,
                        })
                    }
                };
            }
            Err(err @ CrawlError::Blocked { .. }) if !refreshed_once => {
                refreshed_once = true;
                tracing::warn!(
                    external_id = %reference.external_id,
                    error = %err,
                    "profile fetch blocked — awaiting session refresh"
                );
                let observed = observed_generation.load(Ordering::Relaxed);
                match ctx.session.refresh_after_block(observed, &ctx.extractor).await {
                    Ok(_) => {} // retry under the refreshed session
                    Err(refresh_err) => {
                        ctx.session.counters.failures.fetch_add(1, Ordering::Relaxed);
                        return Some(dead_letter(
                            reference,
                            format!("re-authentication failed: {refresh_err}"),
                        ));
                    }
                }
            }
            Err(err) => {
                ctx.session.counters.failures.fetch_add(1, Ordering::Relaxed);
                return Some(dead_letter(reference, err.to_string()));
            }
        }
    }
}

fn dead_letter(reference: ProfileReference, reason: String) -> CrawlFailure {
    tracing::warn!(
        external_id = %reference.external_id,
        reason,
        "reference sent to dead letters"
    );
    CrawlFailure {
        stage: Stage::Extraction,
        external_id: Some(reference.external_id),
        reason,
        fatal: false,
    }
}
