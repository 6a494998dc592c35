//! Discovery stage: paginates search results into a deduplicated stream of
//! profile references.
//!
//! Discovery is inherently sequential — each page's continuation depends on
//! the previous one — so it runs as a single task feeding the bounded
//! reference queue. A full queue suspends the `send`, which is the
//! backpressure that keeps discovery from racing ahead of extraction.
//!
//! Termination: a page that yields zero NEW references ends the crawl. The
//! target reports no total count we can trust, and result counts vary per
//! query, so an unproductive page (empty, or all duplicates of earlier
//! pages) is the end-of-results signal rather than any fixed page budget.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::mpsc;

use crate::client::fetch_document;
use crate::context::CrawlContext;
use crate::error::CrawlError;
use crate::retry::retry_with_backoff;
use crate::target::TargetAdapter;
use crate::types::{CrawlFailure, ProfileReference, SearchQuery, Stage};

/// What discovery accomplished, fatal or not.
#[derive(Debug, Default)]
pub struct DiscoveryOutcome {
    pub pages_fetched: u64,
    pub references_emitted: u64,
    pub failures: Vec<CrawlFailure>,
}

/// Runs the pagination loop, emitting deduplicated [`ProfileReference`]s
/// into `tx` until the results are exhausted, the session stops being
/// viable, or the crawl is cancelled.
///
/// Failure policy per page:
/// - transient errors are retried with backoff; exhaustion degrades to
///   end-of-results (reported, non-fatal) rather than aborting the crawl;
/// - a block triggers one identity/token refresh and a page retry; a second
///   consecutive block is fatal for discovery, since the session is no
///   longer viable.
pub async fn run_discovery<A: TargetAdapter>(
    ctx: &CrawlContext<A>,
    query: &SearchQuery,
    tx: mpsc::Sender<ProfileReference>,
) -> DiscoveryOutcome {
    let mut outcome = DiscoveryOutcome::default();
    let mut seen: HashSet<String> = HashSet::new();
    let mut offset: u32 = 0;
    let mut blocked_streak: u32 = 0;
    let mut first_page = true;

    'pages: loop {
        if ctx.cancel.is_cancelled() {
            tracing::info!(offset, "crawl cancelled — stopping discovery");
            break;
        }
        if !first_page && !ctx.config.inter_page_delay.is_zero() {
            tokio::time::sleep(ctx.config.inter_page_delay).await;
        }
        first_page = false;

        let observed_generation = AtomicU64::new(0);
        let result = retry_with_backoff(
            ctx.config.max_retries,
            ctx.config.backoff_base_ms,
            &ctx.session.counters.retries,
            || {
                let observed_generation = &observed_generation;
                async move {
                    let snapshot = ctx.session.current(&ctx.extractor).await?;
                    observed_generation.store(snapshot.generation, Ordering::Relaxed);
                    let url = ctx.adapter.search_url(query, &snapshot.request_token, offset);
                    ctx.session
                        .counters
                        .requests_issued
                        .fetch_add(1, Ordering::Relaxed);
                    let body = fetch_document(
                        &ctx.client,
                        ctx.adapter.as_ref(),
                        &url,
                        &snapshot.headers,
                        snapshot.cookie_header.as_deref(),
                    )
                    .await?;
                    ctx.adapter.parse_profile_links(&body)
                }
            },
        )
        .await;

        match result {
            Ok(links) => {
                blocked_streak = 0;
                outcome.pages_fetched += 1;
                let mut new_references = 0u64;
                for link in links {
                    let Some(external_id) = ctx.adapter.external_id_from_link(&link) else {
                        tracing::warn!(link, "skipping profile link with no id");
                        continue;
                    };
                    if !seen.insert(external_id.clone()) {
                        continue;
                    }
                    new_references += 1;
                    let reference = ProfileReference {
                        raw_url: ctx.adapter.profile_url(&external_id),
                        external_id,
                        discovered_at: Utc::now(),
                    };
                    if tx.send(reference).await.is_err() {
                        // Extraction hung up (cancellation); nothing left to feed.
                        tracing::info!("reference queue closed — stopping discovery");
                        break 'pages;
                    }
                }
                outcome.references_emitted += new_references;
                tracing::debug!(offset, new_references, "search page processed");
                if new_references == 0 {
                    tracing::info!(
                        pages = outcome.pages_fetched,
                        references = outcome.references_emitted,
                        "no new references on page — discovery complete"
                    );
                    break;
                }
                offset += ctx.adapter.results_per_page();
            }
            Err(err @ CrawlError::Blocked { .. }) if blocked_streak == 0 => {
                blocked_streak = 1;
                tracing::warn!(offset, error = %err, "search page blocked — re-authenticating");
                let observed = observed_generation.load(Ordering::Relaxed);
                if let Err(refresh_err) =
                    ctx.session.refresh_after_block(observed, &ctx.extractor).await
                {
                    ctx.session.counters.failures.fetch_add(1, Ordering::Relaxed);
                    outcome.failures.push(CrawlFailure {
                        stage: Stage::Discovery,
                        external_id: None,
                        reason: format!("re-authentication failed: {refresh_err}"),
                        fatal: true,
                    });
                    break;
                }
                // Retry the same page under the refreshed session.
            }
            Err(err @ CrawlError::Blocked { .. }) => {
                ctx.session.counters.failures.fetch_add(1, Ordering::Relaxed);
                outcome.failures.push(CrawlFailure {
                    stage: Stage::Discovery,
                    external_id: None,
                    reason: format!("blocked twice consecutively at offset {offset}: {err}"),
                    fatal: true,
                });
                break;
            }
            Err(err) => {
                ctx.session.counters.failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    offset,
                    error = %err,
                    "page retries exhausted — treating as end of results"
                );
                outcome.failures.push(CrawlFailure {
                    stage: Stage::Discovery,
                    external_id: None,
                    reason: format!("page at offset {offset} abandoned: {err}"),
                    fatal: false,
                });
                break;
            }
        }
    }

    outcome
}
