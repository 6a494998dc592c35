//! Session token lifecycle and per-crawl shared state.
//!
//! Token and identity material is the only mutable state shared across the
//! worker pool. It lives behind one async mutex with a generation counter:
//! a worker that observes a block reports the generation it was using, and
//! the refresh only runs if no other worker refreshed first. Concurrent
//! blocked workers therefore trigger exactly one handshake (single-flight)
//! and all resume on the refreshed tokens.

use std::sync::atomic::AtomicU64;
use std::time::{Duration, Instant};

use reqwest::Client;
use tokio::sync::Mutex;

use crate::client::{collect_cookie_header, fetch_document_full};
use crate::error::CrawlError;
use crate::identity::{Identity, IdentityPool};
use crate::target::TargetAdapter;

/// Session material extracted from the target's landing document.
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub request_token: String,
    /// Folded `Set-Cookie` material from the handshake response.
    pub cookie_header: Option<String>,
    pub issued_at: Instant,
    pub expires_at: Instant,
}

impl SessionTokens {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Performs the handshake fetch against the search frontend and parses the
/// embedded token material.
pub struct TokenExtractor<A> {
    client: Client,
    adapter: std::sync::Arc<A>,
    /// TTL assigned when the landing document advertises no expiry.
    default_ttl: Duration,
}

impl<A: TargetAdapter> TokenExtractor<A> {
    pub fn new(client: Client, adapter: std::sync::Arc<A>, default_ttl: Duration) -> Self {
        Self {
            client,
            adapter,
            default_ttl,
        }
    }

    /// Loads the landing document under `identity` and extracts session
    /// tokens from its body and headers.
    ///
    /// # Errors
    ///
    /// - [`CrawlError::Blocked`] when the response indicates automation
    ///   detection (403 or challenge page).
    /// - [`CrawlError::Http`] / [`CrawlError::RateLimited`] /
    ///   [`CrawlError::UnexpectedStatus`] on connection-level failure.
    /// - [`CrawlError::Parse`] when no token is embedded in the body.
    pub async fn acquire(&self, identity: &Identity) -> Result<SessionTokens, CrawlError> {
        let url = self.adapter.landing_url();
        let (headers, body) = fetch_document_full(
            &self.client,
            self.adapter.as_ref(),
            &url,
            identity.headers(),
            None,
        )
        .await?;

        let request_token = self.adapter.parse_session_token(&body)?;
        let cookie_header = collect_cookie_header(&headers);
        let ttl = self.adapter.token_ttl_hint(&body).unwrap_or(self.default_ttl);
        let issued_at = Instant::now();

        tracing::debug!(ttl_secs = ttl.as_secs(), "session tokens acquired");
        Ok(SessionTokens {
            request_token,
            cookie_header,
            issued_at,
            expires_at: issued_at + ttl,
        })
    }
}

/// Read-only view of the session state a request is issued under. The
/// `generation` is handed back on [`CrawlSession::refresh_after_block`] so
/// the session can tell stale reports from fresh ones.
#[derive(Debug, Clone)]
pub struct TokenSnapshot {
    pub generation: u64,
    pub request_token: String,
    pub cookie_header: Option<String>,
    pub headers: Vec<(&'static str, String)>,
}

/// Monotonic progress counters for one crawl.
#[derive(Debug, Default)]
pub struct Counters {
    pub requests_issued: AtomicU64,
    pub records_emitted: AtomicU64,
    pub failures: AtomicU64,
    pub retries: AtomicU64,
}

struct TokenState {
    identity: Identity,
    tokens: Option<SessionTokens>,
    generation: u64,
}

/// Process-scoped aggregate for one crawl invocation: current identity,
/// session tokens, and counters. Created at crawl start, torn down at crawl
/// end; token material is refreshed in place, never replaced wholesale
/// unless expired or blocked.
pub struct CrawlSession {
    state: Mutex<TokenState>,
    identities: IdentityPool,
    pub counters: Counters,
}

impl CrawlSession {
    #[must_use]
    pub fn new(identities: IdentityPool) -> Self {
        let identity = identities.next_identity();
        Self {
            state: Mutex::new(TokenState {
                identity,
                tokens: None,
                generation: 0,
            }),
            identities,
            counters: Counters::default(),
        }
    }

    /// Returns a snapshot of valid session state, acquiring or re-acquiring
    /// tokens first when none are held or the held ones expired. Expired
    /// tokens are never silently reused.
    ///
    /// # Errors
    ///
    /// Propagates handshake failures from [`TokenExtractor::acquire`].
    pub async fn current<A: TargetAdapter>(
        &self,
        extractor: &TokenExtractor<A>,
    ) -> Result<TokenSnapshot, CrawlError> {
        let mut state = self.state.lock().await;
        match &state.tokens {
            Some(tokens) if !tokens.is_expired() => Ok(Self::snapshot_of(&state, tokens)),
            _ => self.reacquire_locked(&mut state, extractor).await,
        }
    }

    /// Rotates identity and re-acquires tokens after a block, single-flight.
    ///
    /// `observed_generation` is the generation of the snapshot the blocked
    /// request was issued under. If another worker already refreshed (the
    /// live generation moved on), the current state is returned without a
    /// second handshake.
    ///
    /// # Errors
    ///
    /// Propagates handshake failures; the caller treats those as the session
    /// no longer being viable.
    pub async fn refresh_after_block<A: TargetAdapter>(
        &self,
        observed_generation: u64,
        extractor: &TokenExtractor<A>,
    ) -> Result<TokenSnapshot, CrawlError> {
        let mut state = self.state.lock().await;
        match &state.tokens {
            Some(tokens) if state.generation != observed_generation => {
                // Another worker already refreshed; resume on its tokens.
                Ok(Self::snapshot_of(&state, tokens))
            }
            _ => {
                tracing::info!(
                    generation = state.generation,
                    "block reported — rotating identity and re-acquiring tokens"
                );
                self.reacquire_locked(&mut state, extractor).await
            }
        }
    }

    /// Re-acquires under the held lock; concurrent callers queue on the
    /// mutex and find the bumped generation when they get it.
    async fn reacquire_locked<A: TargetAdapter>(
        &self,
        state: &mut TokenState,
        extractor: &TokenExtractor<A>,
    ) -> Result<TokenSnapshot, CrawlError> {
        state.identity = self.identities.next_identity();
        let tokens = extractor.acquire(&state.identity).await?;
        state.generation += 1;
        let snapshot = TokenSnapshot {
            generation: state.generation,
            request_token: tokens.request_token.clone(),
            cookie_header: tokens.cookie_header.clone(),
            headers: state.identity.headers().to_vec(),
        };
        state.tokens = Some(tokens);
        Ok(snapshot)
    }

    fn snapshot_of(state: &TokenState, tokens: &SessionTokens) -> TokenSnapshot {
        TokenSnapshot {
            generation: state.generation,
            request_token: tokens.request_token.clone(),
            cookie_header: tokens.cookie_header.clone(),
            headers: state.identity.headers().to_vec(),
        }
    }
}
