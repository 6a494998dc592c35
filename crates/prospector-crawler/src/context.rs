//! Everything a crawl stage needs, bundled for the pipeline and for tests.

use std::sync::Arc;

use reqwest::Client;

use crate::client::build_http_client;
use crate::error::CrawlError;
use crate::identity::IdentityPool;
use crate::session::{CrawlSession, TokenExtractor};
use crate::target::TargetAdapter;
use crate::types::CrawlConfig;
use crate::CancelToken;

/// Shared, read-mostly context for one crawl invocation. Stage functions
/// ([`crate::discovery::run_discovery`], [`crate::extract::run_extractors`])
/// borrow it; the only interior mutability is the session's token state and
/// counters.
pub struct CrawlContext<A> {
    pub(crate) client: Client,
    pub(crate) adapter: Arc<A>,
    pub(crate) extractor: TokenExtractor<A>,
    pub(crate) session: CrawlSession,
    pub(crate) config: CrawlConfig,
    pub(crate) cancel: CancelToken,
}

impl<A: TargetAdapter> CrawlContext<A> {
    /// Builds the HTTP client, token extractor, and a fresh session.
    /// Tokens are acquired lazily on the first request.
    ///
    /// # Errors
    ///
    /// Returns [`CrawlError::Http`] if the HTTP client cannot be built.
    pub fn new(
        adapter: Arc<A>,
        config: CrawlConfig,
        cancel: CancelToken,
    ) -> Result<Self, CrawlError> {
        let client = build_http_client(&config)?;
        let extractor = TokenExtractor::new(client.clone(), Arc::clone(&adapter), config.token_ttl);
        let session = CrawlSession::new(IdentityPool::new());
        Ok(Self {
            client,
            adapter,
            extractor,
            session,
            config,
            cancel,
        })
    }

    #[must_use]
    pub fn session(&self) -> &CrawlSession {
        &self.session
    }

    #[must_use]
    pub fn config(&self) -> &CrawlConfig {
        &self.config
    }
}
