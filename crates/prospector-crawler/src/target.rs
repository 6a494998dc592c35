//! The target adapter boundary.
//!
//! Everything the pipeline knows about the concrete map-search service —
//! URL shapes, token formats, markup selectors — lives behind
//! [`TargetAdapter`]. Target-side contracts change outside our control
//! (earlier endpoint generations simply stopped working), so the pipeline
//! logic must never hard-code them.

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use prospector_core::RawProfile;
use regex::Regex;

use crate::error::CrawlError;
use crate::types::SearchQuery;

/// Target-specific request construction and response parsing.
///
/// Implementations must be cheap to share across the worker pool.
pub trait TargetAdapter: Send + Sync + 'static {
    /// The landing document fetched during the session handshake; the
    /// session token is embedded in its body.
    fn landing_url(&self) -> String;

    /// A search-results page for `query` at pagination `offset`.
    fn search_url(&self, query: &SearchQuery, session_token: &str, offset: u32) -> String;

    /// The profile document for one discovered business.
    fn profile_url(&self, external_id: &str) -> String;

    /// How far `offset` advances per results page.
    fn results_per_page(&self) -> u32;

    /// Extracts the session token from the landing document.
    fn parse_session_token(&self, body: &str) -> Result<String, CrawlError>;

    /// Token lifetime advertised by the landing document, if any. When the
    /// target gives no expiry the session assigns a conservative TTL.
    fn token_ttl_hint(&self, body: &str) -> Option<Duration>;

    /// Raw profile link material from one search-results page. An empty list
    /// is a valid page (end of results), not an error.
    fn parse_profile_links(&self, body: &str) -> Result<Vec<String>, CrawlError>;

    /// Normalizes one raw link into the stable external id, or `None` when
    /// the link carries no id.
    fn external_id_from_link(&self, link: &str) -> Option<String>;

    /// Field-by-field parse of a profile document. Individual missing fields
    /// are `None` in the result; only an unrecognizable document is an error.
    fn parse_profile(&self, body: &str) -> Result<RawProfile, CrawlError>;

    /// Whether a 2xx body is actually an anti-automation challenge page.
    fn is_challenge_page(&self, body: &str) -> bool;
}

/// Adapter for the local-services "prolist" search frontend.
///
/// The frontend embeds a session token as `"GLS_SESSION_TOKEN":"…"` in an
/// inline script on the landing document, lists result tiles as
/// `jscontroller="XHXkqb"` divs whose `jsdata` attribute carries the profile
/// id in its second `;`-separated segment, and paginates with an `lci`
/// offset parameter. Profile pages use obfuscated but stable class names
/// per field.
#[derive(Debug, Clone)]
pub struct ProListTarget {
    base_url: String,
}

/// Result tiles per search page on this target.
const RESULTS_PER_PAGE: u32 = 20;

impl ProListTarget {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }
}

impl TargetAdapter for ProListTarget {
    fn landing_url(&self) -> String {
        format!("{}/prolist", self.base_url)
    }

    fn search_url(&self, query: &SearchQuery, session_token: &str, offset: u32) -> String {
        let phrase = query.combined();
        let encoded = utf8_percent_encode(&phrase, NON_ALPHANUMERIC);
        format!(
            "{}/prolist?q={encoded}&session_token={session_token}&lci={offset}",
            self.base_url
        )
    }

    fn profile_url(&self, external_id: &str) -> String {
        format!("{}/profile/{external_id}", self.base_url)
    }

    fn results_per_page(&self) -> u32 {
        RESULTS_PER_PAGE
    }

    fn parse_session_token(&self, body: &str) -> Result<String, CrawlError> {
        let re = Regex::new(r#""GLS_SESSION_TOKEN"\s*:\s*"([^"]+)""#).expect("valid token regex");
        re.captures(body)
            .map(|c| c[1].to_string())
            .ok_or_else(|| CrawlError::Parse {
                context: "landing document".to_string(),
                reason: "no session token in body".to_string(),
            })
    }

    fn token_ttl_hint(&self, body: &str) -> Option<Duration> {
        let re = Regex::new(r#""GLS_TOKEN_TTL_SECS"\s*:\s*(\d+)"#).expect("valid ttl regex");
        let secs = re.captures(body)?[1].parse::<u64>().ok()?;
        Some(Duration::from_secs(secs))
    }

    fn parse_profile_links(&self, body: &str) -> Result<Vec<String>, CrawlError> {
        // A real results page always carries the results container, even
        // when empty. Its absence means we got an interstitial or truncated
        // document — retriable, not end-of-results.
        if !body.contains(r#"id="search-results""#) {
            return Err(CrawlError::Parse {
                context: "search page".to_string(),
                reason: "results container missing".to_string(),
            });
        }
        let re = Regex::new(r#"jscontroller="XHXkqb"[^>]*\bjsdata="([^"]+)""#)
            .expect("valid tile regex");
        Ok(re
            .captures_iter(body)
            .map(|c| c[1].to_string())
            .collect())
    }

    fn external_id_from_link(&self, link: &str) -> Option<String> {
        // jsdata format: "pr;<id>;<index>" — the id is the middle segment.
        let id = link.split(';').nth(1)?.trim();
        if id.is_empty() {
            None
        } else {
            Some(id.to_string())
        }
    }

    fn parse_profile(&self, body: &str) -> Result<RawProfile, CrawlError> {
        let name = class_text(body, "div", "rgnuSb");
        let website = class_text(body, "div", "Gx8NHe");
        let phone = class_text(body, "div", "eigqqc");
        let services = class_text(body, "div", "AQrsxc");
        let address = class_text(body, "div", "hgRN0");
        let rating = class_text(body, "span", "ZjTWef");
        let review_count = class_text(body, "span", "PN9vWe");

        if name.is_none()
            && website.is_none()
            && phone.is_none()
            && address.is_none()
            && rating.is_none()
        {
            return Err(CrawlError::Parse {
                context: "profile page".to_string(),
                reason: "no recognizable profile markup".to_string(),
            });
        }

        Ok(RawProfile {
            name,
            website,
            phone,
            services,
            address,
            rating,
            review_count,
            extra: std::collections::BTreeMap::new(),
        })
    }

    fn is_challenge_page(&self, body: &str) -> bool {
        body.contains(r#"id="captcha-form""#)
            || body.contains("unusual traffic from your computer network")
    }
}

/// Extracts the inner text of the first `tag` element whose class attribute
/// contains `class`. `<br>` becomes a newline; remaining tags are stripped
/// and common entities decoded.
fn class_text(body: &str, tag: &str, class: &str) -> Option<String> {
    let re = Regex::new(&format!(
        r#"(?is)<{tag}[^>]*\bclass="[^"]*\b{class}\b[^"]*"[^>]*>(.*?)</{tag}>"#
    ))
    .expect("valid class regex");
    let inner = re.captures(body)?[1].to_string();
    let text = clean_text(&inner);
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

fn clean_text(fragment: &str) -> String {
    let br = Regex::new(r"(?i)<br\s*/?>").expect("valid br regex");
    let tags = Regex::new(r"(?s)<[^>]+>").expect("valid tags regex");
    let with_breaks = br.replace_all(fragment, "\n");
    let stripped = tags.replace_all(&with_breaks, "");
    stripped
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .trim()
        .to_string()
}

#[cfg(test)]
#[path = "target_test.rs"]
mod tests;
