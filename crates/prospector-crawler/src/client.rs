//! Shared HTTP plumbing: client construction and classified document fetch.

use std::time::Duration;

use reqwest::Client;

use crate::error::CrawlError;
use crate::target::TargetAdapter;
use crate::types::CrawlConfig;

/// Builds the shared `reqwest::Client` for one crawl.
///
/// No default user-agent is set — every request carries the full header set
/// of the session's current [`crate::identity::Identity`].
///
/// # Errors
///
/// Returns [`CrawlError::Http`] if the client cannot be constructed
/// (e.g., invalid TLS config).
pub(crate) fn build_http_client(config: &CrawlConfig) -> Result<Client, CrawlError> {
    Client::builder()
        .timeout(config.request_timeout)
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(CrawlError::from)
}

/// Fetches a document with the given identity headers and optional cookie
/// blob, classifying the response.
///
/// # Errors
///
/// - [`CrawlError::Blocked`] — HTTP 403, or a 2xx body that is a challenge
///   page per [`TargetAdapter::is_challenge_page`].
/// - [`CrawlError::RateLimited`] — HTTP 429 (`Retry-After` honored when
///   parseable, else 60 s).
/// - [`CrawlError::UnexpectedStatus`] — any other non-2xx status.
/// - [`CrawlError::Http`] — network or TLS failure.
pub(crate) async fn fetch_document<A: TargetAdapter>(
    client: &Client,
    adapter: &A,
    url: &str,
    headers: &[(&'static str, String)],
    cookie_header: Option<&str>,
) -> Result<String, CrawlError> {
    let (_, body) = fetch_document_full(client, adapter, url, headers, cookie_header).await?;
    Ok(body)
}

/// Like [`fetch_document`], but also returns the response headers — the
/// session handshake needs them for `Set-Cookie` material.
pub(crate) async fn fetch_document_full<A: TargetAdapter>(
    client: &Client,
    adapter: &A,
    url: &str,
    headers: &[(&'static str, String)],
    cookie_header: Option<&str>,
) -> Result<(reqwest::header::HeaderMap, String), CrawlError> {
    let mut request = client.get(url);
    for (name, value) in headers {
        request = request.header(*name, value);
    }
    if let Some(cookie) = cookie_header {
        request = request.header(reqwest::header::COOKIE, cookie);
    }

    let response = request.send().await?;
    let status = response.status();

    if status == reqwest::StatusCode::FORBIDDEN {
        return Err(CrawlError::Blocked {
            url: url.to_string(),
            reason: "HTTP 403".to_string(),
        });
    }

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(60);
        return Err(CrawlError::RateLimited {
            url: url.to_string(),
            retry_after_secs,
        });
    }

    if !status.is_success() {
        return Err(CrawlError::UnexpectedStatus {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let response_headers = response.headers().clone();
    let body = response.text().await?;
    if adapter.is_challenge_page(&body) {
        return Err(CrawlError::Blocked {
            url: url.to_string(),
            reason: "challenge page served".to_string(),
        });
    }

    Ok((response_headers, body))
}

/// Folds `Set-Cookie` response headers into a single `Cookie` request value
/// (name=value pairs only, attributes dropped).
pub(crate) fn collect_cookie_header(headers: &reqwest::header::HeaderMap) -> Option<String> {
    let pairs: Vec<String> = headers
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|raw| raw.split(';').next())
        .map(str::trim)
        .filter(|pair| pair.contains('='))
        .map(str::to_string)
        .collect();
    if pairs.is_empty() {
        None
    } else {
        Some(pairs.join("; "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderMap, HeaderValue, SET_COOKIE};

    #[test]
    fn collects_cookie_pairs_dropping_attributes() {
        let mut headers = HeaderMap::new();
        headers.append(
            SET_COOKIE,
            HeaderValue::from_static("NID=511=abc; expires=Sat; Path=/; HttpOnly"),
        );
        headers.append(SET_COOKIE, HeaderValue::from_static("CONSENT=YES+1; Path=/"));
        assert_eq!(
            collect_cookie_header(&headers).as_deref(),
            Some("NID=511=abc; CONSENT=YES+1")
        );
    }

    #[test]
    fn no_cookies_yields_none() {
        assert!(collect_cookie_header(&HeaderMap::new()).is_none());
    }
}
