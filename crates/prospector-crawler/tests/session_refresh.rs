//! Session refresh semantics against a local `wiremock` server.
//!
//! The contract under test: concurrent workers reporting a block against
//! the same token generation trigger exactly one handshake, and a worker
//! reporting a stale generation gets the current tokens without any
//! network traffic.

use std::sync::Arc;
use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use prospector_crawler::identity::IdentityPool;
use prospector_crawler::session::{CrawlSession, TokenExtractor};
use prospector_crawler::ProListTarget;

fn landing_body(token: &str) -> String {
    format!(
        r#"<html><head><script>window.APP_STATE = {{"GLS_SESSION_TOKEN":"{token}"}};</script></head><body></body></html>"#
    )
}

fn extractor(server: &MockServer) -> TokenExtractor<ProListTarget> {
    TokenExtractor::new(
        reqwest::Client::new(),
        Arc::new(ProListTarget::new(server.uri())),
        Duration::from_secs(600),
    )
}

#[tokio::test]
async fn concurrent_block_reports_trigger_one_handshake() {
    let server = MockServer::start().await;

    // One initial acquisition plus exactly one refresh, no matter how many
    // workers report the block.
    Mock::given(method("GET"))
        .and(path("/prolist"))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_body("tok")))
        .expect(2)
        .mount(&server)
        .await;

    let extractor = extractor(&server);
    let session = Arc::new(CrawlSession::new(IdentityPool::new()));

    let initial = session.current(&extractor).await.expect("handshake");
    let observed = initial.generation;

    let mut handles = Vec::new();
    for _ in 0..4 {
        let session = Arc::clone(&session);
        let extractor = TokenExtractor::new(
            reqwest::Client::new(),
            Arc::new(ProListTarget::new(server.uri())),
            Duration::from_secs(600),
        );
        handles.push(tokio::spawn(async move {
            session
                .refresh_after_block(observed, &extractor)
                .await
                .expect("refresh")
        }));
    }

    let mut generations = Vec::new();
    for handle in handles {
        generations.push(handle.await.expect("task").generation);
    }

    // All workers resumed on the same refreshed generation.
    assert!(
        generations.iter().all(|&g| g == observed + 1),
        "expected every worker on generation {}, got {generations:?}",
        observed + 1
    );
    server.verify().await;
}

#[tokio::test]
async fn stale_generation_report_skips_the_handshake() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/prolist"))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_body("tok")))
        .expect(2)
        .mount(&server)
        .await;

    let extractor = extractor(&server);
    let session = CrawlSession::new(IdentityPool::new());

    let initial = session.current(&extractor).await.expect("handshake");
    let refreshed = session
        .refresh_after_block(initial.generation, &extractor)
        .await
        .expect("refresh");
    assert_eq!(refreshed.generation, initial.generation + 1);

    // A late report against the already-replaced generation must not cost a
    // third handshake.
    let late = session
        .refresh_after_block(initial.generation, &extractor)
        .await
        .expect("late report");
    assert_eq!(late.generation, refreshed.generation);
    server.verify().await;
}

#[tokio::test]
async fn current_reacquires_expired_tokens() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/prolist"))
        .respond_with(ResponseTemplate::new(200).set_body_string(landing_body("tok")))
        .expect(2)
        .mount(&server)
        .await;

    // Zero TTL: tokens expire immediately, so the second `current` must
    // re-acquire instead of reusing them.
    let extractor = TokenExtractor::new(
        reqwest::Client::new(),
        Arc::new(ProListTarget::new(server.uri())),
        Duration::ZERO,
    );
    let session = CrawlSession::new(IdentityPool::new());

    let first = session.current(&extractor).await.expect("handshake");
    let second = session.current(&extractor).await.expect("re-acquisition");
    assert_eq!(second.generation, first.generation + 1);
    server.verify().await;
}
