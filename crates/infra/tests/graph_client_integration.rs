//! Integration tests for the Graph client against a mock provider
//!
//! **Coverage:**
//! - Cursor pagination across three pages, lazily and collected
//! - Circuit breaker opening after repeated failures
//! - Local rate limiting and usage-header feedback
//! - Batch requests (form body, null slots, size limit)
//! - Provider error code mapping and per-call timeouts

#![allow(dead_code)]

#[path = "support.rs"]
mod support;

use std::time::Duration;

use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use warroom_common::resilience::CircuitState;
use warroom_domain::{AccessToken, BatchRequest, GraphError, RequestOptions, DEFAULT_SESSION};
use warroom_infra::graph::limiter_key;
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Deserialize, PartialEq)]
struct Campaign {
    id: String,
}

fn page(server: &MockServer, ids: &[&str], after: Option<&str>) -> serde_json::Value {
    let data: Vec<_> = ids.iter().map(|id| json!({ "id": id })).collect();
    match after {
        Some(cursor) => json!({
            "data": data,
            "paging": {
                "cursors": { "after": cursor },
                "next": format!("{}/v21.0/act_1/campaigns?limit=2&after={cursor}", server.uri()),
            }
        }),
        None => json!({ "data": data, "paging": { "cursors": {} } }),
    }
}

async fn mount_pages(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v21.0/act_1/campaigns"))
        .and(query_param("fields", "id"))
        .and(query_param("access_token", support::TOKEN))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(server, &["1", "2"], Some("c1"))),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v21.0/act_1/campaigns"))
        .and(query_param("after", "c1"))
        .and(query_param("access_token", support::TOKEN))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(server, &["3", "4"], Some("c2"))),
        )
        .expect(1)
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v21.0/act_1/campaigns"))
        .and(query_param("after", "c2"))
        .and(query_param("access_token", support::TOKEN))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(server, &["5"], None)))
        .expect(1)
        .mount(server)
        .await;
}

/// Walks three pages, appending the token to each `paging.next` URL.
///
/// # Test Steps
/// 1. Mount three pages chained through `paging.next`
/// 2. Collect every item with `paginate_all`
/// 3. Verify each page was fetched once and items keep their order
#[tokio::test]
async fn test_paginate_all_follows_next_links() {
    let server = MockServer::start().await;
    mount_pages(&server).await;
    let client = support::graph_client(&server);

    let campaigns: Vec<Campaign> = client
        .paginate_all(
            "act_1/campaigns",
            RequestOptions::get().param("fields", "id").token(support::TOKEN),
        )
        .await
        .expect("all pages load");

    let ids: Vec<&str> = campaigns.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2", "3", "4", "5"]);

    // Three calls were charged against the token's bucket.
    let usage = client.rate_limiter().usage_stats(&limiter_key(support::TOKEN));
    assert_eq!(usage.requests_in_window, 3);
    assert_eq!(usage.successful_calls, 3);
}

#[tokio::test]
async fn test_paginate_stream_yields_pages_lazily() {
    let server = MockServer::start().await;
    mount_pages(&server).await;
    let client = support::graph_client(&server);
    client.token_manager().cache_token(DEFAULT_SESSION, AccessToken::bearer(support::TOKEN));

    let pages: Vec<_> = client
        .paginate::<Campaign>("act_1/campaigns", RequestOptions::get().param("fields", "id"))
        .collect()
        .await;

    assert_eq!(pages.len(), 3);
    let sizes: Vec<usize> =
        pages.into_iter().map(|p| p.expect("page loads").data.len()).collect();
    assert_eq!(sizes, vec![2, 2, 1]);
}

/// A failing page ends the stream after yielding the error.
///
/// # Test Steps
/// 1. Serve page one, then a 500 for the second page
/// 2. Collect the stream
/// 3. Verify one page, one error, and no further requests
#[tokio::test]
async fn test_paginate_stops_after_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v21.0/act_1/campaigns"))
        .and(query_param("fields", "id"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(page(&server, &["1", "2"], Some("c1"))),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v21.0/act_1/campaigns"))
        .and(query_param("after", "c1"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "An unknown error occurred", "code": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = support::graph_client(&server);
    let results: Vec<_> = client
        .paginate::<Campaign>(
            "act_1/campaigns",
            RequestOptions::get().param("fields", "id").token(support::TOKEN),
        )
        .collect()
        .await;

    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(GraphError::Api { code: 1, .. })));
}

/// Repeated failures open the circuit and later calls never reach the wire.
///
/// # Test Steps
/// 1. Serve 500s for every call
/// 2. Make five failing calls (the default threshold)
/// 3. Verify the sixth call is rejected locally with `CircuitOpen`
#[tokio::test]
async fn test_circuit_opens_after_repeated_failures() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v21.0/me"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(5)
        .mount(&server)
        .await;

    let client = support::graph_client(&server);
    let options = || RequestOptions::get().token(support::TOKEN);

    for _ in 0..5 {
        let result = client.request::<serde_json::Value>("me", options()).await;
        assert!(matches!(result, Err(GraphError::Api { code: 500, .. })));
    }
    assert_eq!(client.circuit_breaker().state(), CircuitState::Open);

    let rejected = client.request::<serde_json::Value>("me", options()).await;
    assert!(matches!(rejected, Err(GraphError::CircuitOpen { .. })));

    let health = client.health_status();
    assert_eq!(health.circuit_breaker.state, CircuitState::Open);
    assert_eq!(health.circuit_breaker.total_failures, 5);
    assert_eq!(health.circuit_breaker.rejected_calls, 1);
}

#[tokio::test]
async fn test_local_rate_limit_rejects_before_sending() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v21.0/me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "42" })))
        .expect(2)
        .mount(&server)
        .await;

    let client = support::tuned_client(&server, 2, 5);
    let options = || RequestOptions::get().token(support::TOKEN);

    for _ in 0..2 {
        client.request::<serde_json::Value>("me", options()).await.expect("within quota");
    }

    let denied = client.request::<serde_json::Value>("me", options()).await;
    match denied {
        Err(GraphError::RateLimit { retry_after_ms: Some(ms), .. }) => assert!(ms > 0),
        other => panic!("expected local rate limit, got {other:?}"),
    }

    // A different token has its own bucket.
    let other = client.rate_limiter().usage_stats(&limiter_key("EAAB-other"));
    assert_eq!(other.percentage_used, 0);
}

/// Provider usage headers overwrite the local bucket.
///
/// # Test Steps
/// 1. Respond with `x-app-usage` reporting 50% call count
/// 2. Verify the bucket reports half its capacity used
#[tokio::test]
async fn test_usage_headers_sync_limiter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v21.0/me"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header(
                    "x-app-usage",
                    r#"{"call_count":50,"total_time":10,"total_cputime":5}"#,
                )
                .set_body_json(json!({ "id": "42" })),
        )
        .mount(&server)
        .await;

    let client = support::tuned_client(&server, 100, 5);
    client
        .request::<serde_json::Value>("me", RequestOptions::get().token(support::TOKEN))
        .await
        .expect("request succeeds");

    let usage = client.rate_limiter().usage_stats(&limiter_key(support::TOKEN));
    assert_eq!(usage.percentage_used, 50);
}

/// Sends a batch as a form body and keeps null slots.
///
/// # Test Steps
/// 1. Mount the batch endpoint returning one response and one null slot
/// 2. Send two sub-requests
/// 3. Verify the decoded slots and that the batch was charged once
#[tokio::test]
async fn test_batch_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v21.0/"))
        .and(body_string_contains(format!("access_token={}", support::TOKEN)))
        .and(body_string_contains("batch="))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "code": 200, "headers": [], "body": "{\"id\":\"1\"}" },
            null
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let client = support::graph_client(&server);
    let requests = vec![BatchRequest::get("me"), BatchRequest::get("act_1/campaigns?limit=5")];

    let responses = client
        .batch_request(&requests, Some(support::TOKEN), None)
        .await
        .expect("batch succeeds");

    assert_eq!(responses.len(), 2);
    let first = responses[0].as_ref().expect("first slot answered");
    assert!(first.is_success());
    assert_eq!(first.json::<Campaign>().expect("body decodes"), Campaign { id: "1".into() });
    assert!(responses[1].is_none());

    let usage = client.rate_limiter().usage_stats(&limiter_key(support::TOKEN));
    assert_eq!(usage.requests_in_window, 1);
    assert!(usage.tokens_remaining < 198.5);
}

#[tokio::test]
async fn test_batch_rejects_invalid_sizes_locally() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let client = support::graph_client(&server);
    let oversized: Vec<_> = (0..51).map(|i| BatchRequest::get(format!("{i}"))).collect();

    assert!(matches!(
        client.batch_request(&oversized, Some(support::TOKEN), None).await,
        Err(GraphError::Validation(_))
    ));
    assert!(matches!(
        client.batch_request(&[], Some(support::TOKEN), None).await,
        Err(GraphError::Validation(_))
    ));

    let usage = client.rate_limiter().usage_stats(&limiter_key(support::TOKEN));
    assert_eq!(usage.requests_in_window, 0);
}

/// Maps provider error codes onto the error taxonomy.
///
/// # Test Steps
/// 1. Mount endpoints returning codes 100, 17 and 190
/// 2. Verify `Validation`, `RateLimit` (minutes as ms) and `Authentication`
#[tokio::test]
async fn test_provider_error_mapping() {
    let server = MockServer::start().await;
    let cases = [
        ("/v21.0/invalid", 400, json!({ "message": "Invalid parameter", "code": 100 })),
        (
            "/v21.0/throttled",
            400,
            json!({
                "message": "User request limit reached",
                "code": 17,
                "error_data": { "estimated_time_to_regain_access": 2 }
            }),
        ),
        ("/v21.0/expired", 401, json!({ "message": "Session has expired", "code": 190 })),
    ];
    for (route, status, error) in cases {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(ResponseTemplate::new(status).set_body_json(json!({ "error": error })))
            .mount(&server)
            .await;
    }

    let client = support::graph_client(&server);
    let call = |endpoint: &'static str| {
        let client = client.clone();
        async move {
            client
                .request::<serde_json::Value>(endpoint, RequestOptions::get().token(support::TOKEN))
                .await
        }
    };

    assert_eq!(call("invalid").await, Err(GraphError::Validation("Invalid parameter".into())));
    assert_eq!(
        call("throttled").await,
        Err(GraphError::RateLimit {
            message: "User request limit reached".into(),
            retry_after_ms: Some(120_000),
        })
    );
    assert!(matches!(call("expired").await, Err(GraphError::Authentication(_))));
}

#[tokio::test]
async fn test_per_call_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v21.0/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(2))
                .set_body_json(json!({ "id": "late" })),
        )
        .mount(&server)
        .await;

    let client = support::graph_client(&server);
    let result = client
        .request::<serde_json::Value>(
            "slow",
            RequestOptions::get().token(support::TOKEN).timeout(Duration::from_millis(100)),
        )
        .await;

    assert!(matches!(result, Err(GraphError::Timeout { timeout_ms: 100 })));
}

#[tokio::test]
async fn test_batch_per_call_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v21.0/"))
        .respond_with(
            ResponseTemplate::new(200).set_delay(Duration::from_secs(2)).set_body_json(json!([])),
        )
        .mount(&server)
        .await;

    let client = support::graph_client(&server);
    let result = client
        .batch_request(
            &[BatchRequest::get("me")],
            Some(support::TOKEN),
            Some(Duration::from_millis(100)),
        )
        .await;

    assert!(matches!(result, Err(GraphError::Timeout { timeout_ms: 100 })));
}

/// A `paging.next` URL on another host is never followed.
///
/// # Test Steps
/// 1. Serve a first page whose `next` link points at a foreign host
/// 2. Collect the stream
/// 3. Verify the first page, then a `Validation` error, with one call charged
#[tokio::test]
async fn test_paginate_refuses_foreign_next_host() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v21.0/act_1/campaigns"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "id": "1" }],
            "paging": {
                "cursors": { "after": "c1" },
                "next": "https://attacker.example/v21.0/act_1/campaigns?after=c1",
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = support::graph_client(&server);
    let pages: Vec<_> = client
        .paginate::<Campaign>("act_1/campaigns", RequestOptions::get().token(support::TOKEN))
        .collect()
        .await;

    assert_eq!(pages.len(), 2);
    assert!(pages[0].is_ok());
    assert!(matches!(pages[1], Err(GraphError::Validation(_))));

    let usage = client.rate_limiter().usage_stats(&limiter_key(support::TOKEN));
    assert_eq!(usage.requests_in_window, 1);
}

#[tokio::test]
async fn test_request_without_token_is_not_sent() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let client = support::graph_client(&server);
    let result = client.request::<serde_json::Value>("me", RequestOptions::get()).await;

    assert!(matches!(result, Err(GraphError::Authentication(_))));
    assert!(!client.health_status().authenticated);
}
