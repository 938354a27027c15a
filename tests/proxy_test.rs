//! Proxy Router Tests
//!
//! Direct-then-proxy routing against a mock upstream and a mock proxy.

use mockito::{Matcher, Server};
use animestream::api::{ProxyList, ProxyRouter, Route};
use animestream::StreamError;

fn router_for(proxy_base: &str) -> ProxyRouter {
    ProxyRouter::new(
        reqwest::Client::new(),
        ProxyList::parse(&format!("{}/proxy?url=", proxy_base)).unwrap(),
    )
}

// =============================================================================
// Direct Path
// =============================================================================

/// Test: A successful direct call never touches a proxy
#[tokio::test]
async fn test_direct_success_skips_proxy() {
    let mut server = Server::new_async().await;

    let direct = server
        .mock("GET", "/api/v2/hianime/home")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"data":{"ok":true}}"#)
        .create_async()
        .await;
    let proxy = server
        .mock("GET", "/proxy")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let router = router_for(&server.url());
    let routed = router
        .route(&format!("{}/api/v2/hianime/home", server.url()))
        .await
        .unwrap();

    assert_eq!(routed.route, Route::Direct);
    assert_eq!(routed.body, r#"{"data":{"ok":true}}"#);
    direct.assert_async().await;
    proxy.assert_async().await;
}

/// Test: Non-transient statuses fail immediately without a proxy attempt
#[tokio::test]
async fn test_not_found_is_not_retried() {
    let mut server = Server::new_async().await;

    let _direct = server
        .mock("GET", "/missing")
        .match_query(Matcher::Any)
        .with_status(404)
        .create_async()
        .await;
    let proxy = server
        .mock("GET", "/proxy")
        .match_query(Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let err = router_for(&server.url())
        .route(&format!("{}/missing", server.url()))
        .await
        .unwrap_err();

    match err {
        StreamError::Transport { reason, .. } => assert!(reason.contains("404")),
        other => panic!("expected transport error, got {:?}", other),
    }
    proxy.assert_async().await;
}

// =============================================================================
// Proxy Fallback
// =============================================================================

/// Test: A 5xx direct response falls back to exactly one proxied attempt
#[tokio::test]
async fn test_server_error_falls_back_once() {
    let mut server = Server::new_async().await;
    let target = format!("{}/api/v2/hianime/home", server.url());

    let direct = server
        .mock("GET", "/api/v2/hianime/home")
        .match_query(Matcher::Any)
        .with_status(503)
        .expect(1)
        .create_async()
        .await;
    let proxy = server
        .mock("GET", "/proxy")
        .match_query(Matcher::UrlEncoded("url".into(), target.clone()))
        .with_status(200)
        .with_body(r#"{"data":{"via":"proxy"}}"#)
        .expect(1)
        .create_async()
        .await;

    let routed = router_for(&server.url()).route(&target).await.unwrap();

    assert!(matches!(routed.route, Route::Proxy(_)));
    assert_eq!(routed.body, r#"{"data":{"via":"proxy"}}"#);
    direct.assert_async().await;
    proxy.assert_async().await;
}

/// Test: Proxy `{contents: "..."}` envelopes are unwrapped
#[tokio::test]
async fn test_proxy_envelope_is_unwrapped() {
    let mut server = Server::new_async().await;
    let target = format!("{}/blocked", server.url());

    let _direct = server
        .mock("GET", "/blocked")
        .match_query(Matcher::Any)
        .with_status(403)
        .create_async()
        .await;
    let _proxy = server
        .mock("GET", "/proxy")
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"contents":"{\"data\":[1,2,3]}","status":{"http_code":200}}"#)
        .create_async()
        .await;

    let routed = router_for(&server.url()).route(&target).await.unwrap();
    assert_eq!(routed.body, r#"{"data":[1,2,3]}"#);
}

/// Test: Network-level failure on the direct path falls back to the proxy
#[tokio::test]
async fn test_connection_refused_falls_back() {
    let mut proxy_server = Server::new_async().await;
    let target = "http://127.0.0.1:9/api/v2/hianime/home";

    let proxy = proxy_server
        .mock("GET", "/proxy")
        .match_query(Matcher::UrlEncoded("url".into(), target.into()))
        .with_status(200)
        .with_body(r#"{"data":{}}"#)
        .expect(1)
        .create_async()
        .await;

    let routed = router_for(&proxy_server.url()).route(target).await.unwrap();
    assert!(matches!(routed.route, Route::Proxy(_)));
    proxy.assert_async().await;
}

/// Test: Both attempts failing yields one transport error naming both
#[tokio::test]
async fn test_both_attempts_fail() {
    let mut server = Server::new_async().await;
    let target = format!("{}/flaky", server.url());

    let _direct = server
        .mock("GET", "/flaky")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;
    let proxy = server
        .mock("GET", "/proxy")
        .match_query(Matcher::Any)
        .with_status(502)
        .expect(1)
        .create_async()
        .await;

    let err = router_for(&server.url()).route(&target).await.unwrap_err();
    match err {
        StreamError::Transport { url, reason } => {
            assert_eq!(url, target);
            assert!(reason.contains("direct: HTTP 500"));
            assert!(reason.contains("proxy: HTTP 502"));
        }
        other => panic!("expected transport error, got {:?}", other),
    }
    proxy.assert_async().await;
}
