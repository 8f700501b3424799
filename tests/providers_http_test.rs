use std::collections::HashMap;
use std::time::Duration;

use astral::error::ProviderError;
use astral::search::{BingProvider, DuckDuckGoProvider, SearchProvider, WikipediaProvider};
use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

async fn serve(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral");
    let port = listener.local_addr().expect("local addr").port();
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (format!("http://127.0.0.1:{port}"), handle)
}

async fn fake_bing(headers: HeaderMap, Query(params): Query<HashMap<String, String>>) -> impl IntoResponse {
    if headers.get("Ocp-Apim-Subscription-Key").and_then(|v| v.to_str().ok()) != Some("bing-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "error": "bad key" })));
    }
    let q = params.get("q").cloned().unwrap_or_default();
    (
        StatusCode::OK,
        Json(json!({
            "webPages": { "value": [
                { "url": "https://react.dev/blog", "snippet": format!("results for {q}") },
                { "url": "https://github.com/facebook/react/releases", "snippet": "Releases" }
            ]}
        })),
    )
}

async fn fake_ddg(Query(params): Query<HashMap<String, String>>) -> Html<String> {
    let q = params.get("q").cloned().unwrap_or_default();
    Html(format!(
        r#"<html><body>
        <div class="result">
          <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fdocs.rs%2Ftokio">tokio docs</a>
          <a class="result__snippet">Docs for {q}</a>
        </div>
        </body></html>"#
    ))
}

async fn fake_wiki(Query(params): Query<HashMap<String, String>>) -> Json<serde_json::Value> {
    if params.get("list").map(String::as_str) == Some("search") {
        return Json(json!({
            "query": { "search": [
                { "title": "Tokio", "pageid": 100, "snippet": "<span class=\"searchmatch\">Tokio</span> runtime" },
                { "title": "Broken", "pageid": 200, "snippet": "fallback <b>snippet</b>" }
            ]}
        }));
    }
    match params.get("pageids").map(String::as_str) {
        Some("100") => Json(json!({
            "query": { "pages": { "100": { "pageid": 100, "extract": "Tokio is an async runtime." } } }
        })),
        _ => Json(json!({ "query": { "pages": {} } })),
    }
}

#[tokio::test]
async fn bing_sends_key_and_parses_pages() {
    let (base, server) = serve(Router::new().route("/search", get(fake_bing))).await;

    let provider = BingProvider::new("bing-key", Duration::from_secs(5))
        .expect("bing client")
        .with_endpoint(format!("{base}/search"));
    let results = provider.search("react 19", 4).await.expect("bing results");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].url, "https://react.dev/blog");
    assert_eq!(results[0].excerpt, "results for react 19");

    server.abort();
}

#[tokio::test]
async fn bing_rejection_is_status_error() {
    let (base, server) = serve(Router::new().route("/search", get(fake_bing))).await;

    let provider = BingProvider::new("wrong", Duration::from_secs(5))
        .expect("bing client")
        .with_endpoint(format!("{base}/search"));
    let err = provider.search("react", 4).await.unwrap_err();
    assert!(matches!(err, ProviderError::Status { status: 401, .. }));

    server.abort();
}

#[tokio::test]
async fn duckduckgo_encodes_query_and_decodes_redirects() {
    let (base, server) = serve(Router::new().route("/html/", get(fake_ddg))).await;

    let provider = DuckDuckGoProvider::new(Duration::from_secs(5))
        .expect("ddg client")
        .with_endpoint(format!("{base}/html/"));
    let results = provider.search("tokio & axum", 4).await.expect("ddg results");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "https://docs.rs/tokio");
    assert_eq!(results[0].excerpt, "Docs for tokio & axum");

    server.abort();
}

#[tokio::test]
async fn wikipedia_uses_extracts_and_falls_back_to_snippets() {
    let (base, server) = serve(Router::new().route("/w/api.php", get(fake_wiki))).await;

    let provider = WikipediaProvider::new(Duration::from_secs(5))
        .expect("wiki client")
        .with_api(format!("{base}/w/api.php"));
    let results = provider.search("tokio", 2).await.expect("wiki results");

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].url, "https://en.wikipedia.org/?curid=100");
    assert_eq!(results[0].excerpt, "Tokio is an async runtime.");
    assert_eq!(results[1].url, "https://en.wikipedia.org/?curid=200");
    assert_eq!(results[1].excerpt, "fallback snippet");

    server.abort();
}

#[tokio::test]
async fn unreachable_provider_is_a_transport_error() {
    let port = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind ephemeral");
        listener.local_addr().expect("local addr").port()
    };

    let provider = DuckDuckGoProvider::new(Duration::from_millis(500))
        .expect("ddg client")
        .with_endpoint(format!("http://127.0.0.1:{port}/html/"));
    let err = provider.search("anything", 4).await.unwrap_err();
    assert!(matches!(
        err,
        ProviderError::Http { .. } | ProviderError::Timeout { .. }
    ));
}

#[tokio::test]
async fn slow_backend_hits_the_configured_timeout() {
    async fn stall() -> Html<&'static str> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Html("<html></html>")
    }
    let (base, server) = serve(Router::new().route("/html/", get(stall))).await;

    let provider = DuckDuckGoProvider::new(Duration::from_millis(200))
        .expect("ddg client")
        .with_endpoint(format!("{base}/html/"));
    let started = std::time::Instant::now();
    let err = provider.search("anything", 4).await.unwrap_err();

    assert!(matches!(err, ProviderError::Timeout { provider: "duckduckgo" }));
    assert!(started.elapsed() < Duration::from_secs(3));

    server.abort();
}
