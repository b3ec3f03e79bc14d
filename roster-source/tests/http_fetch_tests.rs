//! `HttpPageFetcher` and `ApiLoader` against a mock directory API.
//!
//! ureq is blocking, so fetches run on `spawn_blocking` while the mock
//! server keeps the async runtime.

use roster_core::config::SourceConfig;
use roster_core::Normalizer;
use roster_source::{fetch_all, ApiLoader, HttpPageFetcher, PageFetcher, SnapshotLoader, SourceError};
use serde_json::{json, Value};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// =============================================================================
// Test Helpers
// =============================================================================

fn fetcher(server: &MockServer, token: Option<&str>) -> HttpPageFetcher {
    let config = SourceConfig {
        url: Some(format!("{}/api/employees/search", server.uri())),
        ..SourceConfig::default()
    };
    HttpPageFetcher::new(&config, token).expect("fetcher")
}

fn page(rows: Value, total: u64) -> Value {
    json!({ "status": 200, "message": "ok", "data": { "rows": rows, "total": total } })
}

async fn mount_page(server: &MockServer, index: u32, body: Value) {
    Mock::given(method("POST"))
        .and(path("/api/employees/search"))
        .and(body_partial_json(json!({ "pageIndex": index })))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

async fn blocking<T, F>(f: F) -> T
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.expect("blocking task")
}

// =============================================================================
// fetch_page
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn posts_payload_with_token_and_page_index() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/employees/search"))
        .and(header("authorization", "token-123"))
        .and(body_partial_json(json!({ "pageIndex": 3, "isWork": true })))
        .respond_with(ResponseTemplate::new(200).set_body_json(page(json!([]), 0)))
        .expect(1)
        .mount(&server)
        .await;

    let fetcher = fetcher(&server, Some("token-123"));
    let envelope = blocking(move || fetcher.fetch_page(3)).await.expect("page");
    envelope.check_status().expect("status 200");
    assert!(envelope.rows().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn http_error_status_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let fetcher = fetcher(&server, None);
    let err = blocking(move || fetcher.fetch_page(0)).await.unwrap_err();
    assert!(matches!(err, SourceError::HttpStatus { status: 502, .. }), "got: {err}");
}

#[tokio::test(flavor = "multi_thread")]
async fn non_json_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>login</html>"))
        .mount(&server)
        .await;

    let fetcher = fetcher(&server, None);
    let err = blocking(move || fetcher.fetch_page(0)).await.unwrap_err();
    assert!(matches!(err, SourceError::Decode { page: 0, .. }), "got: {err}");
}

// =============================================================================
// Pagination over HTTP
// =============================================================================

#[tokio::test(flavor = "multi_thread")]
async fn stops_when_reported_total_is_reached() {
    let server = MockServer::start().await;
    mount_page(&server, 0, page(json!([{ "empId": "1" }, { "empId": "2" }]), 3)).await;
    mount_page(&server, 1, page(json!([{ "empId": "3" }]), 3)).await;

    let fetcher = fetcher(&server, None);
    let fetched = blocking(move || fetch_all(&fetcher, None, 100)).await.expect("fetch");
    assert_eq!(fetched.rows.len(), 3);
    assert_eq!(fetched.pages, 2);
    assert_eq!(fetched.reported_total, Some(3));
}

#[tokio::test(flavor = "multi_thread")]
async fn api_loader_normalizes_live_rows() {
    let server = MockServer::start().await;
    mount_page(
        &server,
        0,
        page(
            json!([
                { "empId": "E1", "cName": "Ann", "cmpEntDte": "2019-07-01T00:00:00", "ofcExt": "" },
                { "cName": "no id" }
            ]),
            2,
        ),
    )
    .await;
    mount_page(&server, 1, page(json!([]), 2)).await;

    let loader = ApiLoader::new(fetcher(&server, None), Normalizer::default(), 100);
    let snapshot = blocking(move || loader.load()).await.expect("snapshot");
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot.rejected().len(), 1);
    let record = &snapshot.records()[0];
    assert_eq!(record.get("cmp_ent_dte").and_then(|v| v.as_text()), Some("2019-07-01"));
    assert!(record.get("ofc_ext").is_some_and(|v| v.is_null()));
}
