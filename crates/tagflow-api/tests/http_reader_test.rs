#![allow(clippy::unwrap_used)]
// Integration tests for `HttpReader` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{basic_auth, bearer_token, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tagflow_api::{Credentials, Error, HttpReader, ReaderTransport, SessionToken};

// ── Helpers ─────────────────────────────────────────────────────────

async fn setup() -> (MockServer, HttpReader) {
    let server = MockServer::start().await;
    let base_url = Url::parse(&server.uri()).unwrap();
    let reader = HttpReader::with_client(reqwest::Client::new(), base_url);
    (server, reader)
}

fn admin() -> Credentials {
    Credentials::new("admin", "change-me")
}

// ── Authentication tests ────────────────────────────────────────────

#[tokio::test]
async fn test_login_success() {
    let (server, reader) = setup().await;

    Mock::given(method("GET"))
        .and(path("/cloud/localRestLogin"))
        .and(basic_auth("admin", "change-me"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "message": "tok-123" })))
        .expect(1)
        .mount(&server)
        .await;

    let token = reader.authenticate(&admin()).await.unwrap();
    assert_eq!(token.expose(), "tok-123");
}

#[tokio::test]
async fn test_login_rejected() {
    let (server, reader) = setup().await;

    Mock::given(method("GET"))
        .and(path("/cloud/localRestLogin"))
        .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
        .mount(&server)
        .await;

    let result = reader.authenticate(&admin()).await;
    assert!(
        matches!(result, Err(Error::Rejected { .. })),
        "expected Rejected error, got: {result:?}"
    );
}

#[tokio::test]
async fn test_login_unreachable() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let base_url = Url::parse(&format!("http://127.0.0.1:{port}")).unwrap();
    let reader = HttpReader::with_client(reqwest::Client::new(), base_url);

    let result = reader.authenticate(&admin()).await;
    assert!(
        matches!(result, Err(Error::Unreachable { .. })),
        "expected Unreachable error, got: {result:?}"
    );
}

// ── Start / stop tests ──────────────────────────────────────────────

#[tokio::test]
async fn test_start_sends_bearer_token() {
    let (server, reader) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/cloud/start"))
        .and(bearer_token("tok-123"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    reader.start(&SessionToken::new("tok-123")).await.unwrap();
}

#[tokio::test]
async fn test_start_conflict() {
    let (server, reader) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/cloud/start"))
        .respond_with(ResponseTemplate::new(422).set_body_string("already running"))
        .mount(&server)
        .await;

    let err = reader.start(&SessionToken::new("tok")).await.unwrap_err();
    match err {
        Error::Conflict { ref message } => assert!(message.contains("already running")),
        other => panic!("expected Conflict error, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_start_unauthorized() {
    let (server, reader) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/cloud/start"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = reader.start(&SessionToken::new("expired")).await.unwrap_err();
    assert!(err.is_unauthorized(), "expected Unauthorized, got: {err:?}");
}

#[tokio::test]
async fn test_stop_on_idle_reader_succeeds() {
    let (server, reader) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/cloud/stop"))
        .respond_with(ResponseTemplate::new(409).set_body_string("not running"))
        .mount(&server)
        .await;

    reader.stop(&SessionToken::new("tok")).await.unwrap();
}

#[tokio::test]
async fn test_unexpected_status_is_device_error() {
    let (server, reader) = setup().await;

    Mock::given(method("PUT"))
        .and(path("/cloud/stop"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = reader.stop(&SessionToken::new("tok")).await.unwrap_err();
    assert!(
        matches!(err, Error::Device { status: 500, .. }),
        "expected Device error, got: {err:?}"
    );
}
