#![allow(clippy::unwrap_used)]
// Integration tests for `HttpReferenceSource` using wiremock.

use serde_json::json;
use url::Url;
use wiremock::matchers::{bearer_token, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tagflow_api::{Error, HttpReferenceSource, ReferenceSource};

async fn setup(bearer: Option<&str>) -> (MockServer, HttpReferenceSource) {
    let server = MockServer::start().await;
    let url = Url::parse(&format!("{}/sheets/reference", server.uri())).unwrap();
    let source = HttpReferenceSource::with_client(
        reqwest::Client::new(),
        url,
        bearer.map(|b| secrecy::SecretString::from(b.to_owned())),
    );
    (server, source)
}

#[tokio::test]
async fn test_fetch_tabular_rows() {
    let (server, source) = setup(Some("graph-token")).await;

    Mock::given(method("GET"))
        .and(path("/sheets/reference"))
        .and(bearer_token("graph-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "columns": ["Tag ID", "Description", "Location"],
            "rows": [
                ["FF0001", "Blue pallet", "Dock 1"],
                ["FF0002", "Red pallet", "Dock 2"]
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let table = source.fetch_all().await.unwrap();
    assert_eq!(table.rows.len(), 2);
    assert_eq!(table.column_index("location"), Some(2));
    assert_eq!(table.rows[1][0], "FF0002");
}

#[tokio::test]
async fn test_fetch_failure_is_source_unavailable() {
    let (server, source) = setup(None).await;

    Mock::given(method("GET"))
        .and(path("/sheets/reference"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let result = source.fetch_all().await;
    assert!(
        matches!(result, Err(Error::SourceUnavailable { .. })),
        "expected SourceUnavailable, got: {result:?}"
    );
}
