//! reqwest transport against a mock engine

use mockito::Matcher;
use presto_config::DataSourceConfig;
use presto_data::{Credentials, EngineRequest, HttpTransport, PrestoDatasource, Transport};
use presto_shared::PrestoError;
use serde_json::json;

#[tokio::test]
async fn test_query_post_carries_body_and_credentials() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("u".into(), "grafana".into()),
            Matcher::UrlEncoded("p".into(), "secret".into()),
        ]))
        .match_body("query=show tables;&db=presto")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"[{"columns":["schema","table"],"points":[["s","cpu"]]}]"#)
        .create_async()
        .await;

    let transport = HttpTransport::new(Credentials {
        username: Some("grafana".to_string()),
        password: Some("secret".to_string()),
        key: None,
    });
    let body = transport
        .send(&server.url(), &EngineRequest::query("show tables", "presto"))
        .await
        .unwrap();

    mock.assert_async().await;
    assert_eq!(body[0]["points"][0][1], "cpu");
}

#[tokio::test]
async fn test_series_write_is_json() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/series")
        .match_header("content-type", "application/json")
        .match_body(Matcher::Json(json!([{ "name": "t", "columns": [], "points": [] }])))
        .with_status(200)
        .create_async()
        .await;

    let transport = HttpTransport::new(Credentials::default());
    let body = transport
        .send(
            &server.url(),
            &EngineRequest::write_series(json!([{ "name": "t", "columns": [], "points": [] }])),
        )
        .await
        .unwrap();

    mock.assert_async().await;
    assert!(body.is_null());
}

#[tokio::test]
async fn test_error_status_is_reported() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("POST", "/")
        .with_status(404)
        .with_body("Table cpu does not exist")
        .create_async()
        .await;

    let transport = HttpTransport::new(Credentials::default());
    let failure = transport
        .send(&server.url(), &EngineRequest::query("select 1", "presto"))
        .await
        .unwrap_err();

    assert_eq!(failure.status, 404);
    assert_eq!(failure.body, "Table cpu does not exist");
}

#[tokio::test]
async fn test_unreachable_endpoint_is_status_zero() {
    let transport = HttpTransport::new(Credentials::default());
    let failure = transport
        .send("http://127.0.0.1:1", &EngineRequest::query("select 1", "presto"))
        .await
        .unwrap_err();

    assert_eq!(failure.status, 0);
}

#[tokio::test]
async fn test_datasource_over_http_surfaces_engine_errors() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/")
        .with_status(500)
        .with_body("syntax error")
        .expect(1)
        .create_async()
        .await;

    let config = DataSourceConfig {
        urls: vec![server.url()],
        ..Default::default()
    };
    let datasource = PrestoDatasource::connect(config).unwrap();

    let err = datasource.list_series().await.unwrap_err();
    mock.assert_async().await;
    assert_eq!(err.to_string(), "PrestoDB Error: syntax error");
    assert!(matches!(err, PrestoError::Engine { status: 500, .. }));
}
