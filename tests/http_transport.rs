//! HTTP transport against a mock batch endpoint

use batch_orchestrator::batch::BatchEnvelope;
use batch_orchestrator::transport::{BatchTransport, TransportError, TransportReply};
use batch_orchestrator::{
    HttpBatchTransport, Orchestrator, Outcome, RequestUnit, RunOptions, StaticTokenProvider,
};
use mockito::{Matcher, Server};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn transport(base_url: &str) -> HttpBatchTransport {
    HttpBatchTransport::new(base_url, Arc::new(StaticTokenProvider::new("secret"))).unwrap()
}

fn envelope() -> BatchEnvelope {
    BatchEnvelope::new(vec![
        RequestUnit::get("rg-a", "/subscriptions/s/resourceGroups/a?api-version=2021-04-01"),
        RequestUnit::get("rg-b", "/subscriptions/s/resourceGroups/b?api-version=2021-04-01"),
    ])
}

fn batch_body() -> String {
    json!({
        "responses": [
            {"name": "rg-b", "httpStatusCode": 404, "headers": {}, "content": {"error": {"code": "ResourceGroupNotFound"}}},
            {"name": "rg-a", "httpStatusCode": 200, "headers": {"x-ms-request-id": "r1"}, "content": {"name": "a"}}
        ]
    })
    .to_string()
}

#[tokio::test]
async fn test_send_posts_named_requests_with_bearer_token() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/batch")
        .match_query(Matcher::UrlEncoded("api-version".into(), "2020-06-01".into()))
        .match_header("authorization", "Bearer secret")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""name":"rg-a""#.into()),
            Matcher::Regex(r#""httpMethod":"GET""#.into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(batch_body())
        .create_async()
        .await;

    let reply = transport(&server.url()).send(&envelope()).await.unwrap();
    mock.assert_async().await;

    let TransportReply::Completed(resp) = reply else {
        panic!("expected a completed reply, got {reply:?}");
    };
    assert_eq!(resp.items.len(), 2);
    let a = resp.items.iter().find(|i| i.name.as_deref() == Some("rg-a")).unwrap();
    assert_eq!(a.status, 200);
    assert_eq!(a.header("X-MS-Request-Id"), Some("r1"));
}

#[tokio::test]
async fn test_accepted_reply_is_deferred() {
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("POST", "/batch")
        .match_query(Matcher::Any)
        .with_status(202)
        .with_header("location", "/operations/42")
        .with_header("retry-after", "1")
        .create_async()
        .await;

    let reply = transport(&server.url()).send(&envelope()).await.unwrap();
    assert_eq!(
        reply,
        TransportReply::Deferred {
            location: "/operations/42".into(),
            retry_after: Some(Duration::from_secs(1)),
        }
    );
}

#[tokio::test]
async fn test_batch_level_statuses_map_to_errors() {
    let mut server = Server::new_async().await;
    let t = transport(&server.url());

    let throttled = server
        .mock("POST", "/batch")
        .match_query(Matcher::Any)
        .with_status(429)
        .with_header("retry-after", "5")
        .create_async()
        .await;
    match t.send(&envelope()).await {
        Err(TransportError::Throttled { retry_after }) => {
            assert_eq!(retry_after, Some(Duration::from_secs(5)))
        }
        other => panic!("expected throttled, got {other:?}"),
    }
    throttled.remove_async().await;

    let too_large = server
        .mock("POST", "/batch")
        .match_query(Matcher::Any)
        .with_status(413)
        .with_body("too large")
        .create_async()
        .await;
    let err = t.send(&envelope()).await.unwrap_err();
    assert!(err.is_payload_rejection());
    too_large.remove_async().await;

    let _unavailable = server
        .mock("POST", "/batch")
        .match_query(Matcher::Any)
        .with_status(503)
        .with_body("busy")
        .create_async()
        .await;
    match t.send(&envelope()).await {
        Err(TransportError::Status { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "busy");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_orchestrator_follows_deferred_result() {
    let mut server = Server::new_async().await;
    let accepted = server
        .mock("POST", "/batch")
        .match_query(Matcher::Any)
        .with_status(202)
        .with_header("location", "/operations/7")
        .expect(1)
        .create_async()
        .await;
    let result = server
        .mock("GET", "/operations/7")
        .match_header("authorization", "Bearer secret")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(batch_body())
        .expect(1)
        .create_async()
        .await;

    let options = RunOptions::default()
        .with_poll_interval(Duration::from_millis(10))
        .with_jitter(false);
    let orchestrator =
        Orchestrator::new(Arc::new(transport(&server.url()))).with_options(options);
    let report = orchestrator.submit(envelope().units).await.unwrap();

    accepted.assert_async().await;
    result.assert_async().await;

    assert_eq!(report.stats.succeeded, 1);
    assert_eq!(report.stats.permanently_failed, 1);
    let b = report.get(&"rg-b".into()).unwrap();
    assert_eq!(b.attempts, 1);
    assert!(matches!(
        &b.outcome,
        Outcome::PermanentFailure { status: Some(404), content: Some(c) }
            if c["error"]["code"] == "ResourceGroupNotFound"
    ));
}

#[tokio::test]
async fn test_invalid_base_url_is_configuration_error() {
    let err = HttpBatchTransport::new("not a url", Arc::new(StaticTokenProvider::new("x")))
        .err()
        .unwrap();
    assert!(err.is_configuration());
}
