//! Signed SC round-trips against an httpmock server.

mod util;

use httpmock::{Method, MockServer};
use secrecy::SecretString;
use serde_json::json;
use simplecoin_rpc_client::core::errors::PayoutError;
use simplecoin_rpc_client::network::ScClient;
use simplecoin_rpc_client::security::signing::TimedSerializer;
use util::{app_config, serializer, signed};

fn client(server: &MockServer) -> ScClient {
    ScClient::new(&app_config(&server.base_url(), 19332, "./unused_").sc_rpc_client).unwrap()
}

#[tokio::test]
async fn test_post_signs_request_and_verifies_reply() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::POST)
            .path("/rpc/get_payouts")
            .body_contains(r#"{"currency":"LTC"}."#);
        then.status(200).body(signed(&json!({ "pids": [] })));
    });

    let reply = client(&server).post("get_payouts", &json!({ "currency": "LTC" })).await.unwrap();
    assert_eq!(reply, json!({ "pids": [] }));
    mock.assert();
}

#[tokio::test]
async fn test_reply_signed_with_other_secret_is_rejected() {
    let server = MockServer::start();
    let forged = TimedSerializer::new(&SecretString::new("not-the-secret".to_string()))
        .dumps(&json!({ "pids": [] }))
        .unwrap();
    server.mock(|when, then| {
        when.method(Method::POST).path("/rpc/get_payouts");
        then.status(200).body(forged);
    });

    let err = client(&server).post("get_payouts", &json!({})).await.unwrap_err();
    assert!(matches!(err, PayoutError::InvalidSignature(_)));
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_stale_reply_is_rejected() {
    let server = MockServer::start();
    let stale = serializer()
        .dumps_at(&json!({ "result": true }), chrono::Utc::now().timestamp() - 3600)
        .unwrap();
    server.mock(|when, then| {
        when.method(Method::POST).path("/rpc/associate_payouts");
        then.status(200).body(stale);
    });

    let err = client(&server).post("associate_payouts", &json!({})).await.unwrap_err();
    assert!(matches!(err, PayoutError::InvalidSignature(ref msg) if msg.contains("exceeds")));
}

#[tokio::test]
async fn test_non_200_is_remote_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::POST).path("/rpc/get_payouts");
        then.status(403).body("Forbidden");
    });

    let err = client(&server).post("get_payouts", &json!({})).await.unwrap_err();
    assert!(matches!(err, PayoutError::Remote(ref msg) if msg.contains("403")));
}

#[tokio::test]
async fn test_get_appends_query_and_parses_json() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::GET)
            .path("/api/transaction")
            .query_param("__filter_by", r#"{"confirmed":false}"#);
        then.status(200).json_body(json!({ "success": true, "objects": [] }));
    });

    let body = client(&server)
        .get("api/transaction", &[("__filter_by", r#"{"confirmed":false}"#)])
        .await
        .unwrap();
    assert_eq!(body["success"], json!(true));
    mock.assert();
}

#[tokio::test]
async fn test_get_with_html_body_is_remote_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::GET).path("/api/transaction");
        then.status(200).body("<html>maintenance</html>");
    });

    let err = client(&server).get("api/transaction", &[]).await.unwrap_err();
    assert!(matches!(err, PayoutError::Remote(_)));
}
