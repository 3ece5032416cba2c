//! Coinserver JSON-RPC client against an httpmock daemon.

mod util;

use httpmock::{Method, MockServer};
use serde_json::json;
use simplecoin_rpc_client::blockchain::{CoinRpc, CoinservClient};
use simplecoin_rpc_client::core::config::{AppConfig, CurrencyConfig};
use simplecoin_rpc_client::core::errors::PayoutError;
use std::collections::BTreeMap;
use util::{config_yaml, dec, ltc_address};

fn ltc(server: &MockServer) -> CurrencyConfig {
    util::app_config("http://127.0.0.1:1/", server.port(), "./unused_").currency("LTC").unwrap().clone()
}

fn locked_wallet_ltc(server: &MockServer) -> CurrencyConfig {
    let yaml = config_yaml("http://127.0.0.1:1/", server.port(), "./unused_")
        .replace(r#"account: """#, "account: \"pool\"\n      wallet_pass: \"hunter2\"")
        .replace("tx_fee: 0\n", "tx_fee: 0.001\n");
    AppConfig::from_yaml_str(&yaml).unwrap().currency("LTC").unwrap().clone()
}

#[tokio::test]
async fn test_get_balance() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::POST)
            .path("/")
            .body_contains(r#""method":"getbalance""#)
            .body_contains(r#""params":[""]"#);
        then.status(200).json_body(json!({ "result": 12.5, "error": null, "id": 1 }));
    });

    let client = CoinservClient::new(&ltc(&server)).unwrap();
    assert_eq!(client.get_balance("").await.unwrap(), dec("12.5"));
    mock.assert();
}

#[tokio::test]
async fn test_poke_uses_getblockcount() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(Method::POST).body_contains(r#""method":"getblockcount""#);
        then.status(200).json_body(json!({ "result": 812345, "error": null, "id": 1 }));
    });

    let client = CoinservClient::new(&ltc(&server)).unwrap();
    client.poke_rpc().await.unwrap();
    mock.assert();
}

#[tokio::test]
async fn test_rpc_error_object_is_reported() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::POST).body_contains(r#""method":"getbalance""#);
        then.status(500).json_body(json!({
            "result": null,
            "error": { "code": -6, "message": "Insufficient funds" },
            "id": 1
        }));
    });

    let client = CoinservClient::new(&ltc(&server)).unwrap();
    match client.get_balance("").await {
        Err(PayoutError::CoinRpc(msg)) => {
            assert!(msg.contains("-6"));
            assert!(msg.contains("Insufficient funds"));
        }
        other => panic!("expected a coinserver error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_non_json_reply_is_coin_rpc_error() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::POST);
        then.status(401).body("Unauthorized");
    });

    let client = CoinservClient::new(&ltc(&server)).unwrap();
    let err = client.poke_rpc().await.unwrap_err();
    assert!(matches!(err, PayoutError::CoinRpc(ref msg) if msg.contains("401")));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_send_many_unlocks_sets_fee_and_fetches_transaction() {
    let server = MockServer::start();
    let address = ltc_address(9);
    let unlock = server.mock(|when, then| {
        when.method(Method::POST)
            .body_contains(r#""method":"walletpassphrase""#)
            .body_contains(r#""params":["hunter2",10]"#);
        then.status(200).json_body(json!({ "result": null, "error": null, "id": 1 }));
    });
    let fee = server.mock(|when, then| {
        when.method(Method::POST)
            .body_contains(r#""method":"settxfee""#)
            .body_contains(r#""params":[0.001]"#);
        then.status(200).json_body(json!({ "result": true, "error": null, "id": 2 }));
    });
    let send = server.mock(|when, then| {
        when.method(Method::POST)
            .body_contains(r#""method":"sendmany""#)
            .body_contains(format!(r#""params":["pool",{{"{}":1.5}}]"#, address));
        then.status(200).json_body(json!({ "result": "ab12", "error": null, "id": 3 }));
    });
    let lookup = server.mock(|when, then| {
        when.method(Method::POST)
            .body_contains(r#""method":"gettransaction""#)
            .body_contains(r#""params":["ab12"]"#);
        then.status(200).json_body(json!({
            "result": { "txid": "ab12", "fee": -0.0002, "confirmations": 0, "details": [] },
            "error": null,
            "id": 4
        }));
    });

    let client = CoinservClient::new(&locked_wallet_ltc(&server)).unwrap();
    let mut outputs = BTreeMap::new();
    outputs.insert(address.clone(), dec("1.5"));

    let (txid, tx) = client.send_many(client.account(), &outputs).await.unwrap();
    assert_eq!(txid, "ab12");
    assert_eq!(tx.fee, dec("0.0002"));
    assert_eq!(tx.confirmations, 0);
    unlock.assert();
    fee.assert();
    send.assert();
    lookup.assert();
}

#[tokio::test]
async fn test_get_transaction_confirmations() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::POST).body_contains(r#""method":"gettransaction""#);
        then.status(200).json_body(json!({
            "result": { "txid": "cd34", "fee": -0.001, "confirmations": 42 },
            "error": null,
            "id": 1
        }));
    });

    let client = CoinservClient::new(&ltc(&server)).unwrap();
    let tx = client.get_transaction("cd34").await.unwrap();
    assert_eq!(tx.confirmations, 42);
    assert_eq!(tx.fee, dec("0.001"));
}

#[tokio::test]
async fn test_send_many_keeps_txid_when_lookup_fails() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::POST).body_contains(r#""method":"sendmany""#);
        then.status(200).json_body(json!({ "result": "ef56", "error": null, "id": 1 }));
    });
    server.mock(|when, then| {
        when.method(Method::POST).body_contains(r#""method":"gettransaction""#);
        then.status(500).json_body(json!({
            "result": null,
            "error": { "code": -5, "message": "Invalid or non-wallet transaction id" },
            "id": 2
        }));
    });

    let client = CoinservClient::new(&ltc(&server)).unwrap();
    let mut outputs = BTreeMap::new();
    outputs.insert(ltc_address(3), dec("0.5"));

    let (txid, tx) = client.send_many("", &outputs).await.unwrap();
    assert_eq!(txid, "ef56");
    assert_eq!(tx.txid, "ef56");
    assert_eq!(tx.fee, dec("0"));
}
