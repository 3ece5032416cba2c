//! tests/payout_flow_tests.rs
//!
//! End-to-end payout flows against a mocked SC server (httpmock) and the
//! in-memory coinserver stand-in.

mod util;

use chrono::Utc;
use httpmock::{Method, MockServer};
use serde_json::json;
use simplecoin_rpc_client::blockchain::{MockCoinRpc, SendFailure};
use simplecoin_rpc_client::core::errors::PayoutError;
use simplecoin_rpc_client::service::{PayoutClient, PayoutManager, PullSummary, SendOutcome, TradeRequests};
use simplecoin_rpc_client::storage::NewPayout;
use util::{dec, ltc_address, mock_client, signed};

const NO_SC: &str = "http://127.0.0.1:1/";

async fn seed(client: &PayoutClient, rows: &[(&str, &str, &str)]) {
    for (pid, address, amount) in rows {
        let payout = NewPayout {
            pid: pid.to_string(),
            user: "miner".to_string(),
            address: address.to_string(),
            amount: dec(amount),
        };
        assert!(client.storage().insert_payout(&payout, Utc::now()).await.unwrap());
    }
}

#[tokio::test]
async fn test_pull_payouts_skips_invalid_and_repeats() {
    let server = MockServer::start();
    let good1 = ltc_address(1);
    let good2 = ltc_address(2);
    let mock = server.mock(|when, then| {
        when.method(Method::POST)
            .path("/rpc/get_payouts")
            .body_contains(r#"{"currency":"LTC"}"#);
        then.status(200).body(signed(&json!({
            "pids": [
                ["u1", good1, "1.5", "p1"],
                ["u2", "1A1zP1eP5QGefi2DMPTfTL5SLmv7DivfNa", "2", "p2"],
                ["u3", good2, 0.25, 3]
            ]
        })));
    });

    let client = mock_client(&server.base_url(), MockCoinRpc::new(dec("0"))).await;

    let first = client.pull_payouts(false).await.unwrap();
    assert_eq!((first.new, first.repeat, first.invalid), (2, 0, 1));

    let second = client.pull_payouts(false).await.unwrap();
    assert_eq!((second.new, second.repeat, second.invalid), (0, 2, 1));
    mock.assert_hits(2);

    let stored = client.storage().unpaid_unlocked().await.unwrap();
    assert_eq!(stored.len(), 2);
    assert!(stored.iter().any(|p| p.pid == "3" && p.amount().unwrap() == dec("0.25")));
    assert!(!client.storage().payout_exists("p2").await.unwrap());
}

#[tokio::test]
async fn test_pull_payouts_simulated_writes_nothing() {
    let server = MockServer::start();
    let addr = ltc_address(4);
    server.mock(|when, then| {
        when.method(Method::POST).path("/rpc/get_payouts");
        then.status(200).body(signed(&json!({ "pids": [["u1", addr, "1", "p1"]] })));
    });

    let client = mock_client(&server.base_url(), MockCoinRpc::new(dec("0"))).await;
    let summary = client.pull_payouts(true).await.unwrap();
    assert_eq!(summary.new, 1);
    assert!(client.storage().unpaid_unlocked().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_pull_payouts_with_sc_down_is_a_noop() {
    let client = mock_client(NO_SC, MockCoinRpc::new(dec("0"))).await;
    let summary = client.pull_payouts(false).await.unwrap();
    assert_eq!(summary, PullSummary::default());
}

#[tokio::test]
async fn test_send_payout_aggregates_and_holds_back_dust() {
    let coin = MockCoinRpc::with_fee(dec("10"), dec("0.001"));
    let client = mock_client(NO_SC, coin.clone()).await;
    let (a, b, c) = (ltc_address(1), ltc_address(2), ltc_address(3));
    seed(&client, &[("p1", &a, "1.0"), ("p2", &a, "0.5"), ("p3", &b, "0.0005"), ("p4", &c, "2")]).await;

    let outcome = client.send_payout(false, None).await.unwrap();
    let txid = match outcome {
        SendOutcome::Sent { txid, fee, payout_ids } => {
            assert_eq!(fee, dec("0.001"));
            assert_eq!(payout_ids.len(), 3);
            txid
        }
        other => panic!("expected a send, got {:?}", other),
    };

    let sends = coin.sends().await;
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].len(), 2);
    assert_eq!(sends[0][&a], dec("1.5"));
    assert_eq!(sends[0][&c], dec("2"));

    let paid = client.storage().paid_unassociated().await.unwrap();
    assert_eq!(paid.len(), 3);
    assert!(paid.iter().all(|p| p.txid.as_deref() == Some(txid.as_str()) && !p.locked));

    let left = client.storage().unpaid_unlocked().await.unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].pid, "p3");
}

#[tokio::test]
async fn test_send_payout_never_pays_twice() {
    let coin = MockCoinRpc::new(dec("10"));
    let client = mock_client(NO_SC, coin.clone()).await;
    seed(&client, &[("p1", &ltc_address(1), "1")]).await;

    assert!(matches!(client.send_payout(false, None).await.unwrap(), SendOutcome::Sent { .. }));
    assert_eq!(client.send_payout(false, None).await.unwrap(), SendOutcome::NothingToPay);
    assert_eq!(coin.sends().await.len(), 1);
}

#[tokio::test]
async fn test_send_payout_skips_locked_payouts() {
    let coin = MockCoinRpc::new(dec("10"));
    let client = mock_client(NO_SC, coin.clone()).await;
    let (a, b) = (ltc_address(1), ltc_address(2));
    seed(&client, &[("p1", &a, "1"), ("p2", &b, "1")]).await;
    let locked_id = client.storage().unpaid_unlocked().await.unwrap()[0].id;
    client.storage().lock_payouts(&[locked_id]).await.unwrap();

    client.send_payout(false, None).await.unwrap();
    let sends = coin.sends().await;
    assert_eq!(sends[0].len(), 1);
    assert_eq!(client.storage().unpaid_locked().await.unwrap()[0].id, locked_id);
}

#[tokio::test]
async fn test_send_payout_insufficient_funds_locks_nothing() {
    let coin = MockCoinRpc::new(dec("1"));
    let client = mock_client(NO_SC, coin.clone()).await;
    seed(&client, &[("p1", &ltc_address(1), "2")]).await;

    let err = client.send_payout(false, None).await.unwrap_err();
    assert!(matches!(err, PayoutError::InsufficientFunds(_)));
    assert_eq!(client.storage().count_locked().await.unwrap(), 0);
    assert!(coin.sends().await.is_empty());
}

#[tokio::test]
async fn test_send_failure_with_unchanged_balance_unlocks() {
    let coin = MockCoinRpc::new(dec("10"));
    coin.set_send_failure(Some(SendFailure::Rejected)).await;
    let client = mock_client(NO_SC, coin.clone()).await;
    seed(&client, &[("p1", &ltc_address(1), "1"), ("p2", &ltc_address(2), "1")]).await;

    let err = client.send_payout(false, None).await.unwrap_err();
    assert!(matches!(err, PayoutError::CoinRpc(_)));
    assert_eq!(client.storage().count_locked().await.unwrap(), 0);
    assert_eq!(client.storage().unpaid_unlocked().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_send_failure_with_changed_balance_keeps_locks() {
    let coin = MockCoinRpc::new(dec("10"));
    coin.set_send_failure(Some(SendFailure::AfterDebit)).await;
    let client = mock_client(NO_SC, coin.clone()).await;
    seed(&client, &[("p1", &ltc_address(1), "1"), ("p2", &ltc_address(2), "1")]).await;

    assert!(client.send_payout(false, None).await.is_err());
    assert_eq!(client.storage().count_locked().await.unwrap(), 2);
    assert!(client.storage().unpaid_unlocked().await.unwrap().is_empty());

    // operator recovery once the txid is known
    assert_eq!(client.local_associate_all_locked("recovered", false).await.unwrap(), 2);
    assert_eq!(client.storage().paid_unassociated().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_send_payout_respects_output_limit() {
    let coin = MockCoinRpc::new(dec("10"));
    let client = mock_client(NO_SC, coin.clone()).await;
    seed(&client, &[("p1", &ltc_address(1), "1"), ("p2", &ltc_address(2), "1"), ("p3", &ltc_address(3), "1")])
        .await;

    client.send_payout(false, Some(2)).await.unwrap();
    assert_eq!(coin.sends().await[0].len(), 2);
    assert_eq!(client.storage().unpaid_unlocked().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_send_payout_simulated_and_skipped() {
    let coin = MockCoinRpc::new(dec("10"));
    let client = mock_client(NO_SC, coin.clone()).await;
    seed(&client, &[("p1", &ltc_address(1), "1.123456789")]).await;

    match client.send_payout(true, None).await.unwrap() {
        SendOutcome::Simulated { total, outputs } => {
            assert_eq!(total, dec("1.12345679"));
            assert_eq!(outputs.len(), 1);
        }
        other => panic!("expected simulation, got {:?}", other),
    }
    assert_eq!(client.storage().count_locked().await.unwrap(), 0);
    assert!(coin.sends().await.is_empty());

    coin.set_reachable(false).await;
    assert_eq!(client.send_payout(false, None).await.unwrap(), SendOutcome::Skipped);
}

#[tokio::test]
async fn test_associate_all_marks_payouts_associated() {
    let server = MockServer::start();
    let coin = MockCoinRpc::with_fee(dec("10"), dec("0.0002"));
    let client = mock_client(&server.base_url(), coin.clone()).await;
    seed(&client, &[("p1", &ltc_address(1), "1"), ("p2", &ltc_address(2), "1")]).await;

    let txid = match client.send_payout(false, None).await.unwrap() {
        SendOutcome::Sent { txid, .. } => txid,
        other => panic!("expected a send, got {:?}", other),
    };

    let assoc = server.mock(|when, then| {
        when.method(Method::POST)
            .path("/rpc/associate_payouts")
            .body_contains(txid.as_str())
            .body_contains(r#""pids":["p1","p2"]"#)
            .body_contains(r#""tx_fee":0.0002"#);
        then.status(200).body(signed(&json!({ "result": true })));
    });

    assert_eq!(client.associate_all(false).await.unwrap(), 1);
    assoc.assert();
    assert!(client.storage().paid_unassociated().await.unwrap().is_empty());
    let done = client.storage().completed().await.unwrap();
    assert_eq!(done.len(), 2);
    assert!(done.iter().all(|p| p.assoc_time.is_some()));
}

#[tokio::test]
async fn test_associate_rejected_by_server_stays_unassociated() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::POST).path("/rpc/associate_payouts");
        then.status(200).body(signed(&json!({ "result": false })));
    });
    let coin = MockCoinRpc::new(dec("10"));
    let client = mock_client(&server.base_url(), coin).await;
    seed(&client, &[("p1", &ltc_address(1), "1")]).await;
    client.send_payout(false, None).await.unwrap();

    assert_eq!(client.associate_all(false).await.unwrap(), 0);
    assert_eq!(client.storage().paid_unassociated().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_associate_all_skips_unknown_transactions() {
    let server = MockServer::start();
    let assoc = server.mock(|when, then| {
        when.method(Method::POST).path("/rpc/associate_payouts");
        then.status(200).body(signed(&json!({ "result": true })));
    });
    let client = mock_client(&server.base_url(), MockCoinRpc::new(dec("10"))).await;
    seed(&client, &[("p1", &ltc_address(1), "1")]).await;
    let id = client.storage().unpaid_unlocked().await.unwrap()[0].id;
    client.storage().mark_paid(&[id], "not-in-wallet").await.unwrap();

    assert_eq!(client.associate_all(false).await.unwrap(), 0);
    assoc.assert_hits(0);
}

#[tokio::test]
async fn test_confirm_trans_only_posts_well_confirmed() {
    let server = MockServer::start();
    let listing = server.mock(|when, then| {
        when.method(Method::GET)
            .path("/api/transaction")
            .query_param("__filter_by", r#"{"confirmed":false,"currency":"LTC"}"#);
        then.status(200).json_body(json!({
            "success": true,
            "objects": [{ "txid": "aa" }, { "txid": "bb" }]
        }));
    });
    let confirm = server.mock(|when, then| {
        when.method(Method::POST)
            .path("/rpc/confirm_transactions")
            .body_contains(r#"{"tids":["aa"]}"#);
        then.status(200).body(signed(&json!({ "result": true })));
    });

    let coin = MockCoinRpc::new(dec("0"));
    coin.set_confirmations("aa", 7).await;
    coin.set_confirmations("bb", 6).await;
    let client = mock_client(&server.base_url(), coin).await;

    let confirmed = client.confirm_trans(false).await.unwrap();
    assert_eq!(confirmed, vec!["aa".to_string()]);
    listing.assert();
    confirm.assert();
}

#[tokio::test]
async fn test_confirm_trans_simulated_does_not_post() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::GET).path("/api/transaction");
        then.status(200).json_body(json!({ "success": true, "objects": [{ "txid": "aa" }] }));
    });
    let confirm = server.mock(|when, then| {
        when.method(Method::POST).path("/rpc/confirm_transactions");
        then.status(200).body(signed(&json!({ "result": true })));
    });
    let coin = MockCoinRpc::new(dec("0"));
    coin.set_confirmations("aa", 100).await;
    let client = mock_client(&server.base_url(), coin).await;

    assert_eq!(client.confirm_trans(true).await.unwrap(), vec!["aa".to_string()]);
    confirm.assert_hits(0);
}

#[tokio::test]
async fn test_trade_requests_filtered_and_split() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::POST).path("/rpc/get_trade_requests");
        then.status(200).body(signed(&json!({
            "trs": [[1, "LTC", 1.5, "buy"], [2, "LTC", 2.0, "sell"], [3, "DOGE", 5.0, "sell"]]
        })));
    });
    let client = mock_client(&server.base_url(), MockCoinRpc::new(dec("0"))).await;

    let requests = client.get_open_trade_requests().await.unwrap();
    assert_eq!(requests.buy.len(), 1);
    assert_eq!(requests.sell.len(), 1);
    assert_eq!(requests.sell[0].id, 2);
    assert_eq!(requests.buy[0].quantity, dec("1.5"));
}

#[tokio::test]
async fn test_malformed_trade_requests_are_ignored() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(Method::POST).path("/rpc/get_trade_requests");
        then.status(200).body(signed(&json!({ "trs": [[1, "LTC", 1.5, "buy"], ["x", "LTC"]] })));
    });
    let client = mock_client(&server.base_url(), MockCoinRpc::new(dec("0"))).await;
    assert_eq!(client.get_open_trade_requests().await.unwrap(), TradeRequests::default());
}

#[tokio::test]
async fn test_close_trade_request() {
    let server = MockServer::start();
    let update = server.mock(|when, then| {
        when.method(Method::POST)
            .path("/rpc/update_trade_requests")
            .body_contains(r#""trs":{"12":{"fees":"0.01","quantity":"1.5","status":6}}"#)
            .body_contains(r#""update":true"#);
        then.status(200).body(signed(&json!({ "success": true })));
    });
    let client = mock_client(&server.base_url(), MockCoinRpc::new(dec("0"))).await;

    assert!(!client.close_trade_request(12, dec("1.5"), dec("0.01"), true).await.unwrap());
    update.assert_hits(0);
    assert!(client.close_trade_request(12, dec("1.5"), dec("0.01"), false).await.unwrap());
    update.assert();
}

#[tokio::test]
async fn test_local_management_commands() {
    let client = mock_client(NO_SC, MockCoinRpc::new(dec("0"))).await;
    seed(&client, &[("p1", &ltc_address(1), "1"), ("p2", &ltc_address(2), "1")]).await;
    let ids: Vec<i64> = client.storage().unpaid_unlocked().await.unwrap().iter().map(|p| p.id).collect();
    client.storage().lock_payouts(&ids).await.unwrap();

    assert_eq!(client.reset_all_locked(true).await.unwrap(), 2);
    assert_eq!(client.storage().count_locked().await.unwrap(), 2);

    assert!(client.local_associate_locked(ids[0], "tx1", false).await.unwrap());
    assert!(matches!(
        client.local_associate_locked(ids[0], "tx1", false).await,
        Err(PayoutError::NotFound(_))
    ));

    let dump = client.dump_incomplete().await.unwrap();
    assert!(dump.contains("@@ Unpaid locked LTC payouts @@"));
    assert!(dump.contains("@@ Paid un-associated LTC payouts @@"));
    assert!(dump.contains("tx1"));
    assert!(dump.contains("@@ LTC payouts ready to payout @@\n-- Nothing to display --"));

    assert_eq!(client.reset_all_locked(false).await.unwrap(), 1);
    assert_eq!(client.storage().unpaid_unlocked().await.unwrap().len(), 1);

    client.init_db(false).await.unwrap();
    assert!(client.dump_complete().await.unwrap().contains("-- Nothing to display --"));
    assert!(!client.storage().payout_exists("p1").await.unwrap());
}

#[tokio::test]
async fn test_manager_sends_then_associates() {
    let server = MockServer::start();
    let assoc = server.mock(|when, then| {
        when.method(Method::POST).path("/rpc/associate_payouts");
        then.status(200).body(signed(&json!({ "result": true })));
    });
    let coin = MockCoinRpc::new(dec("10"));
    let client = mock_client(&server.base_url(), coin.clone()).await;
    seed(&client, &[("p1", &ltc_address(1), "1")]).await;
    let manager = PayoutManager::new(vec![client], false);

    let report = manager.send_payout().await;
    assert!(report.all_ok());
    assert_eq!(report.ok, vec!["LTC".to_string()]);
    assoc.assert();

    let client = manager.client("LTC").unwrap();
    assert_eq!(client.storage().completed().await.unwrap().len(), 1);
    assert!(manager.dump_complete().await.unwrap().contains("Paid + associated LTC payouts"));
}

#[tokio::test]
async fn test_send_is_recorded_when_transaction_lookup_fails() {
    let coinserver = MockServer::start();
    coinserver.mock(|when, then| {
        when.method(Method::POST).body_contains(r#""method":"getblockcount""#);
        then.status(200).json_body(json!({ "result": 100, "error": null, "id": 1 }));
    });
    coinserver.mock(|when, then| {
        when.method(Method::POST).body_contains(r#""method":"getbalance""#);
        then.status(200).json_body(json!({ "result": 10, "error": null, "id": 1 }));
    });
    let send = coinserver.mock(|when, then| {
        when.method(Method::POST).body_contains(r#""method":"sendmany""#);
        then.status(200).json_body(json!({ "result": "feedtx", "error": null, "id": 1 }));
    });
    let lookup = coinserver.mock(|when, then| {
        when.method(Method::POST).body_contains(r#""method":"gettransaction""#);
        then.status(500).json_body(json!({
            "result": null,
            "error": { "code": -1, "message": "busy" },
            "id": 1
        }));
    });

    let client = util::coinserv_client(NO_SC, coinserver.port()).await;
    seed(&client, &[("p1", &ltc_address(1), "1")]).await;

    match client.send_payout(false, None).await.unwrap() {
        SendOutcome::Sent { txid, fee, payout_ids } => {
            assert_eq!(txid, "feedtx");
            assert_eq!(fee, dec("0"));
            assert_eq!(payout_ids.len(), 1);
        }
        other => panic!("expected a send, got {:?}", other),
    }
    let paid = client.storage().paid_unassociated().await.unwrap();
    assert_eq!(paid.len(), 1);
    assert_eq!(paid[0].txid.as_deref(), Some("feedtx"));
    assert!(!paid[0].locked);

    assert_eq!(client.send_payout(false, None).await.unwrap(), SendOutcome::NothingToPay);
    send.assert_hits(1);
    lookup.assert_hits(1);
}
