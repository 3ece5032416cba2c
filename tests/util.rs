// tests/util.rs
// Shared helpers for the integration tests
#![allow(dead_code)]

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde_json::Value;
use simplecoin_rpc_client::blockchain::address::encode_address;
use simplecoin_rpc_client::blockchain::{CoinRpc, CoinservClient, MockCoinRpc};
use simplecoin_rpc_client::core::config::{AppConfig, CurrencyConfig};
use simplecoin_rpc_client::network::ScClient;
use simplecoin_rpc_client::security::signing::TimedSerializer;
use simplecoin_rpc_client::service::PayoutClient;
use simplecoin_rpc_client::storage::PayoutStorage;
use std::str::FromStr;
use std::sync::Arc;

pub const SECRET: &str = "integration-secret";
pub const LTC_VERSION: u8 = 48;

pub fn serializer() -> TimedSerializer {
    TimedSerializer::new(&SecretString::new(SECRET.to_string()))
}

/// Body the SC server would send back for `value`.
pub fn signed(value: &Value) -> String {
    serializer().dumps(value).unwrap()
}

pub fn ltc_address(seed: u8) -> String {
    encode_address(LTC_VERSION, &[seed; 20])
}

pub fn dec(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub fn config_yaml(sc_url: &str, coin_port: u16, db_prefix: &str) -> String {
    format!(
        r#"
sc_rpc_client:
  rpc_signature: "{secret}"
  rpc_url: "{sc_url}"
  max_age: 60
  timeout_secs: 10
  database_path: "{db_prefix}"
currencies:
  - enabled: true
    currency_code: "LTC"
    coinserv:
      port: {coin_port}
      address: "127.0.0.1"
      username: "admin1"
      password: "123"
      account: ""
    valid_address_versions: [48, 50]
    min_confirms: 6
    tx_fee: 0
    minimum_tx_output: 0.001
  - enabled: false
    currency_code: "DOGE"
    coinserv:
      port: 22555
      address: "127.0.0.1"
      username: "admin1"
      password: "123"
    valid_address_versions: [30]
"#,
        secret = SECRET,
        sc_url = sc_url,
        coin_port = coin_port,
        db_prefix = db_prefix,
    )
}

pub fn app_config(sc_url: &str, coin_port: u16, db_prefix: &str) -> AppConfig {
    let config = AppConfig::from_yaml_str(&config_yaml(sc_url, coin_port, db_prefix)).unwrap();
    config.validate().unwrap();
    config
}

/// LTC payout client over an in-memory database and the given coinserver stand-in.
pub async fn mock_client(sc_url: &str, coin: MockCoinRpc) -> PayoutClient {
    ltc_client(sc_url, 19332, |_| Arc::new(coin) as Arc<dyn CoinRpc>).await
}

/// LTC payout client talking JSON-RPC to a coinserver on `coin_port`.
pub async fn coinserv_client(sc_url: &str, coin_port: u16) -> PayoutClient {
    ltc_client(sc_url, coin_port, |currency| {
        Arc::new(CoinservClient::new(currency).unwrap()) as Arc<dyn CoinRpc>
    })
    .await
}

async fn ltc_client<F>(sc_url: &str, coin_port: u16, coin: F) -> PayoutClient
where
    F: FnOnce(&CurrencyConfig) -> Arc<dyn CoinRpc>,
{
    let config = app_config(sc_url, coin_port, "./unused_");
    let currency = config.currency("LTC").unwrap().clone();
    let sc = ScClient::new(&config.sc_rpc_client).unwrap();
    let storage = PayoutStorage::new_with_url("sqlite::memory:", "LTC").await.unwrap();
    let coin = coin(&currency);
    PayoutClient::new(currency, sc, coin, storage)
}
