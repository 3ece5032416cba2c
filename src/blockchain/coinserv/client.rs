//! JSON-RPC client for bitcoind-style coinservers.
//!
//! Speaks JSON-RPC 1.0 over HTTP with basic auth. Daemons answer RPC-level
//! failures with a non-200 status and a JSON body carrying `error`, so the
//! body is parsed before the status is judged.

use async_trait::async_trait;
use reqwest::Client as HttpClient;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::blockchain::traits::{CoinRpc, CoinTransaction};
use crate::core::config::CurrencyConfig;
use crate::core::errors::PayoutError;
use crate::security::redaction::redact_body;

/// Seconds the wallet stays unlocked for a `sendmany`.
const UNLOCK_SECONDS: u64 = 10;
const COIN_DECIMALS: u32 = 8;

/// Coinserver RPC client for one currency.
pub struct CoinservClient {
    currency_code: String,
    rpc_url: String,
    http_client: HttpClient,
    rpc_user: String,
    rpc_password: SecretString,
    wallet_pass: Option<SecretString>,
    account: String,
    tx_fee: Decimal,
    next_id: AtomicU64,
}

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawTransaction {
    txid: String,
    #[serde(default)]
    fee: Decimal,
    #[serde(default)]
    confirmations: i64,
}

impl CoinservClient {
    pub fn new(currency: &CurrencyConfig) -> Result<Self, PayoutError> {
        let http_client = HttpClient::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| PayoutError::CoinRpc(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            currency_code: currency.currency_code.clone(),
            rpc_url: currency.coinserv.endpoint(),
            http_client,
            rpc_user: currency.coinserv.username.clone(),
            rpc_password: currency.coinserv.password.clone(),
            wallet_pass: currency.coinserv.wallet_pass.clone(),
            account: currency.coinserv.account.clone(),
            tx_fee: currency.tx_fee,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Issue one JSON-RPC call and return its `result`.
    pub async fn rpc_call(&self, method: &str, params: Vec<Value>) -> Result<Value, PayoutError> {
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(currency = %self.currency_code, method, "coinserver call");

        let response = self
            .http_client
            .post(&self.rpc_url)
            .basic_auth(&self.rpc_user, Some(self.rpc_password.expose_secret()))
            .json(&request)
            .send()
            .await
            .map_err(|e| PayoutError::CoinRpc(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| PayoutError::CoinRpc(format!("{} response unreadable: {}", method, e)))?;

        let parsed: RpcResponse = serde_json::from_str(&body).map_err(|_| {
            PayoutError::CoinRpc(format!(
                "{} returned HTTP {} with body {}",
                method,
                status,
                redact_body(&body)
            ))
        })?;

        if let Some(error) = parsed.error {
            return Err(PayoutError::CoinRpc(format!(
                "{} failed with RPC error {}: {}",
                method, error.code, error.message
            )));
        }
        if !status.is_success() {
            return Err(PayoutError::CoinRpc(format!("{} returned HTTP {}", method, status)));
        }
        // walletpassphrase and friends answer with a null result
        Ok(parsed.result.unwrap_or(Value::Null))
    }

    async fn unlock_wallet(&self) -> Result<(), PayoutError> {
        if let Some(pass) = &self.wallet_pass {
            self.rpc_call(
                "walletpassphrase",
                vec![Value::from(pass.expose_secret().as_str()), Value::from(UNLOCK_SECONDS)],
            )
            .await?;
        }
        Ok(())
    }
}

/// Decimal amounts go over the wire as JSON numbers rounded to satoshis.
pub fn amount_to_json(amount: Decimal) -> Result<Value, PayoutError> {
    let rounded = amount.round_dp(COIN_DECIMALS);
    rounded
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| PayoutError::Serialization(format!("amount {} is not representable", amount)))
}

fn decimal_from_json(value: Value, what: &str) -> Result<Decimal, PayoutError> {
    serde_json::from_value(value)
        .map_err(|e| PayoutError::CoinRpc(format!("{} is not a decimal amount: {}", what, e)))
}

#[async_trait]
impl CoinRpc for CoinservClient {
    async fn poke_rpc(&self) -> Result<(), PayoutError> {
        self.rpc_call("getblockcount", vec![]).await.map(|_| ())
    }

    async fn get_balance(&self, account: &str) -> Result<Decimal, PayoutError> {
        let result = self.rpc_call("getbalance", vec![Value::from(account)]).await?;
        decimal_from_json(result, "balance")
    }

    async fn send_many(
        &self,
        account: &str,
        amounts: &BTreeMap<String, Decimal>,
    ) -> Result<(String, CoinTransaction), PayoutError> {
        let mut outputs = Map::with_capacity(amounts.len());
        for (address, amount) in amounts {
            outputs.insert(address.clone(), amount_to_json(*amount)?);
        }

        self.unlock_wallet().await?;
        if self.tx_fee > Decimal::ZERO {
            self.rpc_call("settxfee", vec![amount_to_json(self.tx_fee)?]).await?;
        }

        info!(currency = %self.currency_code, outputs = outputs.len(), "sending sendmany");
        let result = self
            .rpc_call("sendmany", vec![Value::from(account), Value::Object(outputs)])
            .await?;
        let txid = result
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| PayoutError::CoinRpc("sendmany did not return a txid".to_string()))?;

        info!(currency = %self.currency_code, txid = %txid, "sendmany accepted");
        // funds have moved; a failed lookup must not turn this into an error
        let tx = match self.get_transaction(&txid).await {
            Ok(tx) => tx,
            Err(e) => {
                warn!(
                    currency = %self.currency_code,
                    txid = %txid,
                    error = %e,
                    "Sent, but the transaction lookup failed; fee is fetched again on association"
                );
                CoinTransaction { txid: txid.clone(), fee: Decimal::ZERO, confirmations: 0 }
            }
        };
        Ok((txid, tx))
    }

    async fn get_transaction(&self, txid: &str) -> Result<CoinTransaction, PayoutError> {
        let result = self.rpc_call("gettransaction", vec![Value::from(txid)]).await?;
        let raw: RawTransaction = serde_json::from_value(result)
            .map_err(|e| PayoutError::CoinRpc(format!("unexpected gettransaction result: {}", e)))?;
        Ok(CoinTransaction { txid: raw.txid, fee: raw.fee.abs(), confirmations: raw.confirmations })
    }

    fn account(&self) -> &str {
        &self.account
    }
}
