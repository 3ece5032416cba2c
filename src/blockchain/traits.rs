use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::errors::PayoutError;

/// The parts of a wallet transaction the payout flow cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoinTransaction {
    pub txid: String,
    /// Absolute fee paid by the wallet (coinservers report it negative).
    pub fee: Decimal,
    pub confirmations: i64,
}

/// Coinserver wallet operations used by the payout client.
#[async_trait]
pub trait CoinRpc: Send + Sync {
    /// Cheap call proving the daemon is reachable and answering.
    async fn poke_rpc(&self) -> Result<(), PayoutError>;

    /// Confirmed balance of `account`.
    async fn get_balance(&self, account: &str) -> Result<Decimal, PayoutError>;

    /// Pay every `address -> amount` pair in one transaction from `account`.
    ///
    /// `Ok` means the transaction was broadcast. The returned fee is zero
    /// when the wallet could not report it yet.
    async fn send_many(
        &self,
        account: &str,
        amounts: &BTreeMap<String, Decimal>,
    ) -> Result<(String, CoinTransaction), PayoutError>;

    async fn get_transaction(&self, txid: &str) -> Result<CoinTransaction, PayoutError>;

    /// Wallet account payouts are sent from.
    fn account(&self) -> &str;
}
