// In-memory coinserver used by tests and dry runs.

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::blockchain::traits::{CoinRpc, CoinTransaction};
use crate::core::errors::PayoutError;

/// How a `send_many` call should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendFailure {
    /// Rejected before any funds move.
    Rejected,
    /// Funds leave the wallet but the call still errors.
    AfterDebit,
}

#[derive(Debug, Default)]
struct MockState {
    balance: Decimal,
    fee: Decimal,
    reachable: bool,
    send_failure: Option<SendFailure>,
    transactions: HashMap<String, CoinTransaction>,
    sends: Vec<BTreeMap<String, Decimal>>,
    next_tx: u64,
}

/// Coinserver stand-in that records every `send_many` it receives.
#[derive(Debug, Clone)]
pub struct MockCoinRpc {
    account: String,
    state: Arc<Mutex<MockState>>,
}

impl MockCoinRpc {
    pub fn new(balance: Decimal) -> Self {
        Self::with_fee(balance, Decimal::ZERO)
    }

    /// Wallet holding `balance` that charges `fee` per transaction.
    pub fn with_fee(balance: Decimal, fee: Decimal) -> Self {
        let state = MockState { balance, fee, reachable: true, ..Default::default() };
        Self { account: String::new(), state: Arc::new(Mutex::new(state)) }
    }

    pub async fn set_reachable(&self, reachable: bool) {
        self.state.lock().await.reachable = reachable;
    }

    pub async fn set_send_failure(&self, failure: Option<SendFailure>) {
        self.state.lock().await.send_failure = failure;
    }

    pub async fn set_confirmations(&self, txid: &str, confirmations: i64) {
        let mut state = self.state.lock().await;
        let fee = state.fee;
        state
            .transactions
            .entry(txid.to_string())
            .or_insert_with(|| CoinTransaction { txid: txid.to_string(), fee, confirmations: 0 })
            .confirmations = confirmations;
    }

    /// Every output map passed to `send_many`, oldest first.
    pub async fn sends(&self) -> Vec<BTreeMap<String, Decimal>> {
        self.state.lock().await.sends.clone()
    }

    pub async fn balance(&self) -> Decimal {
        self.state.lock().await.balance
    }
}

#[async_trait]
impl CoinRpc for MockCoinRpc {
    async fn poke_rpc(&self) -> Result<(), PayoutError> {
        if self.state.lock().await.reachable {
            Ok(())
        } else {
            Err(PayoutError::CoinRpc("coinserver unreachable".to_string()))
        }
    }

    async fn get_balance(&self, _account: &str) -> Result<Decimal, PayoutError> {
        self.poke_rpc().await?;
        Ok(self.state.lock().await.balance)
    }

    async fn send_many(
        &self,
        _account: &str,
        amounts: &BTreeMap<String, Decimal>,
    ) -> Result<(String, CoinTransaction), PayoutError> {
        self.poke_rpc().await?;
        let mut state = self.state.lock().await;
        let total: Decimal = amounts.values().copied().sum();
        let (fee, balance) = (state.fee, state.balance);
        if total + fee > balance {
            return Err(PayoutError::CoinRpc("-6: Insufficient funds".to_string()));
        }
        match state.send_failure {
            Some(SendFailure::Rejected) => {
                return Err(PayoutError::CoinRpc("-4: Transaction creation failed".to_string()));
            }
            Some(SendFailure::AfterDebit) => {
                state.balance = balance - (total + fee);
                return Err(PayoutError::CoinRpc("connection reset while sending".to_string()));
            }
            None => {}
        }
        state.balance = balance - (total + fee);
        state.next_tx += 1;
        let txid = format!("{:064x}", state.next_tx);
        let tx = CoinTransaction { txid: txid.clone(), fee, confirmations: 0 };
        state.transactions.insert(txid.clone(), tx.clone());
        state.sends.push(amounts.clone());
        Ok((txid, tx))
    }

    async fn get_transaction(&self, txid: &str) -> Result<CoinTransaction, PayoutError> {
        self.poke_rpc().await?;
        self.state
            .lock()
            .await
            .transactions
            .get(txid)
            .cloned()
            .ok_or_else(|| PayoutError::CoinRpc(format!("-5: Invalid or non-wallet transaction id {}", txid)))
    }

    fn account(&self) -> &str {
        &self.account
    }
}
