//! Payout workflow for one currency.
//!
//! Moves payouts through their lifecycle: pulled from SC, locked while a
//! `sendmany` is in flight, paid (txid recorded), then associated back on
//! SC. Every operation takes a `simulate` flag; simulated runs read from SC
//! and the coinserver but never write the local store and never post
//! changes to SC.

use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::blockchain::address::is_valid_for;
use crate::blockchain::coinserv::client::amount_to_json;
use crate::blockchain::{CoinRpc, CoinservClient};
use crate::core::config::{CurrencyConfig, ScRpcClientConfig};
use crate::core::errors::PayoutError;
use crate::network::ScClient;
use crate::storage::{NewPayout, Payout, PayoutStorage};
use crate::tools::table::{format_pids, render_grid, titled_grid};

const COIN_DECIMALS: u32 = 8;
const DUMP_HEADERS: [&str; 7] = ["pid", "user", "address", "amount", "associated", "locked", "txid"];
const TRADE_HEADERS: [&str; 4] = ["tr_id", "currency", "quantity", "type"];
/// Status SC uses for a completed trade request.
const TRADE_STATUS_COMPLETE: u8 = 6;

/// Counts from one `pull_payouts` run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullSummary {
    pub new: usize,
    pub repeat: usize,
    pub invalid: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SendOutcome {
    /// Coinserver did not answer; nothing was touched.
    Skipped,
    NothingToPay,
    /// Dry run; the outputs that would have been sent.
    Simulated { outputs: BTreeMap<String, Decimal>, total: Decimal },
    Sent { txid: String, fee: Decimal, payout_ids: Vec<i64> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
    Buy,
    Sell,
}

impl TradeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeKind::Buy => "buy",
            TradeKind::Sell => "sell",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeRequest {
    pub id: i64,
    pub currency: String,
    pub quantity: Decimal,
    pub kind: TradeKind,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeRequests {
    pub buy: Vec<TradeRequest>,
    pub sell: Vec<TradeRequest>,
}

impl TradeRequests {
    pub fn render(&self, currency_code: &str) -> String {
        let rows = |trs: &[TradeRequest]| -> Vec<Vec<String>> {
            trs.iter()
                .map(|tr| {
                    vec![
                        tr.id.to_string(),
                        tr.currency.clone(),
                        tr.quantity.to_string(),
                        tr.kind.as_str().to_string(),
                    ]
                })
                .collect()
        };
        format!(
            "{}{}",
            titled_grid(&format!("Open {} sell requests", currency_code), &TRADE_HEADERS, &rows(&self.sell)),
            titled_grid(&format!("Open {} buy requests", currency_code), &TRADE_HEADERS, &rows(&self.buy)),
        )
    }
}

pub struct PayoutClient {
    currency: CurrencyConfig,
    sc: ScClient,
    coin: Arc<dyn CoinRpc>,
    storage: PayoutStorage,
}

impl PayoutClient {
    pub fn new(
        currency: CurrencyConfig,
        sc: ScClient,
        coin: Arc<dyn CoinRpc>,
        storage: PayoutStorage,
    ) -> Self {
        Self { currency, sc, coin, storage }
    }

    /// Build the coinserver and SC clients and open the currency's database.
    pub async fn connect(
        sc_config: &ScRpcClientConfig,
        currency: &CurrencyConfig,
    ) -> Result<Self, PayoutError> {
        let coin = CoinservClient::new(currency)?;
        let sc = ScClient::new(sc_config)?;
        let path = currency.database_path(sc_config);
        let storage = PayoutStorage::open(&path, &currency.currency_code).await?;
        Ok(Self::new(currency.clone(), sc, Arc::new(coin), storage))
    }

    pub fn currency_code(&self) -> &str {
        &self.currency.currency_code
    }

    pub fn storage(&self) -> &PayoutStorage {
        &self.storage
    }

    fn announce_simulation(&self, simulate: bool) {
        if simulate {
            info!(currency = %self.currency_code(), "{} Simulation mode {}", "#".repeat(20), "#".repeat(20));
        }
    }

    /// Fetch unpaid payouts from SC and store the new, valid ones.
    pub async fn pull_payouts(&self, simulate: bool) -> Result<PullSummary, PayoutError> {
        self.announce_simulation(simulate);
        let code = self.currency_code();

        let response = match self.sc.post("get_payouts", &json!({ "currency": code })).await {
            Ok(response) => response,
            Err(PayoutError::Network(e)) => {
                warn!(currency = %code, error = %e, "Unable to connect to SC");
                return Ok(PullSummary::default());
            }
            Err(e) => return Err(e),
        };

        let rows = match response.get("pids") {
            Some(Value::Array(rows)) => rows.clone(),
            Some(Value::Null) => Vec::new(),
            _ => return Err(PayoutError::Remote("get_payouts response has no pids".to_string())),
        };
        if rows.is_empty() {
            info!(currency = %code, "No payouts to process");
            return Ok(PullSummary::default());
        }

        let mut summary = PullSummary::default();
        let now = chrono::Utc::now();
        for row in &rows {
            let payout = match parse_payout_row(row) {
                Some(payout) => payout,
                None => {
                    warn!(currency = %code, row = %row, "Ignoring malformed payout row");
                    summary.invalid += 1;
                    continue;
                }
            };

            if !is_valid_for(&payout.address, &self.currency.valid_address_versions) {
                warn!(
                    currency = %code,
                    pid = %payout.pid,
                    address = %payout.address,
                    versions = ?self.currency.valid_address_versions,
                    "Ignoring payout due to invalid address"
                );
                summary.invalid += 1;
                continue;
            }

            if self.storage.payout_exists(&payout.pid).await? {
                debug!(currency = %code, pid = %payout.pid, "Ignoring payout that already exists locally");
                summary.repeat += 1;
                continue;
            }

            if !simulate && !self.storage.insert_payout(&payout, now).await? {
                summary.repeat += 1;
                continue;
            }
            summary.new += 1;
        }

        info!(
            currency = %code,
            new = summary.new,
            repeat = summary.repeat,
            invalid = summary.invalid,
            "Pulled payouts from SC"
        );
        Ok(summary)
    }

    /// Pay every unpaid, unlocked payout in a single `sendmany`.
    ///
    /// `limit` caps the number of distinct addresses per transaction and
    /// falls back to the currency's `payout_output_limit`.
    pub async fn send_payout(
        &self,
        simulate: bool,
        limit: Option<usize>,
    ) -> Result<SendOutcome, PayoutError> {
        self.announce_simulation(simulate);
        let code = self.currency_code().to_string();
        let limit = limit.unwrap_or(self.currency.payout_output_limit);

        if let Err(e) = self.coin.poke_rpc().await {
            warn!(currency = %code, error = %e, "Error while trying to get info from the coinserver");
            return Ok(SendOutcome::Skipped);
        }

        let payouts = self.storage.unpaid_unlocked().await?;
        if payouts.is_empty() {
            info!(currency = %code, "No payouts to process");
            return Ok(SendOutcome::NothingToPay);
        }

        let mut per_address: BTreeMap<String, (Decimal, Vec<&Payout>)> = BTreeMap::new();
        for payout in &payouts {
            let amount = payout.amount()?;
            let entry = per_address.entry(payout.address.clone()).or_default();
            entry.0 += amount;
            entry.1.push(payout);
        }

        let mut outputs: BTreeMap<String, Decimal> = BTreeMap::new();
        let mut selected: Vec<&Payout> = Vec::new();
        let mut summary_rows = Vec::new();
        for (index, (address, (amount, members))) in per_address.iter().enumerate() {
            let amount = amount.round_dp(COIN_DECIMALS);
            if amount < self.currency.minimum_tx_output {
                warn!(
                    currency = %code,
                    address = %address,
                    amount = %amount,
                    minimum = %self.currency.minimum_tx_output,
                    "Removing address below the network output minimum"
                );
                continue;
            }
            if index >= limit {
                warn!(currency = %code, address = %address, limit, "Removing address beyond the output limit");
                continue;
            }
            let pids: Vec<String> = members.iter().map(|p| p.pid.clone()).collect();
            summary_rows.push(vec![address.clone(), amount.to_string(), format_pids(&pids)]);
            outputs.insert(address.clone(), amount);
            selected.extend(members.iter().copied());
        }

        let total: Decimal = outputs.values().copied().sum();
        let account = self.coin.account().to_string();
        let balance = self.coin.get_balance(&account).await?;
        info!(currency = %code, account = %account, balance = %balance, total = %total, "Checked payout wallet");

        if balance < total {
            error!(currency = %code, balance = %balance, total = %total, "Payout wallet is out of funds");
            return Err(PayoutError::InsufficientFunds(format!(
                "{} balance {} is below payout total {}",
                code, balance, total
            )));
        }
        if total.is_zero() {
            info!(currency = %code, "Paying out 0 funds, aborting");
            return Ok(SendOutcome::NothingToPay);
        }

        info!(
            "Address payment summary\n{}",
            render_grid(&["Address", "Total", "Pids"], &summary_rows)
        );

        if simulate {
            return Ok(SendOutcome::Simulated { outputs, total });
        }

        let ids: Vec<i64> = selected.iter().map(|p| p.id).collect();
        self.storage.lock_payouts(&ids).await?;

        let (txid, tx) = match self.coin.send_many(&account, &outputs).await {
            Ok(sent) => sent,
            Err(send_err) => {
                warn!(currency = %code, error = %send_err, "sendmany failed");
                return Err(self.recover_failed_send(&account, balance, &ids, send_err).await);
            }
        };

        if let Err(e) = self.storage.mark_paid(&ids, &txid).await {
            error!(
                currency = %code,
                txid = %txid,
                error = %e,
                "Payout sent but not recorded; payouts stay locked, use local-associate-all-locked with this txid"
            );
            return Err(e.into());
        }
        info!(currency = %code, txid = %txid, count = ids.len(), "Updated local payouts with txid");
        Ok(SendOutcome::Sent { txid, fee: tx.fee, payout_ids: ids })
    }

    /// Decide whether locked payouts can be released after a failed send.
    async fn recover_failed_send(
        &self,
        account: &str,
        balance_before: Decimal,
        ids: &[i64],
        send_err: PayoutError,
    ) -> PayoutError {
        let code = self.currency_code();
        match self.coin.get_balance(account).await {
            Ok(balance_after) if balance_after == balance_before => {
                error!(currency = %code, "RPC error occurred and wallet balance didn't change, unlocking payouts");
                if let Err(e) = self.storage.unlock_payouts(ids).await {
                    return e.into();
                }
            }
            Ok(balance_after) => {
                error!(
                    currency = %code,
                    before = %balance_before,
                    after = %balance_after,
                    "RPC error occurred and wallet balance changed! Keeping the payouts locked. \
                     dump-incomplete shows the locked entries; if no double payout happened, \
                     reset-all-locked releases them"
                );
            }
            Err(e) => {
                error!(currency = %code, error = %e, "Cannot re-read wallet balance, keeping the payouts locked");
            }
        }
        send_err
    }

    /// Push every paid, unassociated txid to SC. Returns how many txids SC accepted.
    pub async fn associate_all(&self, simulate: bool) -> Result<usize, PayoutError> {
        self.announce_simulation(simulate);
        let code = self.currency_code();

        let mut by_txid: BTreeMap<String, Vec<Payout>> = BTreeMap::new();
        for payout in self.storage.paid_unassociated().await? {
            if let Some(txid) = payout.txid.clone() {
                by_txid.entry(txid).or_default().push(payout);
            }
        }

        let mut associated = 0;
        for (txid, payouts) in &by_txid {
            let fee = match self.coin.get_transaction(txid).await {
                Ok(tx) => tx.fee,
                Err(e) => {
                    warn!(currency = %code, txid = %txid, error = %e, "Skipping transaction, lookup failed in the wallet");
                    continue;
                }
            };
            if self.associate(txid, payouts, fee, simulate).await? {
                associated += 1;
            }
        }
        Ok(associated)
    }

    /// Tell SC that `txid` paid `payouts`, and mark them associated on success.
    pub async fn associate(
        &self,
        txid: &str,
        payouts: &[Payout],
        fee: Decimal,
        simulate: bool,
    ) -> Result<bool, PayoutError> {
        let code = self.currency_code();
        let pids: Vec<&str> = payouts.iter().map(|p| p.pid.as_str()).collect();
        info!(currency = %code, txid = %txid, count = payouts.len(), "Trying to associate payouts");

        let data = json!({
            "coin_txid": txid,
            "pids": pids,
            "tx_fee": amount_to_json(fee)?,
            "currency": code,
        });
        if simulate {
            info!("Simulating, not posting association to SC");
            return Ok(false);
        }

        let response = self.sc.post("associate_payouts", &data).await?;
        if is_truthy(response.get("result")) {
            let ids: Vec<i64> = payouts.iter().map(|p| p.id).collect();
            self.storage.mark_associated(&ids).await?;
            info!(currency = %code, txid = %txid, "Received success response from the server");
            Ok(true)
        } else {
            error!(currency = %code, txid = %txid, "Failed to push association information");
            Ok(false)
        }
    }

    /// Confirm SC's unconfirmed transactions that have enough confirmations.
    /// Returns the txids found confirmed.
    pub async fn confirm_trans(&self, simulate: bool) -> Result<Vec<String>, PayoutError> {
        let code = self.currency_code();
        info!(currency = %code, "Attempting to grab unconfirmed transactions from SC");
        if let Err(e) = self.coin.poke_rpc().await {
            warn!(currency = %code, error = %e, "Error while trying to get info from the coinserver");
            return Ok(Vec::new());
        }

        let filter = json!({ "confirmed": false, "currency": code }).to_string();
        let response = self.sc.get("api/transaction", &[("__filter_by", filter.as_str())]).await?;
        if !is_truthy(response.get("success")) {
            error!(currency = %code, response = %response, "Failure grabbing unconfirmed transactions");
            return Ok(Vec::new());
        }

        let objects = response.get("objects").and_then(Value::as_array).cloned().unwrap_or_default();
        if objects.is_empty() {
            info!(currency = %code, "No transactions were returned to confirm");
            return Ok(Vec::new());
        }

        let mut tids = Vec::new();
        for object in &objects {
            let Some(txid) = object.get("txid").and_then(Value::as_str) else {
                warn!(currency = %code, object = %object, "Transaction object without txid");
                continue;
            };
            let tx = match self.coin.get_transaction(txid).await {
                Ok(tx) => tx,
                Err(e) => {
                    warn!(currency = %code, txid = %txid, error = %e, "Cannot look up transaction");
                    continue;
                }
            };
            if tx.confirmations > i64::from(self.currency.min_confirms) {
                info!(currency = %code, txid = %txid, confirmations = tx.confirmations, "Confirmed txid");
                tids.push(txid.to_string());
            } else {
                info!(
                    currency = %code,
                    txid = %txid,
                    "TX not yet confirmed, {}/{} confirms",
                    tx.confirmations,
                    self.currency.min_confirms
                );
            }
        }

        if simulate {
            info!("Simulating, not posting confirmations to SC");
            return Ok(tids);
        }
        if tids.is_empty() {
            return Ok(tids);
        }

        let response = self.sc.post("confirm_transactions", &json!({ "tids": tids })).await?;
        if is_truthy(response.get("result")) {
            info!(currency = %code, count = tids.len(), "Successfully confirmed transactions");
            Ok(tids)
        } else {
            error!(currency = %code, "Failed to push confirmation information");
            Err(PayoutError::Remote("confirm_transactions was rejected".to_string()))
        }
    }

    /// Open trade requests for this currency, split into buys and sells.
    pub async fn get_open_trade_requests(&self) -> Result<TradeRequests, PayoutError> {
        let code = self.currency_code();
        let response = match self.sc.post("get_trade_requests", &Value::String(String::new())).await {
            Ok(response) => response,
            Err(PayoutError::Network(e)) => {
                warn!(currency = %code, error = %e, "Unable to connect to SC");
                return Ok(TradeRequests::default());
            }
            Err(e) => return Err(e),
        };

        let rows = response.get("trs").and_then(Value::as_array).cloned().unwrap_or_default();
        if rows.is_empty() {
            info!(currency = %code, "No trade requests returned from SC");
        }

        let mut parsed = Vec::with_capacity(rows.len());
        for row in &rows {
            match parse_trade_row(row) {
                Some(tr) => parsed.push(tr),
                None => {
                    warn!(row = %row, "Invalid trade request format returned from get_trade_requests");
                    return Ok(TradeRequests::default());
                }
            }
        }

        let mut requests = TradeRequests::default();
        for tr in parsed.into_iter().filter(|tr| tr.currency == code) {
            match tr.kind {
                TradeKind::Buy => requests.buy.push(tr),
                TradeKind::Sell => requests.sell.push(tr),
            }
        }
        info!(currency = %code, sell = requests.sell.len(), buy = requests.buy.len(), "Got trade requests from SC");
        Ok(requests)
    }

    /// Mark a trade request complete on SC. Returns whether SC acknowledged it.
    pub async fn close_trade_request(
        &self,
        tr_id: i64,
        quantity: Decimal,
        fees: Decimal,
        simulate: bool,
    ) -> Result<bool, PayoutError> {
        self.announce_simulation(simulate);
        let mut trs = serde_json::Map::new();
        trs.insert(
            tr_id.to_string(),
            json!({
                "status": TRADE_STATUS_COMPLETE,
                "quantity": quantity.to_string(),
                "fees": fees.to_string(),
            }),
        );
        let trs = Value::Object(trs);

        if simulate {
            info!(trs = %trs, "Simulating, would have posted trade request update");
            return Ok(false);
        }

        let response = self
            .sc
            .post("update_trade_requests", &json!({ "update": true, "trs": trs }))
            .await?;
        if response.get("success").is_some() {
            info!(tr_id, "Successfully posted updated trade request to SC");
            Ok(true)
        } else {
            warn!(trs = %trs, "Failed posting trade request update");
            Ok(false)
        }
    }

    /// Attach `txid` to one unpaid, locked payout by local id.
    pub async fn local_associate_locked(
        &self,
        id: i64,
        txid: &str,
        simulate: bool,
    ) -> Result<bool, PayoutError> {
        info!(currency = %self.currency_code(), id, txid = %txid, "Associating locked payout with txid");
        if simulate {
            let found = matches!(
                self.storage.get_payout(id).await?,
                Some(p) if p.locked && p.txid.is_none()
            );
            return Ok(found);
        }
        let updated = self.storage.local_associate_locked(id, txid).await?;
        if !updated {
            return Err(PayoutError::NotFound(format!("no unpaid locked payout with id {}", id)));
        }
        Ok(true)
    }

    pub async fn local_associate_all_locked(
        &self,
        txid: &str,
        simulate: bool,
    ) -> Result<u64, PayoutError> {
        let locked = self.storage.unpaid_locked().await?.len() as u64;
        info!(currency = %self.currency_code(), count = locked, txid = %txid, "Associating locked payouts with txid");
        if simulate {
            return Ok(locked);
        }
        Ok(self.storage.local_associate_all_locked(txid).await?)
    }

    pub async fn reset_all_locked(&self, simulate: bool) -> Result<u64, PayoutError> {
        let locked = self.storage.count_locked().await? as u64;
        info!(currency = %self.currency_code(), count = locked, "Resetting locked payouts");
        if simulate {
            return Ok(locked);
        }
        Ok(self.storage.reset_all_locked().await?)
    }

    pub async fn init_db(&self, simulate: bool) -> Result<(), PayoutError> {
        if simulate {
            info!(currency = %self.currency_code(), "Simulating, payouts table left alone");
            return Ok(());
        }
        Ok(self.storage.init_db().await?)
    }

    /// Locked, paid-but-unassociated and ready payouts as grids.
    pub async fn dump_incomplete(&self) -> Result<String, PayoutError> {
        let code = self.currency_code();
        let mut out = String::new();
        out.push_str(&dump_table(&format!("Unpaid locked {} payouts", code), &self.storage.unpaid_locked().await?));
        out.push('\n');
        out.push_str(&dump_table(
            &format!("Paid un-associated {} payouts", code),
            &self.storage.paid_unassociated().await?,
        ));
        out.push('\n');
        out.push_str(&dump_table(
            &format!("{} payouts ready to payout", code),
            &self.storage.unpaid_unlocked().await?,
        ));
        Ok(out)
    }

    pub async fn dump_complete(&self) -> Result<String, PayoutError> {
        let title = format!("Paid + associated {} payouts", self.currency_code());
        Ok(dump_table(&title, &self.storage.completed().await?))
    }
}

fn dump_table(title: &str, payouts: &[Payout]) -> String {
    let rows: Vec<Vec<String>> = payouts
        .iter()
        .map(|p| {
            vec![
                p.pid.clone(),
                p.user.clone(),
                p.address.clone(),
                p.amount.clone(),
                p.associated.to_string(),
                p.locked.to_string(),
                p.trans_id().to_string(),
            ]
        })
        .collect();
    titled_grid(title, &DUMP_HEADERS, &rows)
}

fn is_truthy(value: Option<&Value>) -> bool {
    match value {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(o)) => !o.is_empty(),
        Some(Value::Null) | None => false,
    }
}

/// Amounts arrive either as strings or JSON numbers.
fn parse_decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text).or_else(|_| Decimal::from_scientific(&text)).ok()
        }
        _ => None,
    }
}

/// `[user, address, amount, pid]`
fn parse_payout_row(row: &Value) -> Option<NewPayout> {
    let fields = row.as_array()?;
    let [user, address, amount, pid] = fields.as_slice() else {
        return None;
    };
    let pid = match pid {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    Some(NewPayout {
        pid,
        user: user.as_str()?.to_string(),
        address: address.as_str()?.to_string(),
        amount: parse_decimal(amount)?,
    })
}

/// `[id, currency, quantity, "buy" | "sell"]`
fn parse_trade_row(row: &Value) -> Option<TradeRequest> {
    let fields = row.as_array()?;
    let [id, currency, quantity, kind] = fields.as_slice() else {
        return None;
    };
    let kind = match kind.as_str()? {
        "buy" => TradeKind::Buy,
        "sell" => TradeKind::Sell,
        _ => return None,
    };
    Some(TradeRequest {
        id: id.as_i64()?,
        currency: currency.as_str()?.to_string(),
        quantity: parse_decimal(quantity)?,
        kind,
    })
}
