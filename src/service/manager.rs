use std::collections::BTreeMap;
use tracing::{error, info};

use crate::core::config::AppConfig;
use crate::core::errors::PayoutError;
use crate::service::payout_client::{PayoutClient, SendOutcome};

/// Currencies a multi-currency job succeeded and failed for.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobReport {
    pub ok: Vec<String>,
    pub failed: Vec<String>,
}

impl JobReport {
    fn record<T>(&mut self, job: &str, code: &str, result: Result<T, PayoutError>) -> Option<T> {
        match result {
            Ok(value) => {
                self.ok.push(code.to_string());
                Some(value)
            }
            Err(e) => {
                error!(job, currency = %code, error = %e, retryable = e.is_retryable(), "Job failed");
                self.failed.push(code.to_string());
                None
            }
        }
    }

    pub fn all_ok(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs payout jobs across every enabled currency, in currency-code order.
pub struct PayoutManager {
    clients: BTreeMap<String, PayoutClient>,
    simulate: bool,
}

impl PayoutManager {
    pub fn new(clients: Vec<PayoutClient>, simulate: bool) -> Self {
        let clients = clients.into_iter().map(|c| (c.currency_code().to_string(), c)).collect();
        Self { clients, simulate }
    }

    pub async fn from_config(config: &AppConfig, simulate: bool) -> Result<Self, PayoutError> {
        let mut clients = Vec::new();
        for currency in config.enabled_currencies() {
            clients.push(PayoutClient::connect(&config.sc_rpc_client, currency).await?);
        }
        info!(currencies = clients.len(), simulate, "Payout manager ready");
        Ok(Self::new(clients, simulate))
    }

    pub fn client(&self, currency_code: &str) -> Option<&PayoutClient> {
        self.clients.get(currency_code)
    }

    pub fn currency_codes(&self) -> impl Iterator<Item = &str> {
        self.clients.keys().map(String::as_str)
    }

    pub async fn pull_payouts(&self) -> JobReport {
        let mut report = JobReport::default();
        for (code, client) in &self.clients {
            report.record("pull_payouts", code, client.pull_payouts(self.simulate).await);
        }
        report
    }

    /// Pay out every currency; a successful send is followed by association.
    pub async fn send_payout(&self) -> JobReport {
        let mut report = JobReport::default();
        for (code, client) in &self.clients {
            let outcome = report.record("send_payout", code, client.send_payout(self.simulate, None).await);
            if let Some(SendOutcome::Sent { txid, .. }) = outcome {
                info!(currency = %code, txid = %txid, "Payout sent, associating with SC");
                if let Err(e) = client.associate_all(self.simulate).await {
                    error!(currency = %code, error = %e, "Association after payout failed");
                }
            }
        }
        report
    }

    pub async fn associate_all_payouts(&self) -> JobReport {
        let mut report = JobReport::default();
        for (code, client) in &self.clients {
            report.record("associate_all", code, client.associate_all(self.simulate).await);
        }
        report
    }

    pub async fn confirm_payouts(&self) -> JobReport {
        let mut report = JobReport::default();
        for (code, client) in &self.clients {
            report.record("confirm_trans", code, client.confirm_trans(self.simulate).await);
        }
        report
    }

    pub async fn init_db(&self) -> JobReport {
        let mut report = JobReport::default();
        for (code, client) in &self.clients {
            report.record("init_db", code, client.init_db(self.simulate).await);
        }
        report
    }

    pub async fn dump_incomplete(&self) -> Result<String, PayoutError> {
        let mut out = String::new();
        for client in self.clients.values() {
            out.push_str(&client.dump_incomplete().await?);
        }
        Ok(out)
    }

    pub async fn dump_complete(&self) -> Result<String, PayoutError> {
        let mut out = String::new();
        for client in self.clients.values() {
            out.push_str(&client.dump_complete().await?);
        }
        Ok(out)
    }
}
