//! YAML configuration for the payout client.
//!
//! The file has two required sections, `sc_rpc_client` (how to reach and
//! authenticate against the SC payout server) and `currencies` (one entry
//! per coin with its coinserver connection and payout policy). An optional
//! `schedule` section tunes the scheduler.

use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::{logging, validation};

/// Errors that can occur when loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),
    /// Every problem found by [`AppConfig::validate`], in file order.
    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Connection settings for the SC payout server.
#[derive(Debug, Clone, Deserialize)]
pub struct ScRpcClientConfig {
    /// Shared secret used to sign and verify every RPC payload.
    pub rpc_signature: SecretString,
    pub rpc_url: String,

    /// Maximum age (seconds) of a signed response from the server
    #[serde(default = "ScRpcClientConfig::default_max_age")]
    pub max_age: u64,

    #[serde(default = "ScRpcClientConfig::default_timeout_secs")]
    pub timeout_secs: u64,

    /// Prefix of the per-currency sqlite files; `BTC` ends up in `<prefix>BTC.sqlite`
    #[serde(default = "ScRpcClientConfig::default_database_path")]
    pub database_path: String,

    #[serde(default = "ScRpcClientConfig::default_log_level")]
    pub log_level: String,
}

impl ScRpcClientConfig {
    fn default_max_age() -> u64 { 10 }
    fn default_timeout_secs() -> u64 { 270 }
    fn default_database_path() -> String { "./rpc_".to_string() }
    fn default_log_level() -> String { "info".to_string() }
}

/// Coinserver (wallet daemon) connection record.
#[derive(Debug, Clone, Deserialize)]
pub struct CoinservConfig {
    pub port: u16,
    pub address: String,
    pub username: String,
    pub password: SecretString,
    /// Passphrase for encrypted wallets; the wallet is not unlocked when absent.
    #[serde(default)]
    pub wallet_pass: Option<SecretString>,
    /// Wallet account payouts are sent from.
    #[serde(default)]
    pub account: String,
}

impl CoinservConfig {
    /// JSON-RPC endpoint of the coinserver.
    pub fn endpoint(&self) -> String {
        if self.address.starts_with("http://") || self.address.starts_with("https://") {
            format!("{}:{}/", self.address.trim_end_matches('/'), self.port)
        } else {
            format!("http://{}:{}/", self.address, self.port)
        }
    }
}

/// One supported currency.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrencyConfig {
    pub enabled: bool,
    pub currency_code: String,
    pub coinserv: CoinservConfig,
    pub valid_address_versions: Vec<u8>,

    #[serde(default = "CurrencyConfig::default_min_confirms")]
    pub min_confirms: u32,

    /// Fee rate handed to the coinserver before `sendmany`
    #[serde(default)]
    pub tx_fee: Decimal,

    /// Dust threshold: aggregated amounts below this are held back
    #[serde(default = "CurrencyConfig::default_minimum_tx_output")]
    pub minimum_tx_output: Decimal,

    /// Maximum number of distinct addresses in a single `sendmany`
    #[serde(default = "CurrencyConfig::default_payout_output_limit")]
    pub payout_output_limit: usize,
}

impl CurrencyConfig {
    fn default_min_confirms() -> u32 { 12 }
    fn default_minimum_tx_output() -> Decimal { Decimal::new(1, 8) }
    fn default_payout_output_limit() -> usize { 10_000 }

    /// Location of this currency's payout database.
    pub fn database_path(&self, client: &ScRpcClientConfig) -> PathBuf {
        PathBuf::from(format!("{}{}.sqlite", client.database_path, self.currency_code))
    }
}

/// When the scheduler fires each job. Hours are UTC.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default = "ScheduleConfig::default_pull_interval_minutes")]
    pub pull_interval_minutes: u32,
    #[serde(default = "ScheduleConfig::default_payout_hour")]
    pub payout_hour: u32,
    #[serde(default)]
    pub associate_hour: u32,
    #[serde(default = "ScheduleConfig::default_confirm_hour")]
    pub confirm_hour: u32,
}

impl ScheduleConfig {
    fn default_pull_interval_minutes() -> u32 { 1 }
    fn default_payout_hour() -> u32 { 23 }
    fn default_confirm_hour() -> u32 { 1 }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            pull_interval_minutes: Self::default_pull_interval_minutes(),
            payout_hour: Self::default_payout_hour(),
            associate_hour: 0,
            confirm_hour: Self::default_confirm_hour(),
        }
    }
}

/// Top-level configuration document
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub sc_rpc_client: ScRpcClientConfig,
    pub currencies: Vec<CurrencyConfig>,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

impl AppConfig {
    /// Parse a YAML document without validating it.
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Read and parse the YAML file at `path` without validating it.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&contents)
    }

    /// Read, parse and validate.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every schema rule and report all violations at once.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        let client = &self.sc_rpc_client;
        if validation::is_blank_secret(&client.rpc_signature) {
            problems.push("sc_rpc_client.rpc_signature must not be empty".to_string());
        }
        if let Err(e) = validation::validate_rpc_url(&client.rpc_url) {
            problems.push(format!("sc_rpc_client.rpc_url: {}", e));
        }
        if client.max_age == 0 {
            problems.push("sc_rpc_client.max_age must be at least 1 second".to_string());
        }
        if let Err(e) = logging::level_directive(&client.log_level) {
            problems.push(format!("sc_rpc_client.log_level: {}", e));
        }

        let mut seen = HashSet::new();
        for (i, currency) in self.currencies.iter().enumerate() {
            let at = if currency.currency_code.is_empty() {
                format!("currencies[{}]", i)
            } else {
                format!("currencies[{}] ({})", i, currency.currency_code)
            };
            if let Err(e) = validation::validate_currency_code(&currency.currency_code) {
                problems.push(format!("{}: currency_code: {}", at, e));
            } else if !seen.insert(currency.currency_code.clone()) {
                problems.push(format!("{}: duplicate currency_code", at));
            }
            if currency.valid_address_versions.is_empty() {
                problems.push(format!("{}: valid_address_versions must not be empty", at));
            }
            if let Err(e) = validation::validate_port(currency.coinserv.port) {
                problems.push(format!("{}: coinserv.port {}", at, e));
            }
            if currency.coinserv.address.trim().is_empty() {
                problems.push(format!("{}: coinserv.address must not be empty", at));
            }
            if let Err(e) = validation::validate_non_negative("tx_fee", currency.tx_fee) {
                problems.push(format!("{}: {}", at, e));
            }
            if let Err(e) =
                validation::validate_non_negative("minimum_tx_output", currency.minimum_tx_output)
            {
                problems.push(format!("{}: {}", at, e));
            }
            if currency.payout_output_limit == 0 {
                problems.push(format!("{}: payout_output_limit must be at least 1", at));
            }
        }

        let schedule = &self.schedule;
        if schedule.pull_interval_minutes == 0 {
            problems.push("schedule.pull_interval_minutes must be at least 1".to_string());
        }
        for (name, hour) in [
            ("payout_hour", schedule.payout_hour),
            ("associate_hour", schedule.associate_hour),
            ("confirm_hour", schedule.confirm_hour),
        ] {
            if hour > 23 {
                problems.push(format!("schedule.{} must be between 0 and 23, got {}", name, hour));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Enabled currencies in file order.
    pub fn enabled_currencies(&self) -> impl Iterator<Item = &CurrencyConfig> {
        self.currencies.iter().filter(|c| c.enabled)
    }

    pub fn currency(&self, code: &str) -> Option<&CurrencyConfig> {
        self.currencies.iter().find(|c| c.currency_code == code)
    }
}
