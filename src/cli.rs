use clap::{Args, Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Flags shared by both binaries.
#[derive(Debug, Clone, Args)]
pub struct GlobalArgs {
    /// Log level; overrides `sc_rpc_client.log_level`
    #[arg(short = 'l', long = "log-level", value_parser = ["DEBUG", "INFO", "WARN", "ERROR"])]
    pub log_level: Option<String>,

    /// Path to the YAML configuration file
    #[arg(short = 'c', long = "config", default_value = "config.yml")]
    pub config: PathBuf,

    /// Read-only dry run: nothing is stored locally or posted to SC
    #[arg(short = 's', long = "simulate")]
    pub simulate: bool,
}

/// Scheduler daemon
#[derive(Debug, Parser)]
#[command(name = "simplecoin_rpc_scheduler", about = "SimpleCoin payout scheduler", version)]
pub struct SchedulerCli {
    #[command(flatten)]
    pub global: GlobalArgs,
}

/// One-shot management commands
#[derive(Debug, Parser)]
#[command(name = "simplecoin_rpc", about = "SimpleCoin payout client", version, disable_help_subcommand = true)]
pub struct ManagerCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Currency code to operate on; multi-currency commands run for every
    /// enabled currency when omitted
    #[arg(short = 'C', long = "currency")]
    pub currency: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Pull new payouts from SC
    PullPayouts,
    /// Pay out every ready payout
    SendPayout {
        /// Maximum number of addresses in the transaction
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Report paid transactions to SC
    AssociateAll,
    /// Confirm SC's unconfirmed transactions that have enough confirmations
    ConfirmTrans,
    /// Show open trade requests
    TradeRequests,
    /// Mark a trade request as complete on SC
    CloseTradeRequest {
        id: i64,
        quantity: Decimal,
        fees: Decimal,
    },
    /// Attach a txid to one unpaid locked payout
    LocalAssociateLocked {
        id: i64,
        txid: String,
    },
    /// Attach a txid to every unpaid locked payout
    LocalAssociateAllLocked {
        txid: String,
    },
    /// Unlock every locked payout
    ResetAllLocked,
    /// Drop and recreate the payout database
    InitDb,
    /// Show locked, unassociated and ready payouts
    DumpIncomplete,
    /// Show paid and associated payouts
    DumpComplete,
    /// Validate the configuration file and exit
    CheckConfig,
}

impl Commands {
    /// Commands that may run across all enabled currencies.
    pub fn is_multi_currency(&self) -> bool {
        matches!(
            self,
            Commands::PullPayouts
                | Commands::SendPayout { limit: None }
                | Commands::AssociateAll
                | Commands::ConfirmTrans
                | Commands::InitDb
                | Commands::DumpIncomplete
                | Commands::DumpComplete
                | Commands::CheckConfig
        )
    }
}
