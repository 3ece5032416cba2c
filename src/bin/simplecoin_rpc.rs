use anyhow::{bail, Context};
use clap::Parser;
use simplecoin_rpc_client::cli::{Commands, ManagerCli};
use simplecoin_rpc_client::core::config::AppConfig;
use simplecoin_rpc_client::core::logging::init_logging;
use simplecoin_rpc_client::service::{JobReport, PayoutClient, PayoutManager, SendOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = ManagerCli::parse();
    let config = AppConfig::load(&cli.global.config)
        .with_context(|| format!("loading {}", cli.global.config.display()))?;

    let level = cli.global.log_level.clone().unwrap_or_else(|| config.sc_rpc_client.log_level.clone());
    init_logging(&level)?;
    let simulate = cli.global.simulate;

    if let Commands::CheckConfig = cli.command {
        let enabled: Vec<&str> = config.enabled_currencies().map(|c| c.currency_code.as_str()).collect();
        println!(
            "Configuration OK: {} currencies, enabled: [{}]",
            config.currencies.len(),
            enabled.join(", ")
        );
        return Ok(());
    }

    match cli.currency.as_deref() {
        Some(code) => {
            let currency = config
                .currency(code)
                .with_context(|| format!("currency {} is not configured", code))?;
            if !currency.enabled {
                bail!("currency {} is not enabled", code);
            }
            let client = PayoutClient::connect(&config.sc_rpc_client, currency).await?;
            run_single(&client, cli.command, simulate).await
        }
        None if cli.command.is_multi_currency() => {
            let manager = PayoutManager::from_config(&config, simulate).await?;
            run_all(&manager, cli.command).await
        }
        None => bail!("this command needs a currency, pass -C <CODE>"),
    }
}

async fn run_single(client: &PayoutClient, command: Commands, simulate: bool) -> anyhow::Result<()> {
    match command {
        Commands::PullPayouts => {
            let s = client.pull_payouts(simulate).await?;
            println!("new: {}, repeat: {}, invalid: {}", s.new, s.repeat, s.invalid);
        }
        Commands::SendPayout { limit } => match client.send_payout(simulate, limit).await? {
            SendOutcome::Skipped => println!("Coinserver unreachable, nothing sent"),
            SendOutcome::NothingToPay => println!("Nothing to pay"),
            SendOutcome::Simulated { outputs, total } => {
                println!("Would send {} to {} addresses", total, outputs.len())
            }
            SendOutcome::Sent { txid, fee, payout_ids } => {
                println!("Sent txid {} (fee {}) paying {} payouts", txid, fee, payout_ids.len());
                let associated = client.associate_all(simulate).await?;
                println!("Associated {} transactions with SC", associated);
            }
        },
        Commands::AssociateAll => {
            let n = client.associate_all(simulate).await?;
            println!("Associated {} transactions with SC", n);
        }
        Commands::ConfirmTrans => {
            let tids = client.confirm_trans(simulate).await?;
            println!("Confirmed {} transactions", tids.len());
        }
        Commands::TradeRequests => {
            let requests = client.get_open_trade_requests().await?;
            print!("{}", requests.render(client.currency_code()));
        }
        Commands::CloseTradeRequest { id, quantity, fees } => {
            let ok = client.close_trade_request(id, quantity, fees, simulate).await?;
            println!("Trade request {} {}", id, if ok { "closed" } else { "not closed" });
        }
        Commands::LocalAssociateLocked { id, txid } => {
            match client.local_associate_locked(id, &txid, simulate).await? {
                true if simulate => println!("Payout {} would be associated with {}", id, txid),
                true => println!("Payout {} associated with {}", id, txid),
                false => println!("No unpaid locked payout with id {}", id),
            }
        }
        Commands::LocalAssociateAllLocked { txid } => {
            let n = client.local_associate_all_locked(&txid, simulate).await?;
            println!("{} payouts associated with {}", n, txid);
        }
        Commands::ResetAllLocked => {
            let n = client.reset_all_locked(simulate).await?;
            println!("Reset {} locked payouts", n);
        }
        Commands::InitDb => {
            client.init_db(simulate).await?;
            println!("Initialized {} payout database", client.currency_code());
        }
        Commands::DumpIncomplete => print!("{}", client.dump_incomplete().await?),
        Commands::DumpComplete => print!("{}", client.dump_complete().await?),
        Commands::CheckConfig => {}
    }
    Ok(())
}

async fn run_all(manager: &PayoutManager, command: Commands) -> anyhow::Result<()> {
    let report = match command {
        Commands::PullPayouts => manager.pull_payouts().await,
        Commands::SendPayout { .. } => manager.send_payout().await,
        Commands::AssociateAll => manager.associate_all_payouts().await,
        Commands::ConfirmTrans => manager.confirm_payouts().await,
        Commands::InitDb => manager.init_db().await,
        Commands::DumpIncomplete => {
            print!("{}", manager.dump_incomplete().await?);
            return Ok(());
        }
        Commands::DumpComplete => {
            print!("{}", manager.dump_complete().await?);
            return Ok(());
        }
        other => bail!("{:?} needs a currency, pass -C <CODE>", other),
    };
    finish(report)
}

fn finish(report: JobReport) -> anyhow::Result<()> {
    println!("ok: [{}]", report.ok.join(", "));
    if !report.all_ok() {
        bail!("failed for: {}", report.failed.join(", "));
    }
    Ok(())
}
