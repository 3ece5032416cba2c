use anyhow::Result;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Map the operator-facing level names (`DEBUG`, `INFO`, `WARN`, `ERROR`)
/// onto a tracing filter directive.
pub fn level_directive(level: &str) -> Result<&'static str> {
    match level.to_ascii_uppercase().as_str() {
        "DEBUG" => Ok("debug"),
        "INFO" => Ok("info"),
        "WARN" | "WARNING" => Ok("warn"),
        "ERROR" => Ok("error"),
        other => Err(anyhow::anyhow!("unknown log level '{}'", other)),
    }
}

/// Install the global subscriber. `RUST_LOG` wins over `level` when set.
/// Logs go to stderr so table output on stdout stays clean.
pub fn init_logging(level: &str) -> Result<()> {
    let directive = level_directive(level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=info,h2=info,sqlx=warn", directive)));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_max_level(tracing::Level::TRACE)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}
