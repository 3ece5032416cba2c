use anyhow::Result;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};

/// Validates the SC server URL: must parse and use http(s).
pub fn validate_rpc_url(url: &str) -> Result<()> {
    let parsed = reqwest::Url::parse(url.trim())
        .map_err(|e| anyhow::anyhow!("invalid URL '{}': {}", url, e))?;
    match parsed.scheme() {
        "http" | "https" => {}
        other => return Err(anyhow::anyhow!("unsupported URL scheme '{}'", other)),
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(anyhow::anyhow!("URL '{}' has no host", url));
    }
    Ok(())
}

pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(anyhow::anyhow!("must be between 1 and 65535"));
    }
    Ok(())
}

/// Amounts in the config (fees, dust thresholds) may be zero but never negative.
pub fn validate_non_negative(name: &str, amount: Decimal) -> Result<()> {
    if amount.is_sign_negative() && !amount.is_zero() {
        return Err(anyhow::anyhow!("{} must not be negative, got {}", name, amount));
    }
    Ok(())
}

pub fn is_blank_secret(secret: &SecretString) -> bool {
    secret.expose_secret().trim().is_empty()
}

/// Currency codes as used in SC: short, uppercase alphanumerics.
pub fn validate_currency_code(code: &str) -> Result<()> {
    if code.is_empty() || code.len() > 10 {
        return Err(anyhow::anyhow!("Invalid currency code length"));
    }
    if !code.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()) {
        return Err(anyhow::anyhow!("Currency code must be uppercase letters or digits"));
    }
    Ok(())
}
