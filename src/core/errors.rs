use thiserror::Error;

/// Error type for payout client operations.
#[derive(Debug, Error)]
pub enum PayoutError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),
    /// Local payout database errors.
    #[error("Storage error: {0}")]
    Storage(String),
    /// Coinserver JSON-RPC errors (transport or RPC error object).
    #[error("Coinserver RPC error: {0}")]
    CoinRpc(String),
    /// Could not reach the SC server.
    #[error("Network error: {0}")]
    Network(String),
    /// SC server answered with a non-200 status or an unexpected body.
    #[error("Remote error: {0}")]
    Remote(String),
    /// Signed payload failed verification or expired.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// Destination address does not match the currency's version bytes.
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    /// Payout wallet cannot cover the payout total.
    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),
    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Resource not found errors.
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Error: {0}")]
    Other(String),
}

impl PayoutError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::Other(message.into())
    }

    /// True for failures that a later scheduled run may get past.
    pub fn is_retryable(&self) -> bool {
        matches!(self, PayoutError::Network(_) | PayoutError::CoinRpc(_))
    }
}

impl From<anyhow::Error> for PayoutError {
    fn from(err: anyhow::Error) -> Self {
        PayoutError::Storage(err.to_string())
    }
}

impl From<sqlx::Error> for PayoutError {
    fn from(err: sqlx::Error) -> Self {
        PayoutError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for PayoutError {
    fn from(err: serde_json::Error) -> Self {
        PayoutError::Serialization(err.to_string())
    }
}

impl From<crate::security::signing::SignatureError> for PayoutError {
    fn from(err: crate::security::signing::SignatureError) -> Self {
        PayoutError::InvalidSignature(err.to_string())
    }
}
