pub mod config;
pub mod errors;
pub mod logging;
pub mod validation;

pub use config::{AppConfig, CoinservConfig, ConfigError, CurrencyConfig, ScRpcClientConfig};
pub use errors::PayoutError;
