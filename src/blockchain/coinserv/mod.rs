//! Coinserver (wallet daemon) integration.

pub mod client;

pub use client::CoinservClient;
