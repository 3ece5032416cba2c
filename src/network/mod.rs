pub mod sc_client;

pub use sc_client::ScClient;
