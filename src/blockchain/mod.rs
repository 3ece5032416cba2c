pub mod address;
pub mod coinserv;
pub mod mock;
pub mod traits;

pub use coinserv::CoinservClient;
pub use mock::{MockCoinRpc, SendFailure};
pub use traits::{CoinRpc, CoinTransaction};
