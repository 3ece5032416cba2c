pub mod manager;
pub mod payout_client;
pub mod scheduler;

pub use manager::{JobReport, PayoutManager};
pub use payout_client::{PayoutClient, PullSummary, SendOutcome, TradeRequests};
pub use scheduler::{Job, Schedule, Scheduler};
