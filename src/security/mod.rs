//! Payload signing for the SC server and log redaction helpers.

pub mod redaction;
pub mod signing;

pub use redaction::{redact_body, redact_url};
pub use signing::{SignatureError, TimedSerializer};
