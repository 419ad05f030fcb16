pub mod key;
pub mod message;
pub mod millis;
pub mod usage;

pub use key::ApiKey;
pub use message::{Request, Response};
pub use usage::{UsageEntry, UsageRecord};
