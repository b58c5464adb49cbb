//! CLI command handlers.

mod backup;
mod set_consumer_key;

pub use backup::run_backup;
pub use set_consumer_key::run_set_consumer_key;
