//! CLI command implementations

pub mod parse;
pub mod snapshots;
pub mod store;
pub mod watch;
