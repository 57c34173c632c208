#![recursion_limit = "256"]

pub mod config;
pub mod context;
pub mod db_migration;
pub mod domains;
pub mod errors;
pub mod validation;

pub use config::{TransferConfig, TransferLimits};
pub use context::{init_logging, TransferContext};
