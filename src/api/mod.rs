//! Polymarket API clients for position data and trade execution.

mod clob_client;
mod data_client;
mod dry_run;
mod types;

pub use clob_client::{ClobClient, ClobCredentials};
pub use data_client::{DataClient, DATA_API_BASE};
pub use dry_run::DryRunExecutor;
