//! # Multi-Bot Coordinator
//!
//! Deploys one bot per (instrument, strategy) pair from the watch-list, on a
//! shared account ledger or on one isolated ledger per bot, runs them through
//! the scheduler and aggregates the closed-trade histories into a run summary.
//! Market data for all instruments is aligned to common timestamps first.

pub mod data_handler;
pub mod error;
pub mod manager;
pub mod summary;

pub use data_handler::{align_series, load_series, RawSeries};
pub use error::CoordinatorError;
pub use manager::{plan_deployments, Coordinator, Deployment};
pub use summary::{LedgerSummary, RunSummary};
