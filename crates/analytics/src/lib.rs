//! # Analytics Engine
//!
//! Turns a ledger's closed trades and equity curve into performance metrics.
//!
//! ## Architectural Principles
//!
//! - **Pure Logic:** This crate depends only on `core-types`. It never sees a
//!   broker, only the records a broker archives.
//! - **Stateless Calculation:** The `AnalyticsEngine` takes raw trading data as
//!   input and produces a `PerformanceReport` as output.
//!
//! ## Public API
//!
//! - `AnalyticsEngine`: The calculator.
//! - `PerformanceReport`: Ledger-level metrics.
//! - `InstrumentStats`: Per-instrument trade count, win rate and reward/risk.
//! - `AnalyticsError`: The specific error types that can be returned from this crate.

pub mod engine;
pub mod error;
pub mod report;

pub use engine::AnalyticsEngine;
pub use error::AnalyticsError;
pub use report::{InstrumentStats, PerformanceReport};
