//! # Strategy Library
//!
//! This crate defines the universal `Strategy` trait that the scheduler drives
//! and provides concrete, indicator-driven implementations.
//!
//! ## Architectural Principles
//!
//! - **Pure Logic:** Strategies have no knowledge of execution. They look at a
//!   `DataWindow` and answer with a `Decision` made of `OrderIntent`s.
//! - **Explicit Collaborators:** Broker access and the observation stream are
//!   injected through `StrategyDeps`, selected by configuration flags.
//! - **Explicit State Lifetime:** `refresh_features` consumes only the part of a
//!   window not seen before, so the same strategy code is correct whether the
//!   scheduler keeps one instance for the run or builds one per poll
//!   (`StateLifetime`).
//! - **Extensibility:** Adding a new strategy involves creating a new module, implementing
//!   the `Strategy` trait, and adding it to the `StrategyId` enum and `factory`.
//!
//! ## Public API
//!
//! - `Strategy`: The core trait all strategies implement.
//! - `DataWindow`, `Decision`, `StrategyDeps`, `ShutdownContext`, `ShutdownAction`.
//! - `create_strategy`: The factory function to construct a strategy instance.
//! - The concrete strategy structs themselves (`MACrossover`, `Breakout`).

pub mod breakout;
pub mod context;
pub mod error;
pub mod factory;
pub mod ma_crossover;

pub use breakout::Breakout;
pub use context::{
    BrokerView, DataWindow, Decision, ObservationStream, ShutdownAction, ShutdownContext,
    StateLifetime, StrategyDeps,
};
pub use error::StrategyError;
pub use factory::create_strategy;
pub use ma_crossover::MACrossover;

pub use configuration::StrategyId;

use rust_decimal::prelude::*;

/// The core trait that all trading strategies must implement.
///
/// The scheduler calls `refresh_features` and then `generate` once per
/// observation the bot is allowed to see. The `&mut self` lets strategies keep
/// indicator state between calls; the `Send + Sync` bounds let continuous mode
/// move each bot onto its own task.
pub trait Strategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Brings derived features up to date with `window`. Only observations
    /// newer than the last one consumed should be folded in.
    fn refresh_features(&mut self, window: &DataWindow<'_>) -> Result<(), StrategyError> {
        let _ = window;
        Ok(())
    }

    /// Decides what to do at `window.now()`.
    fn generate(&mut self, window: &DataWindow<'_>) -> Result<Decision, StrategyError>;

    /// Runs once when the bot terminates.
    fn shutdown(&mut self, ctx: &ShutdownContext) -> Vec<ShutdownAction> {
        let _ = ctx;
        Vec::new()
    }
}

// The `ta` crate uses `f64`. We must convert from our high-precision `Decimal`.
// This is a controlled and accepted precision trade-off for using the library.
pub(crate) fn to_f64(value: Decimal) -> Result<f64, StrategyError> {
    value
        .to_f64()
        .ok_or_else(|| StrategyError::IndicatorError(format!("{value} does not fit in f64")))
}

pub(crate) fn from_f64(value: f64) -> Result<Decimal, StrategyError> {
    Decimal::from_f64(value)
        .ok_or_else(|| StrategyError::IndicatorError(format!("{value} is not a finite decimal")))
}
