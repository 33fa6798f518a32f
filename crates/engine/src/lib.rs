//! # Scheduler
//!
//! Drives bots against virtual brokers. A bot pairs one strategy with one
//! instrument and one broker; the scheduler reveals market data to the
//! brokers and then asks each bot for a decision.
//!
//! ## Modes
//!
//! - **Periodic** ([`PeriodicDriver`]): a single pass over the timeline, one
//!   index position at a time. Used for backtests and for live polling.
//! - **Continuous** ([`ContinuousDriver`]): one task per bot, synchronised by a
//!   [`Clock`]. Every bot must acknowledge a tick before the next one starts,
//!   and each bot watches a [`LivenessCheck`] to know when to stop.
//!
//! Both modes apply the same sequence of broker operations for the same data,
//! so they produce the same fills.

pub mod bot;
pub mod clock;
pub mod continuous;
pub mod error;
pub mod feed;
pub mod liveness;
pub mod periodic;
pub mod window;

pub use bot::{factory_for, Bot, BotEntry, BotRegistry, BotReport, BotSpec, StrategyFactory};
pub use clock::{Clock, SimulatedClock, WallClock};
pub use continuous::ContinuousDriver;
pub use error::EngineError;
pub use feed::SeriesStore;
pub use liveness::{stop_signal, AlwaysAlive, FileMarker, LivenessCheck, StopHandle, StopSignal};
pub use periodic::PeriodicDriver;

use configuration::RunMode;
use executor::SharedBroker;
use std::sync::Arc;
use strategies::StateLifetime;

/// The result of one scheduler run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Timestamps processed.
    pub ticks: usize,
    /// One report per bot, in registration order.
    pub bots: Vec<BotReport>,
}

/// How long strategy state lives for a mode and window setting.
///
/// Periodic polling over a bounded window rebuilds the strategy every time;
/// everything else keeps one instance for the whole run.
pub fn lifetime_for(mode: RunMode, window: Option<usize>) -> StateLifetime {
    match (mode, window) {
        (RunMode::Periodic, Some(_)) => StateLifetime::PerInvocation,
        _ => StateLifetime::PerRun,
    }
}

/// Unique (instrument, broker) pairs in bot registration order.
///
/// Several bots on one instrument and one ledger share a route, so each
/// broker sees each observation once.
pub(crate) fn feed_routes(bots: &[Bot]) -> Vec<(String, SharedBroker)> {
    let mut routes: Vec<(String, SharedBroker)> = Vec::new();
    for bot in bots {
        let seen = routes
            .iter()
            .any(|(instrument, broker)| instrument == bot.instrument() && Arc::ptr_eq(broker, bot.broker()));
        if !seen {
            routes.push((bot.instrument().to_string(), bot.broker().clone()));
        }
    }
    routes
}
