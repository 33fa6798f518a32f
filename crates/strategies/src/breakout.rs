use crate::context::{DataWindow, Decision, StrategyDeps};
use crate::error::StrategyError;
use crate::{from_f64, to_f64, Strategy};
use chrono::{DateTime, Utc};
use configuration::BreakoutParams;
use core_types::{Direction, Observation, OrderIntent};
use rust_decimal::Decimal;
use ta::indicators::{Maximum, Minimum};
use ta::Next;

/// A Donchian channel breakout.
///
/// Enters long when the close breaks above the highest high of the previous
/// `lookback` observations and short when it breaks below the lowest low.
/// With broker access the current exposure is read from the broker snapshot;
/// without it the strategy remembers its own last entry.
pub struct Breakout {
    instrument: String,
    params: BreakoutParams,
    highest: Maximum,
    lowest: Minimum,
    // Channel over the observations *before* the latest one.
    prior_channel: Option<(Decimal, Decimal)>,
    channel: Option<(Decimal, Decimal)>,
    bars_seen: usize,
    last_fed: Option<DateTime<Utc>>,
    last_entry: Option<Direction>,
    deps: StrategyDeps,
}

impl Breakout {
    pub fn new(params: BreakoutParams, instrument: String, deps: StrategyDeps) -> Result<Self, StrategyError> {
        if params.lookback == 0 {
            return Err(StrategyError::InvalidParameters(
                "Breakout lookback cannot be zero".to_string(),
            ));
        }
        let invalid = |e| StrategyError::InvalidParameters(format!("{e:?}"));
        Ok(Self {
            instrument,
            highest: Maximum::new(params.lookback).map_err(invalid)?,
            lowest: Minimum::new(params.lookback).map_err(invalid)?,
            params,
            prior_channel: None,
            channel: None,
            bars_seen: 0,
            last_fed: None,
            last_entry: None,
            deps,
        })
    }

    /// Net exposure on the instrument: from the broker when available.
    fn current_side(&self) -> Option<Direction> {
        match &self.deps.broker {
            Some(view) => {
                let snapshot = view.borrow();
                let net = snapshot.position(&self.instrument)?.net_units();
                if net > Decimal::ZERO {
                    Some(Direction::Long)
                } else if net < Decimal::ZERO {
                    Some(Direction::Short)
                } else {
                    None
                }
            }
            None => self.last_entry,
        }
    }
}

fn extremes(obs: &Observation) -> (Decimal, Decimal) {
    match obs {
        Observation::Bar(bar) => (bar.low, bar.high),
        Observation::Quote(quote) => (quote.mid(), quote.mid()),
    }
}

impl Strategy for Breakout {
    fn name(&self) -> &'static str {
        "breakout"
    }

    fn refresh_features(&mut self, window: &DataWindow<'_>) -> Result<(), StrategyError> {
        for obs in window.newer_than(self.last_fed) {
            let (low, high) = extremes(obs);
            self.prior_channel = self.channel;
            let lowest = from_f64(self.lowest.next(to_f64(low)?))?;
            let highest = from_f64(self.highest.next(to_f64(high)?))?;
            self.channel = Some((lowest, highest));
            self.bars_seen += 1;
            self.last_fed = Some(obs.timestamp());
        }
        Ok(())
    }

    fn generate(&mut self, window: &DataWindow<'_>) -> Result<Decision, StrategyError> {
        if self.bars_seen <= self.params.lookback {
            return Ok(Decision::none());
        }
        let (Some((low, high)), Some(latest)) = (self.prior_channel, window.latest()) else {
            return Ok(Decision::none());
        };

        let close = latest.close_mid();
        let signal = if close > high {
            Direction::Long
        } else if close < low {
            Direction::Short
        } else {
            return Ok(Decision::none());
        };

        let current = self.current_side();
        if current == Some(signal) {
            return Ok(Decision::none());
        }
        tracing::debug!(instrument = %self.instrument, close = %close, low = %low, high = %high, direction = %signal, "Breakout signal");

        let mut orders = Vec::with_capacity(2);
        if current.is_some() {
            orders.push(OrderIntent::close(&self.instrument));
        }
        let mut entry = OrderIntent::market(&self.instrument, signal.signum())
            .with_stop_distance(self.params.stop_distance);
        if let Some(size) = self.params.size {
            entry = entry.with_size(size);
        }
        orders.push(entry);
        self.last_entry = Some(signal);
        Ok(Decision::orders(orders))
    }
}
