use crate::context::{DataWindow, Decision, ShutdownAction, ShutdownContext, StrategyDeps};
use crate::error::StrategyError;
use crate::{from_f64, to_f64, Strategy};
use chrono::{DateTime, Utc};
use configuration::MACrossoverParams;
use core_types::OrderIntent;
use rust_decimal::Decimal;
use ta::indicators::SimpleMovingAverage as Sma;
use ta::Next;

/// The Moving Average Crossover strategy.
///
/// Goes long when the fast SMA crosses above the slow SMA and short on the
/// opposite cross. Each signal first closes whatever is open on the
/// instrument, then enters with the configured stop.
pub struct MACrossover {
    instrument: String,
    params: MACrossoverParams,
    ma_fast: Sma,
    ma_slow: Sma,
    // State: the last two values of each MA, to detect a crossover event.
    fast: Option<Decimal>,
    slow: Option<Decimal>,
    prev_fast: Option<Decimal>,
    prev_slow: Option<Decimal>,
    bars_seen: usize,
    last_fed: Option<DateTime<Utc>>,
    deps: StrategyDeps,
}

impl MACrossover {
    /// Creates a new `MACrossover` instance with the given parameters.
    ///
    /// It performs validation to ensure the parameters are logical.
    pub fn new(
        params: MACrossoverParams,
        instrument: String,
        deps: StrategyDeps,
    ) -> Result<Self, StrategyError> {
        if params.ma_fast_period == 0 || params.ma_fast_period >= params.ma_slow_period {
            return Err(StrategyError::InvalidParameters(
                "Fast MA period must be positive and less than Slow MA period".to_string(),
            ));
        }
        let sma = |period| {
            Sma::new(period).map_err(|e| StrategyError::InvalidParameters(format!("{e:?}")))
        };

        Ok(Self {
            instrument,
            ma_fast: sma(params.ma_fast_period)?,
            ma_slow: sma(params.ma_slow_period)?,
            params,
            fast: None,
            slow: None,
            prev_fast: None,
            prev_slow: None,
            bars_seen: 0,
            last_fed: None,
            deps,
        })
    }

    fn entry(&self, direction: i8) -> OrderIntent {
        let mut intent =
            OrderIntent::market(&self.instrument, direction).with_stop_distance(self.params.stop_distance);
        if self.params.trailing {
            intent = intent.trailing();
        }
        if let Some(size) = self.params.size {
            intent = intent.with_size(size);
        }
        if let Some(take) = self.params.take_distance {
            intent = intent.with_take_distance(take);
        }
        intent
    }
}

impl Strategy for MACrossover {
    fn name(&self) -> &'static str {
        "ma_crossover"
    }

    fn refresh_features(&mut self, window: &DataWindow<'_>) -> Result<(), StrategyError> {
        for obs in window.newer_than(self.last_fed) {
            let close = to_f64(obs.close_mid())?;
            self.prev_fast = self.fast;
            self.prev_slow = self.slow;
            self.fast = Some(from_f64(self.ma_fast.next(close))?);
            self.slow = Some(from_f64(self.ma_slow.next(close))?);
            self.bars_seen += 1;
            self.last_fed = Some(obs.timestamp());
        }
        Ok(())
    }

    fn generate(&mut self, window: &DataWindow<'_>) -> Result<Decision, StrategyError> {
        // Wait until the slow MA covers a full period before trusting a cross.
        if self.bars_seen <= self.params.ma_slow_period {
            return Ok(Decision::none());
        }
        let (Some(prev_fast), Some(prev_slow), Some(fast), Some(slow)) =
            (self.prev_fast, self.prev_slow, self.fast, self.slow)
        else {
            return Ok(Decision::none());
        };

        let is_bullish_cross = prev_fast <= prev_slow && fast > slow;
        let is_bearish_cross = prev_fast >= prev_slow && fast < slow;
        tracing::debug!(
            instrument = %self.instrument,
            now = %window.now(),
            fast = %fast,
            slow = %slow,
            is_bullish_cross,
            is_bearish_cross,
            "MACrossover evaluated"
        );

        let direction = if is_bullish_cross {
            1
        } else if is_bearish_cross {
            -1
        } else {
            return Ok(Decision::none());
        };
        Ok(Decision::orders(vec![
            OrderIntent::close(&self.instrument),
            self.entry(direction),
        ]))
    }

    fn shutdown(&mut self, ctx: &ShutdownContext) -> Vec<ShutdownAction> {
        let snapshot = ctx
            .snapshot
            .clone()
            .or_else(|| self.deps.broker.as_ref().map(|b| b.borrow().clone()));
        // Without a broker view we cannot tell, so ask for the close anyway.
        let has_trades = snapshot.is_none_or(|s| s.position(&ctx.instrument).is_some());
        if has_trades {
            vec![ShutdownAction::CancelPendingOrders, ShutdownAction::CloseOpenTrades]
        } else {
            vec![ShutdownAction::CancelPendingOrders]
        }
    }
}
