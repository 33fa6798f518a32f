use configuration::SpreadModel;
use core_types::{Direction, Observation};
use rust_decimal::Decimal;

/// Turns observations into transaction prices.
///
/// This trait keeps the simulator agnostic about how prices are derived: from
/// bar mids with a modelled spread, or straight from bid/ask quotes.
pub trait Executor: Send + Sync {
    /// The price a market order on `side` transacts at when `obs` arrives.
    fn market_price(&self, side: Direction, obs: &Observation) -> Decimal;

    /// The price an open trade in `direction` could be closed at right now.
    fn mark_price(&self, direction: Direction, obs: &Observation) -> Decimal;

    /// The lowest and highest prices an open trade in `direction` could have
    /// been closed at during `obs`. Stops and take-profits are checked
    /// against this range.
    fn exit_range(&self, direction: Direction, obs: &Observation) -> (Decimal, Decimal);
}

/// The "virtual exchange" for backtesting.
///
/// Bars are treated as mid prices: market orders fill at the bar open and
/// marks use the bar close, each shifted by half the modelled spread. Quotes
/// carry their own spread and are used as-is.
#[derive(Debug, Clone)]
pub struct SimulatedExecutor {
    spread: SpreadModel,
}

impl SimulatedExecutor {
    pub fn new(spread: SpreadModel) -> Self {
        Self { spread }
    }
}

impl Executor for SimulatedExecutor {
    fn market_price(&self, side: Direction, obs: &Observation) -> Decimal {
        let price = match obs {
            Observation::Bar(bar) => self.spread.price_for(side, bar.open),
            Observation::Quote(quote) => match side {
                Direction::Long => quote.ask,
                Direction::Short => quote.bid,
            },
        };
        tracing::trace!(side = %side, price = %price, "Market fill price");
        price
    }

    fn mark_price(&self, direction: Direction, obs: &Observation) -> Decimal {
        // Closing a long sells at the bid, closing a short buys at the ask.
        let exit_side = direction.opposite();
        match obs {
            Observation::Bar(bar) => self.spread.price_for(exit_side, bar.close),
            Observation::Quote(quote) => match exit_side {
                Direction::Long => quote.ask,
                Direction::Short => quote.bid,
            },
        }
    }

    fn exit_range(&self, direction: Direction, obs: &Observation) -> (Decimal, Decimal) {
        let exit_side = direction.opposite();
        match obs {
            Observation::Bar(bar) => (
                self.spread.price_for(exit_side, bar.low),
                self.spread.price_for(exit_side, bar.high),
            ),
            Observation::Quote(_) => obs.range_for(exit_side),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use core_types::{Bar, Quote};
    use rust_decimal_macros::dec;

    fn ts() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn bar_fills_pay_half_the_spread() {
        let executor = SimulatedExecutor::new(SpreadModel::Constant { value: dec!(0.2) });
        let bar: Observation = Bar::new(ts(), dec!(100), dec!(101), dec!(99), dec!(100.5)).into();
        assert_eq!(executor.market_price(Direction::Long, &bar), dec!(100.1));
        assert_eq!(executor.market_price(Direction::Short, &bar), dec!(99.9));
        assert_eq!(executor.mark_price(Direction::Long, &bar), dec!(100.4));
        assert_eq!(executor.mark_price(Direction::Short, &bar), dec!(100.6));
    }

    #[test]
    fn exit_range_is_shifted_to_the_closing_side() {
        let executor = SimulatedExecutor::new(SpreadModel::Constant { value: dec!(0.2) });
        let bar: Observation = Bar::new(ts(), dec!(100), dec!(101), dec!(99), dec!(100.5)).into();
        assert_eq!(executor.exit_range(Direction::Long, &bar), (dec!(98.9), dec!(100.9)));
        assert_eq!(executor.exit_range(Direction::Short, &bar), (dec!(99.1), dec!(101.1)));

        let quote: Observation = Quote { timestamp: ts(), bid: dec!(1.1000), ask: dec!(1.1002) }.into();
        assert_eq!(executor.exit_range(Direction::Long, &quote), (dec!(1.1000), dec!(1.1000)));
    }

    #[test]
    fn quotes_use_bid_and_ask() {
        let executor = SimulatedExecutor::new(SpreadModel::default());
        let quote: Observation = Quote { timestamp: ts(), bid: dec!(1.1000), ask: dec!(1.1002) }.into();
        assert_eq!(executor.market_price(Direction::Long, &quote), dec!(1.1002));
        assert_eq!(executor.mark_price(Direction::Long, &quote), dec!(1.1000));
        assert_eq!(executor.mark_price(Direction::Short, &quote), dec!(1.1002));
    }
}
