use crate::enums::{CloseReason, Direction, StopType};
use crate::order::{OrderId, OrderOrigin, TradeId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// The record created when an entry order fills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    pub id: TradeId,
    pub order_id: OrderId,
    /// The bot whose order opened the trade; splits keep it.
    pub origin: OrderOrigin,
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub opened_at: DateTime<Utc>,
    /// Stop-loss level inherited from the originating order.
    pub stop_loss: Option<Decimal>,
    /// Take-profit level inherited from the originating order.
    pub take_profit: Option<Decimal>,
    /// Commission charged when the trade was opened (home currency).
    pub entry_commission: Decimal,
    /// Set when this trade was carved out of a larger one.
    pub split_from: Option<TradeId>,
}

impl Trade {
    /// Unrealized P&L at `price`, in home currency.
    pub fn floating_pnl(&self, price: Decimal, quote_to_home: Decimal) -> Decimal {
        (price - self.entry_price) * self.direction.sign() * self.size * quote_to_home
    }
}

/// A live stop attached to one trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveStop {
    pub stop_type: StopType,
    pub trigger: Decimal,
    /// Distance kept between the favourable extreme and a trailing trigger.
    pub distance: Decimal,
}

impl LiveStop {
    /// Moves a trailing trigger towards `extreme`, never backwards.
    /// Returns true when the trigger moved.
    pub fn ratchet(&mut self, direction: Direction, extreme: Decimal) -> bool {
        if self.stop_type != StopType::Trailing {
            return false;
        }
        let candidate = extreme - self.distance * direction.sign();
        let improves = match direction {
            Direction::Long => candidate > self.trigger,
            Direction::Short => candidate < self.trigger,
        };
        if improves {
            self.trigger = candidate;
        }
        improves
    }
}

/// The open-risk unit: one trade with its own stop-loss and take-profit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IsolatedPosition {
    pub trade: Trade,
    pub stop: Option<LiveStop>,
    pub take_profit: Option<Decimal>,
    /// Exit-side price the trade was last marked at.
    pub mark_price: Decimal,
    pub floating_pnl: Decimal,
    /// Margin currently locked by this trade (home currency).
    pub margin: Decimal,
}

/// A trade that has left the book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub trade: Trade,
    pub exit_price: Decimal,
    pub closed_at: DateTime<Utc>,
    pub reason: CloseReason,
    pub exit_commission: Decimal,
    /// `(exit - entry) * direction * size`, converted to home currency.
    pub gross_pnl: Decimal,
    /// Gross P&L minus entry and exit commission.
    pub net_pnl: Decimal,
}

impl ClosedTrade {
    pub fn is_win(&self) -> bool {
        self.net_pnl > Decimal::ZERO
    }
}

/// The netted view of one instrument.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub instrument: String,
    pub long_units: Decimal,
    pub short_units: Decimal,
    pub trade_ids: Vec<TradeId>,
    pub floating_pnl: Decimal,
}

impl Position {
    pub fn net_units(&self) -> Decimal {
        self.long_units - self.short_units
    }

    pub fn is_flat(&self) -> bool {
        self.long_units.is_zero() && self.short_units.is_zero()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn trailing_stop_never_moves_backwards() {
        let mut stop = LiveStop {
            stop_type: StopType::Trailing,
            trigger: dec!(95),
            distance: dec!(5),
        };
        assert!(stop.ratchet(Direction::Long, dec!(110)));
        assert_eq!(stop.trigger, dec!(105));
        assert!(!stop.ratchet(Direction::Long, dec!(108)));
        assert_eq!(stop.trigger, dec!(105));
    }

    #[test]
    fn short_trailing_stop_ratchets_down() {
        let mut stop = LiveStop {
            stop_type: StopType::Trailing,
            trigger: dec!(105),
            distance: dec!(5),
        };
        assert!(stop.ratchet(Direction::Short, dec!(90)));
        assert_eq!(stop.trigger, dec!(95));
        assert!(!stop.ratchet(Direction::Short, dec!(93)));
    }

    #[test]
    fn fixed_stop_ignores_ratchet() {
        let mut stop = LiveStop {
            stop_type: StopType::Limit,
            trigger: dec!(95),
            distance: dec!(5),
        };
        assert!(!stop.ratchet(Direction::Long, dec!(200)));
        assert_eq!(stop.trigger, dec!(95));
    }
}
