use crate::enums::{CancelReason, Direction, OrderStatus, OrderType, StopType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderId(pub u64);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "order#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TradeId(pub u64);

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "trade#{}", self.0)
    }
}

/// An order as produced by a strategy: a flat bag of optional fields.
///
/// Nothing here is trusted. [`OrderIntent::validate`] turns it into an
/// [`OrderKind`] carrying only the fields its kind needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderIntent {
    pub instrument: String,
    pub order_type: OrderType,
    /// `1` long, `-1` short, `0` no-op.
    #[serde(default)]
    pub direction: i8,
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub order_limit_price: Option<Decimal>,
    #[serde(default)]
    pub order_stop_price: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
    /// Stop distance in price increments (pips).
    #[serde(default)]
    pub stop_distance: Option<Decimal>,
    #[serde(default)]
    pub stop_type: StopType,
    #[serde(default)]
    pub take_profit: Option<Decimal>,
    #[serde(default)]
    pub take_distance: Option<Decimal>,
    #[serde(default)]
    pub related_orders: Vec<u64>,
}

impl OrderIntent {
    fn blank(instrument: &str, order_type: OrderType, direction: i8) -> Self {
        Self {
            instrument: instrument.to_string(),
            order_type,
            direction,
            size: None,
            order_limit_price: None,
            order_stop_price: None,
            stop_loss: None,
            stop_distance: None,
            stop_type: StopType::Limit,
            take_profit: None,
            take_distance: None,
            related_orders: Vec::new(),
        }
    }

    pub fn market(instrument: &str, direction: i8) -> Self {
        Self::blank(instrument, OrderType::Market, direction)
    }

    pub fn limit(instrument: &str, direction: i8, limit_price: Decimal) -> Self {
        let mut intent = Self::blank(instrument, OrderType::Limit, direction);
        intent.order_limit_price = Some(limit_price);
        intent
    }

    pub fn stop_limit(
        instrument: &str,
        direction: i8,
        stop_price: Decimal,
        limit_price: Decimal,
    ) -> Self {
        let mut intent = Self::blank(instrument, OrderType::StopLimit, direction);
        intent.order_stop_price = Some(stop_price);
        intent.order_limit_price = Some(limit_price);
        intent
    }

    /// Closes every open trade on the instrument.
    pub fn close(instrument: &str) -> Self {
        Self::blank(instrument, OrderType::Close, 0)
    }

    /// Closes one specific trade.
    pub fn close_trade(instrument: &str, trade: TradeId) -> Self {
        let mut intent = Self::blank(instrument, OrderType::Close, 0);
        intent.related_orders = vec![trade.0];
        intent
    }

    /// Reduces exposure opposite to `direction` by `size` units.
    pub fn reduce(instrument: &str, direction: i8, size: Decimal) -> Self {
        let mut intent = Self::blank(instrument, OrderType::Reduce, direction);
        intent.size = Some(size);
        intent
    }

    pub fn modify(instrument: &str, trade: TradeId) -> Self {
        let mut intent = Self::blank(instrument, OrderType::Modify, 0);
        intent.related_orders = vec![trade.0];
        intent
    }

    pub fn with_size(mut self, size: Decimal) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_stop_loss(mut self, price: Decimal) -> Self {
        self.stop_loss = Some(price);
        self
    }

    pub fn with_stop_distance(mut self, pips: Decimal) -> Self {
        self.stop_distance = Some(pips);
        self
    }

    pub fn trailing(mut self) -> Self {
        self.stop_type = StopType::Trailing;
        self
    }

    pub fn with_take_profit(mut self, price: Decimal) -> Self {
        self.take_profit = Some(price);
        self
    }

    pub fn with_take_distance(mut self, pips: Decimal) -> Self {
        self.take_distance = Some(pips);
        self
    }

    /// Checks the intent against the rules of its order type.
    ///
    /// Returns `Ok(None)` for a deliberate no-op (a market order with
    /// direction `0`). The error string becomes the cancellation reason.
    pub fn validate(&self) -> Result<Option<OrderKind>, String> {
        if self.instrument.trim().is_empty() {
            return Err("instrument is required".to_string());
        }
        let direction = Direction::from_signum(self.direction).map_err(|e| e.to_string())?;
        if let Some(size) = self.size {
            if size <= Decimal::ZERO {
                return Err(format!("size must be positive, got {size}"));
            }
        }

        match self.order_type {
            OrderType::Market => {
                let Some(direction) = direction else {
                    return Ok(None);
                };
                let exits = self.exits()?;
                self.require_sizing(&exits)?;
                Ok(Some(OrderKind::Market {
                    direction,
                    size: self.size,
                    exits,
                }))
            }
            OrderType::Limit => {
                let direction = direction.ok_or("limit order requires a direction")?;
                let limit_price = positive(self.order_limit_price, "order_limit_price")?;
                let exits = self.exits()?;
                self.require_sizing(&exits)?;
                exits.check_against(direction, limit_price)?;
                Ok(Some(OrderKind::Limit {
                    direction,
                    size: self.size,
                    limit_price,
                    exits,
                }))
            }
            OrderType::StopLimit => {
                let direction = direction.ok_or("stop-limit order requires a direction")?;
                let stop_price = positive(self.order_stop_price, "order_stop_price")?;
                let limit_price = positive(self.order_limit_price, "order_limit_price")?;
                let exits = self.exits()?;
                self.require_sizing(&exits)?;
                exits.check_against(direction, limit_price)?;
                Ok(Some(OrderKind::StopLimit {
                    direction,
                    size: self.size,
                    stop_price,
                    limit_price,
                    exits,
                }))
            }
            OrderType::Close => Ok(Some(OrderKind::Close {
                trades: self.related_orders.iter().copied().map(TradeId).collect(),
            })),
            OrderType::Reduce => {
                let direction = direction.ok_or("reduce order requires a direction")?;
                let size = self.size.ok_or("reduce order requires a size")?;
                Ok(Some(OrderKind::Reduce { direction, size }))
            }
            OrderType::Modify => {
                let trade = match self.related_orders.as_slice() {
                    [id] => TradeId(*id),
                    _ => return Err("modify order must reference exactly one trade".to_string()),
                };
                let exits = self.exits()?;
                if exits.stop_loss.is_none() && exits.take_profit.is_none() {
                    return Err("modify order must carry a new stop loss or take profit".to_string());
                }
                Ok(Some(OrderKind::Modify { trade, exits }))
            }
        }
    }

    /// Resolves the stop/take fields. An absolute price always wins over a
    /// distance; the same precedence applies to take-profit.
    fn exits(&self) -> Result<Exits, String> {
        let stop_level = level(self.stop_loss, self.stop_distance, "stop")?;
        let take_profit = level(self.take_profit, self.take_distance, "take profit")?;
        Ok(Exits {
            stop_loss: stop_level.map(|level| StopLossSpec {
                level,
                stop_type: self.stop_type,
            }),
            take_profit,
        })
    }

    fn require_sizing(&self, exits: &Exits) -> Result<(), String> {
        if self.size.is_none() && exits.stop_loss.is_none() {
            return Err("size or stop loss required to size the order".to_string());
        }
        Ok(())
    }
}

fn positive(value: Option<Decimal>, field: &str) -> Result<Decimal, String> {
    match value {
        Some(v) if v > Decimal::ZERO => Ok(v),
        Some(v) => Err(format!("{field} must be positive, got {v}")),
        None => Err(format!("{field} is required")),
    }
}

fn level(
    price: Option<Decimal>,
    distance: Option<Decimal>,
    field: &str,
) -> Result<Option<Level>, String> {
    match (price, distance) {
        (Some(price), _) if price > Decimal::ZERO => Ok(Some(Level::Price(price))),
        (Some(price), _) => Err(format!("{field} price must be positive, got {price}")),
        (None, Some(distance)) if distance > Decimal::ZERO => Ok(Some(Level::Distance(distance))),
        (None, Some(distance)) => Err(format!("{field} distance must be positive, got {distance}")),
        (None, None) => Ok(None),
    }
}

/// An exit level: an absolute price or a distance in price increments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    Price(Decimal),
    Distance(Decimal),
}

impl Level {
    /// Resolves the level for a trade entered at `entry`. Distances are
    /// measured in `pip_size` units and placed on the losing (`adverse =
    /// true`) or winning side of the entry.
    pub fn resolve(&self, direction: Direction, entry: Decimal, pip_size: Decimal, adverse: bool) -> Decimal {
        match self {
            Level::Price(price) => *price,
            Level::Distance(pips) => {
                let offset = *pips * pip_size * direction.sign();
                if adverse { entry - offset } else { entry + offset }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopLossSpec {
    pub level: Level,
    pub stop_type: StopType,
}

/// The stop-loss/take-profit attached to an entry order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exits {
    pub stop_loss: Option<StopLossSpec>,
    pub take_profit: Option<Level>,
}

impl Exits {
    /// Absolute exit prices must sit on the correct side of a known entry price.
    fn check_against(&self, direction: Direction, entry: Decimal) -> Result<(), String> {
        if let Some(StopLossSpec { level: Level::Price(stop), .. }) = self.stop_loss {
            let wrong_side = match direction {
                Direction::Long => stop >= entry,
                Direction::Short => stop <= entry,
            };
            if wrong_side {
                return Err(format!("stop loss {stop} is on the wrong side of {direction} entry {entry}"));
            }
        }
        if let Some(Level::Price(take)) = self.take_profit {
            let wrong_side = match direction {
                Direction::Long => take <= entry,
                Direction::Short => take >= entry,
            };
            if wrong_side {
                return Err(format!("take profit {take} is on the wrong side of {direction} entry {entry}"));
            }
        }
        Ok(())
    }
}

/// A validated order. Each kind carries only the fields it needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum OrderKind {
    Market {
        direction: Direction,
        size: Option<Decimal>,
        exits: Exits,
    },
    Limit {
        direction: Direction,
        size: Option<Decimal>,
        limit_price: Decimal,
        exits: Exits,
    },
    StopLimit {
        direction: Direction,
        size: Option<Decimal>,
        stop_price: Decimal,
        limit_price: Decimal,
        exits: Exits,
    },
    /// An empty list closes every open trade on the instrument.
    Close { trades: Vec<TradeId> },
    Reduce { direction: Direction, size: Decimal },
    Modify { trade: TradeId, exits: Exits },
}

/// Stable ordering key for orders coming from different bots on one ledger.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderOrigin {
    /// Registration index of the submitting bot.
    pub bot: usize,
    /// Per-bot submission counter.
    pub seq: u64,
}

/// An order tracked by the order book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub instrument: String,
    pub order_type: OrderType,
    /// `None` only for orders rejected at validation.
    pub kind: Option<OrderKind>,
    pub status: OrderStatus,
    pub origin: OrderOrigin,
    /// Timestamp of the last observation known for the instrument at submission.
    pub placed_at: Option<DateTime<Utc>>,
    /// Set once a stop-limit order's trigger has been crossed.
    pub triggered_at: Option<DateTime<Utc>>,
    pub filled_at: Option<DateTime<Utc>>,
    pub fill_price: Option<Decimal>,
    pub cancel_reason: Option<CancelReason>,
    pub intent: OrderIntent,
}

impl Order {
    pub fn is_active(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn absolute_stop_wins_over_distance() {
        let intent = OrderIntent::market("EURUSD", 1)
            .with_size(dec!(10))
            .with_stop_loss(dec!(99))
            .with_stop_distance(dec!(50));
        let Some(OrderKind::Market { exits, .. }) = intent.validate().unwrap() else {
            panic!("expected a market order");
        };
        assert_eq!(exits.stop_loss.unwrap().level, Level::Price(dec!(99)));
    }

    #[test]
    fn absolute_take_profit_wins_over_distance() {
        let intent = OrderIntent::market("EURUSD", -1)
            .with_size(dec!(1))
            .with_take_profit(dec!(90))
            .with_take_distance(dec!(5));
        let Some(OrderKind::Market { exits, .. }) = intent.validate().unwrap() else {
            panic!("expected a market order");
        };
        assert_eq!(exits.take_profit, Some(Level::Price(dec!(90))));
    }

    #[test]
    fn market_with_zero_direction_is_a_no_op() {
        assert_eq!(OrderIntent::market("EURUSD", 0).validate(), Ok(None));
    }

    #[test]
    fn malformed_orders_are_rejected() {
        let missing_limit = OrderIntent {
            order_limit_price: None,
            ..OrderIntent::limit("EURUSD", 1, dec!(1)).with_size(dec!(1))
        };
        assert!(missing_limit.validate().is_err());

        let negative = OrderIntent::market("EURUSD", 1).with_size(dec!(-5));
        assert!(negative.validate().is_err());

        let without_size = OrderIntent::market("EURUSD", 1);
        assert!(without_size.validate().unwrap_err().contains("size or stop loss"));

        let reduce_without_size = OrderIntent {
            size: None,
            ..OrderIntent::reduce("EURUSD", -1, dec!(1))
        };
        assert!(reduce_without_size.validate().is_err());

        let bare_modify = OrderIntent::modify("EURUSD", TradeId(3));
        assert!(bare_modify.validate().is_err());
    }

    #[test]
    fn limit_stop_on_wrong_side_is_rejected() {
        let intent = OrderIntent::limit("EURUSD", 1, dec!(100))
            .with_size(dec!(1))
            .with_stop_loss(dec!(101));
        assert!(intent.validate().unwrap_err().contains("wrong side"));
    }

    #[test]
    fn distance_resolves_in_pips() {
        let stop = Level::Distance(dec!(20)).resolve(Direction::Long, dec!(1.1000), dec!(0.0001), true);
        assert_eq!(stop, dec!(1.0980));
        let take = Level::Distance(dec!(20)).resolve(Direction::Short, dec!(1.1000), dec!(0.0001), false);
        assert_eq!(take, dec!(1.0980));
    }

    #[test]
    fn intent_deserializes_from_loose_json() {
        let json = r#"{"instrument":"EURUSD","order_type":"stop-limit","direction":1,
            "size":"2","order_stop_price":"1.2","order_limit_price":"1.21"}"#;
        let intent: OrderIntent = serde_json::from_str(json).unwrap();
        assert!(matches!(intent.validate(), Ok(Some(OrderKind::StopLimit { .. }))));
    }
}
