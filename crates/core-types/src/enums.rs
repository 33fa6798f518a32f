use crate::error::CoreError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The side of the market a trade is exposed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn opposite(&self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// `+1` for long, `-1` for short.
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::Long => Decimal::ONE,
            Direction::Short => Decimal::NEGATIVE_ONE,
        }
    }

    /// Converts the `{-1, 0, 1}` convention used by order intents.
    /// `0` maps to `None`.
    pub fn from_signum(value: i8) -> Result<Option<Self>, CoreError> {
        match value {
            1 => Ok(Some(Direction::Long)),
            -1 => Ok(Some(Direction::Short)),
            0 => Ok(None),
            other => Err(CoreError::InvalidInput(
                "direction".to_string(),
                format!("expected -1, 0 or 1, got {other}"),
            )),
        }
    }

    pub fn signum(&self) -> i8 {
        match self {
            Direction::Long => 1,
            Direction::Short => -1,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Long => write!(f, "long"),
            Direction::Short => write!(f, "short"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OrderType {
    Market,
    Limit,
    StopLimit,
    Close,
    Reduce,
    Modify,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderType::Market => "market",
            OrderType::Limit => "limit",
            OrderType::StopLimit => "stop-limit",
            OrderType::Close => "close",
            OrderType::Reduce => "reduce",
            OrderType::Modify => "modify",
        };
        f.write_str(name)
    }
}

/// How a stop-loss behaves once the trade is open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopType {
    /// A fixed trigger price.
    #[default]
    Limit,
    /// A trigger that ratchets behind price by a fixed distance.
    Trailing,
}

/// Lifecycle state of an order inside the order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Pending,
    Open,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Filled | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Open => "open",
            OrderStatus::Filled => "filled",
            OrderStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Why a trade left the book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    StopLoss,
    TrailingStop,
    TakeProfit,
    /// An explicit close order from a strategy.
    Strategy,
    /// A reduce order consumed the trade (or part of it).
    Reduce,
    /// Forced closeout by the margin engine.
    MarginCall,
    /// Closed by a bot's shutdown routine.
    Shutdown,
}

impl CloseReason {
    /// True when the risk engine, not the strategy, closed the trade.
    pub fn is_forced(&self) -> bool {
        matches!(self, CloseReason::MarginCall)
    }
}

/// The stated reason attached to every cancelled order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum CancelReason {
    /// The order failed a sanity check for its kind.
    Invalid(String),
    InsufficientMargin { required: Decimal, available: Decimal },
    /// A close/reduce/modify order found nothing to act on.
    NoMatchingTrades,
    /// The computed risk-based size rounded down to zero.
    ZeroSize,
    /// The resolved stop-loss would already be crossed at the fill price.
    StopOnWrongSide { stop: Decimal, fill: Decimal },
    /// Cancelled on request.
    Requested,
    Shutdown,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::Invalid(reason) => write!(f, "invalid order: {reason}"),
            CancelReason::InsufficientMargin { required, available } => write!(
                f,
                "insufficient margin (required {required}, available {available})"
            ),
            CancelReason::NoMatchingTrades => write!(f, "no matching open trades"),
            CancelReason::ZeroSize => write!(f, "computed position size is zero"),
            CancelReason::StopOnWrongSide { stop, fill } => {
                write!(f, "stop loss {stop} is on the wrong side of fill price {fill}")
            }
            CancelReason::Requested => write!(f, "cancelled on request"),
            CancelReason::Shutdown => write!(f, "cancelled by bot shutdown"),
        }
    }
}
