use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{CancelReason, ClosedTrade, OrderId, OrderStatus, Trade, TradeId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One state change of one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderTransition {
    pub order_id: OrderId,
    pub instrument: String,
    /// `None` when the order is first recorded.
    pub from: Option<OrderStatus>,
    pub to: OrderStatus,
    pub at: Option<DateTime<Utc>>,
    pub reason: Option<CancelReason>,
}

/// A trade closed by the margin engine rather than by its strategy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForcedClosure {
    pub trade_id: TradeId,
    pub instrument: String,
    pub margin_released: Decimal,
    pub margin_available_before: Decimal,
    pub at: DateTime<Utc>,
}

/// Lifecycle states of a bot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BotLifecycle {
    Initializing,
    Trading,
    Terminated,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotTransition {
    pub bot: usize,
    pub instrument: String,
    pub from: BotLifecycle,
    pub to: BotLifecycle,
    pub at: DateTime<Utc>,
}

/// The top-level audit event.
///
/// The `#[serde(tag = "type", content = "payload")]` attribute serializes the
/// enum into a clean JSON object, e.g.
/// `{ "type": "TradeClosed", "payload": { ... } }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum BrokerEvent {
    OrderTransition(OrderTransition),
    TradeOpened(Trade),
    TradeClosed(ClosedTrade),
    /// Emitted in addition to `TradeClosed` when the close was forced.
    MarginCall(ForcedClosure),
    Bot(BotTransition),
}

impl BrokerEvent {
    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }

    /// True for events caused by risk-engine intervention.
    pub fn is_forced(&self) -> bool {
        match self {
            BrokerEvent::MarginCall(_) => true,
            BrokerEvent::TradeClosed(closed) => closed.reason.is_forced(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn transition_serializes_with_tag_and_payload() {
        let event = BrokerEvent::OrderTransition(OrderTransition {
            order_id: OrderId(7),
            instrument: "EURUSD".to_string(),
            from: Some(OrderStatus::Pending),
            to: OrderStatus::Cancelled,
            at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()),
            reason: Some(CancelReason::Requested),
        });
        let json: serde_json::Value = serde_json::from_str(&event.to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "OrderTransition");
        assert_eq!(json["payload"]["to"], "cancelled");
        assert!(!event.is_forced());
    }
}
