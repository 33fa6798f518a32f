use crate::error::ExecutorError;
use chrono::{DateTime, Utc};
use core_types::{CancelReason, Order, OrderId, OrderIntent, OrderOrigin, OrderStatus};
use events::OrderTransition;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Tracks every order ever submitted and enforces the order lifecycle:
/// `pending -> open -> filled | cancelled`.
///
/// The book only moves orders between states; deciding *whether* an open order
/// fills is the execution simulator's job.
#[derive(Debug, Default)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, Order>,
    next_id: u64,
    transitions: Vec<OrderTransition>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates and records an order.
    ///
    /// Returns `None` for a deliberate no-op (a market order with direction 0).
    /// Malformed orders still receive an id and go straight to `cancelled`
    /// with the validation message as their reason.
    pub fn submit(
        &mut self,
        intent: OrderIntent,
        origin: OrderOrigin,
        placed_at: Option<DateTime<Utc>>,
    ) -> Option<OrderId> {
        let validated = intent.validate();
        if let Ok(None) = validated {
            tracing::debug!(instrument = %intent.instrument, "No-op order ignored");
            return None;
        }

        self.next_id += 1;
        let id = OrderId(self.next_id);
        let mut order = Order {
            id,
            instrument: intent.instrument.clone(),
            order_type: intent.order_type,
            kind: None,
            status: OrderStatus::Pending,
            origin,
            placed_at,
            triggered_at: None,
            filled_at: None,
            fill_price: None,
            cancel_reason: None,
            intent,
        };
        self.record(&order, None, placed_at, None);

        match validated {
            Ok(kind) => {
                order.kind = kind;
                tracing::debug!(order_id = %id, instrument = %order.instrument, order_type = %order.order_type, "Order accepted");
                self.orders.insert(id, order);
            }
            Err(message) => {
                tracing::warn!(order_id = %id, instrument = %order.instrument, reason = %message, "Order rejected");
                let reason = CancelReason::Invalid(message);
                order.status = OrderStatus::Cancelled;
                order.cancel_reason = Some(reason.clone());
                self.record(&order, Some(OrderStatus::Pending), placed_at, Some(reason));
                self.orders.insert(id, order);
            }
        }
        Some(id)
    }

    /// Opens every pending order on `instrument` placed strictly before `at`.
    pub fn advance(&mut self, instrument: &str, at: DateTime<Utc>) -> Vec<OrderId> {
        let ready: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::Pending
                    && o.instrument == instrument
                    && o.placed_at.is_none_or(|placed| placed < at)
            })
            .map(|o| o.id)
            .collect();
        for id in &ready {
            self.transition(*id, OrderStatus::Open, Some(at), None);
        }
        ready
    }

    /// Open orders on `instrument`, in deterministic processing order.
    pub fn open_orders(&self, instrument: &str) -> Vec<OrderId> {
        let mut open: Vec<&Order> = self
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Open && o.instrument == instrument)
            .collect();
        open.sort_by_key(|o| (o.origin, o.id));
        open.into_iter().map(|o| o.id).collect()
    }

    pub fn mark_triggered(&mut self, id: OrderId, at: DateTime<Utc>) {
        if let Some(order) = self.orders.get_mut(&id) {
            order.triggered_at = Some(at);
        }
    }

    pub fn mark_filled(&mut self, id: OrderId, price: Option<Decimal>, at: DateTime<Utc>) {
        if let Some(order) = self.orders.get_mut(&id) {
            order.filled_at = Some(at);
            order.fill_price = price;
        }
        self.transition(id, OrderStatus::Filled, Some(at), None);
    }

    /// Cancels an active order. Cancelling an order that already reached a
    /// terminal state is a no-op and returns `Ok(false)`.
    pub fn cancel(
        &mut self,
        id: OrderId,
        reason: CancelReason,
        at: Option<DateTime<Utc>>,
    ) -> Result<bool, ExecutorError> {
        let order = self.orders.get(&id).ok_or(ExecutorError::OrderNotFound(id))?;
        if !order.is_active() {
            return Ok(false);
        }
        tracing::info!(order_id = %id, instrument = %order.instrument, reason = %reason, "Order cancelled");
        self.transition(id, OrderStatus::Cancelled, at, Some(reason));
        Ok(true)
    }

    /// Cancels every active order on `instrument`.
    /// Cancels the active orders one bot placed on `instrument`.
    pub fn cancel_from_bot(
        &mut self,
        instrument: &str,
        bot: usize,
        reason: CancelReason,
        at: Option<DateTime<Utc>>,
    ) -> Vec<OrderId> {
        let active: Vec<OrderId> = self
            .orders
            .values()
            .filter(|o| o.is_active() && o.instrument == instrument && o.origin.bot == bot)
            .map(|o| o.id)
            .collect();
        for id in &active {
            self.transition(*id, OrderStatus::Cancelled, at, Some(reason.clone()));
        }
        active
    }

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub fn active(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.is_active())
    }

    pub fn all(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Hands over the transitions recorded since the last call.
    pub fn drain_transitions(&mut self) -> Vec<OrderTransition> {
        std::mem::take(&mut self.transitions)
    }

    fn transition(
        &mut self,
        id: OrderId,
        to: OrderStatus,
        at: Option<DateTime<Utc>>,
        reason: Option<CancelReason>,
    ) {
        let Some(order) = self.orders.get_mut(&id) else {
            return;
        };
        let from = order.status;
        order.status = to;
        if reason.is_some() {
            order.cancel_reason = reason.clone();
        }
        self.transitions.push(OrderTransition {
            order_id: id,
            instrument: order.instrument.clone(),
            from: Some(from),
            to,
            at,
            reason,
        });
    }

    fn record(
        &mut self,
        order: &Order,
        from: Option<OrderStatus>,
        at: Option<DateTime<Utc>>,
        reason: Option<CancelReason>,
    ) {
        self.transitions.push(OrderTransition {
            order_id: order.id,
            instrument: order.instrument.clone(),
            from,
            to: order.status,
            at,
            reason,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use rust_decimal_macros::dec;

    fn t(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    #[test]
    fn pending_orders_open_only_on_a_later_observation() {
        let mut book = OrderBook::new();
        let id = book
            .submit(OrderIntent::market("EURUSD", 1).with_size(dec!(10)), OrderOrigin::default(), Some(t(0)))
            .unwrap();
        assert!(book.advance("EURUSD", t(0)).is_empty());
        assert!(book.advance("GBPUSD", t(1)).is_empty());
        assert_eq!(book.advance("EURUSD", t(1)), vec![id]);
        assert_eq!(book.get(id).unwrap().status, OrderStatus::Open);
    }

    #[test]
    fn cancelling_for_one_bot_leaves_other_bots_orders() {
        let mut book = OrderBook::new();
        let intent = || OrderIntent::market("EURUSD", 1).with_size(dec!(1));
        let mine = book.submit(intent(), OrderOrigin { bot: 1, seq: 1 }, Some(t(0))).unwrap();
        let theirs = book.submit(intent(), OrderOrigin { bot: 0, seq: 1 }, Some(t(0))).unwrap();

        assert_eq!(book.cancel_from_bot("EURUSD", 1, CancelReason::Shutdown, Some(t(0))), vec![mine]);
        assert_eq!(book.get(mine).unwrap().status, OrderStatus::Cancelled);
        assert!(book.get(theirs).unwrap().is_active());
    }

    #[test]
    fn direction_zero_market_order_is_a_no_op() {
        let mut book = OrderBook::new();
        assert!(book.submit(OrderIntent::market("EURUSD", 0), OrderOrigin::default(), None).is_none());
        assert_eq!(book.all().count(), 0);
    }

    #[test]
    fn malformed_order_is_cancelled_with_reason() {
        let mut book = OrderBook::new();
        let id = book
            .submit(OrderIntent::market("EURUSD", 1), OrderOrigin::default(), None)
            .unwrap();
        let order = book.get(id).unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
        assert!(matches!(order.cancel_reason, Some(CancelReason::Invalid(_))));
        let transitions = book.drain_transitions();
        assert_eq!(transitions.len(), 2);
        assert_eq!(transitions[1].to, OrderStatus::Cancelled);
    }

    #[test]
    fn cancel_is_idempotent() {
        let mut book = OrderBook::new();
        let id = book
            .submit(OrderIntent::limit("EURUSD", 1, dec!(1.1)).with_size(dec!(1)), OrderOrigin::default(), None)
            .unwrap();
        assert!(book.cancel(id, CancelReason::Requested, None).unwrap());
        assert!(!book.cancel(id, CancelReason::Requested, None).unwrap());
        assert!(matches!(
            book.cancel(OrderId(99), CancelReason::Requested, None),
            Err(ExecutorError::OrderNotFound(_))
        ));
    }

    #[test]
    fn open_orders_sort_by_origin_then_id() {
        let mut book = OrderBook::new();
        let late_bot = book
            .submit(
                OrderIntent::market("EURUSD", 1).with_size(dec!(1)),
                OrderOrigin { bot: 1, seq: 0 },
                Some(t(0)),
            )
            .unwrap();
        let early_bot = book
            .submit(
                OrderIntent::market("EURUSD", -1).with_size(dec!(1)),
                OrderOrigin { bot: 0, seq: 0 },
                Some(t(0)),
            )
            .unwrap();
        book.advance("EURUSD", t(1));
        assert_eq!(book.open_orders("EURUSD"), vec![early_bot, late_bot]);
    }
}
