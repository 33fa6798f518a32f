use crate::error::ExecutorError;
use crate::exchange::{Executor, SimulatedExecutor};
use crate::simulator::{BrokerState, ExecutionSimulator};
use chrono::{DateTime, Utc};
use configuration::{AccountConfig, Config, InstrumentSpec, RiskManagement};
use core_types::{
    AccountState, BrokerSnapshot, CancelReason, CloseReason, ClosedTrade, IsolatedPosition,
    Observation, Order, OrderId, OrderIntent, OrderOrigin, Position, TradeId,
};
use events::BrokerEvent;
use risk::{FixedFractionalSizer, MarginEngine};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, Mutex};

/// A broker ledger shared between bots. All mutation goes through the lock.
pub type SharedBroker = Arc<Mutex<VirtualBroker>>;

const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// The simulated brokerage: one account, its order book and its open trades.
///
/// Every order, fill and forced closure is appended to an audit log and
/// broadcast to subscribers. After each mutation a fresh [`BrokerSnapshot`] is
/// published on a `watch` channel so readers never need the lock.
pub struct VirtualBroker {
    simulator: ExecutionSimulator,
    state: BrokerState,
    audit: Vec<BrokerEvent>,
    event_tx: broadcast::Sender<BrokerEvent>,
    snapshot_tx: watch::Sender<BrokerSnapshot>,
}

impl VirtualBroker {
    pub fn new(
        account: &AccountConfig,
        risk: &RiskManagement,
        instruments: Vec<InstrumentSpec>,
    ) -> Result<Self, ExecutorError> {
        let margin = MarginEngine::new(account.leverage)?;
        let sizer = FixedFractionalSizer::new(risk.clone())?;
        let executor = SimulatedExecutor::new(account.spread.clone());
        let simulator = ExecutionSimulator::new(
            account,
            instruments,
            margin,
            Box::new(sizer),
            Box::new(executor),
        );

        let state = BrokerState::new(account);
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let (snapshot_tx, _) = watch::channel(BrokerSnapshot::empty(state.ledger.state().clone()));

        tracing::info!(
            initial_balance = %account.initial_balance,
            leverage = %account.leverage,
            currency = %account.home_currency,
            "Virtual broker created"
        );
        Ok(Self {
            simulator,
            state,
            audit: Vec::new(),
            event_tx,
            snapshot_tx,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, ExecutorError> {
        Self::new(
            &config.account,
            &config.risk_management,
            config.instruments.clone(),
        )
    }

    /// Replaces the pricing model used for fills and marks.
    pub fn with_executor(mut self, executor: Box<dyn Executor>) -> Self {
        self.simulator.set_executor(executor);
        self
    }

    pub fn into_shared(self) -> SharedBroker {
        Arc::new(Mutex::new(self))
    }

    // --- Commands ---

    pub fn submit(&mut self, intent: OrderIntent) -> Option<OrderId> {
        self.submit_from(intent, OrderOrigin::default())
    }

    /// Records an order on behalf of a bot. The order is held as pending until
    /// an observation newer than the last one seen for its instrument arrives.
    pub fn submit_from(&mut self, intent: OrderIntent, origin: OrderOrigin) -> Option<OrderId> {
        let placed_at = self.last_timestamp(&intent.instrument);
        let id = self.state.book.submit(intent, origin, placed_at);
        self.publish();
        id
    }

    pub fn cancel(&mut self, id: OrderId) -> Result<bool, ExecutorError> {
        let order = self.state.book.get(id).ok_or(ExecutorError::OrderNotFound(id))?;
        let at = self.last_timestamp(&order.instrument);
        let cancelled = self.state.book.cancel(id, CancelReason::Requested, at)?;
        self.publish();
        Ok(cancelled)
    }

    /// Closes trades right away at the last known mark, bypassing the order
    /// book. An empty `trades` slice closes everything on `instrument`.
    pub fn close_trades(
        &mut self,
        instrument: &str,
        trades: &[TradeId],
        reason: CloseReason,
    ) -> Result<Vec<ClosedTrade>, ExecutorError> {
        let closed = self
            .simulator
            .close_now(&mut self.state, instrument, trades, reason);
        self.publish();
        closed
    }

    /// Cancels the active orders `bot` placed on `instrument`. Other bots
    /// sharing the ledger keep theirs.
    pub fn cancel_bot_orders(&mut self, instrument: &str, bot: usize, reason: CancelReason) -> Vec<OrderId> {
        let at = self.last_timestamp(instrument);
        let cancelled = self.state.book.cancel_from_bot(instrument, bot, reason, at);
        if !cancelled.is_empty() {
            tracing::info!(instrument, bot, count = cancelled.len(), "Bot orders cancelled");
        }
        self.publish();
        cancelled
    }

    /// Closes, at the last known mark, the open trades on `instrument` that
    /// were opened by `bot`'s orders.
    pub fn close_bot_trades(
        &mut self,
        instrument: &str,
        bot: usize,
        reason: CloseReason,
    ) -> Result<Vec<ClosedTrade>, ExecutorError> {
        let owned: Vec<TradeId> = self
            .state
            .positions
            .open_trades(Some(instrument))
            .into_iter()
            .filter(|p| p.trade.origin.bot == bot)
            .map(|p| p.trade.id)
            .collect();
        if owned.is_empty() {
            return Ok(Vec::new());
        }
        self.close_trades(instrument, &owned, reason)
    }

    /// Feeds one observation for `instrument`.
    ///
    /// Returns `false` when the observation is not newer than the last one
    /// processed for the instrument; such observations are ignored, which lets
    /// several bots on one instrument share a ledger without double-processing.
    pub fn on_observation(&mut self, instrument: &str, obs: Observation) -> bool {
        if let Some(last) = self.last_timestamp(instrument) {
            if obs.timestamp() <= last {
                if obs.timestamp() < last {
                    tracing::warn!(instrument, at = %obs.timestamp(), last = %last, "Stale observation ignored");
                }
                return false;
            }
        }
        self.simulator.process(&mut self.state, instrument, &obs);
        self.publish();
        true
    }

    /// Updates the quote-to-home conversion factor for `instrument`.
    pub fn set_conversion(&mut self, instrument: &str, quote_to_home: Decimal) -> Result<(), ExecutorError> {
        if quote_to_home <= Decimal::ZERO {
            return Err(ExecutorError::InvalidConfig(format!(
                "conversion factor for {instrument} must be positive, got {quote_to_home}"
            )));
        }
        self.simulator.set_conversion(instrument, quote_to_home);
        tracing::debug!(instrument, quote_to_home = %quote_to_home, "Conversion factor updated");
        Ok(())
    }

    /// Appends an externally produced event (e.g. a bot lifecycle change) to
    /// the audit log.
    pub fn record_event(&mut self, event: BrokerEvent) {
        self.audit.push(event.clone());
        let _ = self.event_tx.send(event);
    }

    // --- Queries ---

    pub fn order(&self, id: OrderId) -> Option<&Order> {
        self.state.book.get(id)
    }

    pub fn orders(&self) -> Vec<Order> {
        self.state.book.all().cloned().collect()
    }

    /// Aggregated positions; an empty filter returns every instrument.
    pub fn get_positions(&self, instruments: &[&str]) -> BTreeMap<String, Position> {
        let mut positions = self.state.positions.positions();
        if !instruments.is_empty() {
            positions.retain(|k, _| instruments.contains(&k.as_str()));
        }
        positions
    }

    pub fn get_open_trades(&self, instrument: Option<&str>) -> Vec<IsolatedPosition> {
        self.state
            .positions
            .open_trades(instrument)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn account_summary(&self) -> AccountState {
        self.state.ledger.state().clone()
    }

    pub fn closed_trades(&self) -> &[ClosedTrade] {
        self.state.positions.closed()
    }

    pub fn equity_curve(&self) -> &[(DateTime<Utc>, Decimal)] {
        self.state.ledger.equity_curve()
    }

    pub fn audit_log(&self) -> &[BrokerEvent] {
        &self.audit
    }

    pub fn instrument(&self, symbol: &str) -> InstrumentSpec {
        self.simulator.instrument(symbol)
    }

    pub fn last_timestamp(&self, instrument: &str) -> Option<DateTime<Utc>> {
        self.state.last_seen.get(instrument).map(|o| o.timestamp())
    }

    pub fn snapshot(&self) -> BrokerSnapshot {
        BrokerSnapshot {
            as_of: self.state.last_seen.values().map(|o| o.timestamp()).max(),
            account: self.account_summary(),
            positions: self.state.positions.positions(),
            open_trades: self.get_open_trades(None),
            active_orders: self.state.book.active().cloned().collect(),
        }
    }

    /// A lock-free view of the broker, refreshed after every mutation.
    pub fn subscribe(&self) -> watch::Receiver<BrokerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<BrokerEvent> {
        self.event_tx.subscribe()
    }

    fn publish(&mut self) {
        for event in self.state.take_events() {
            self.audit.push(event.clone());
            // No subscribers is not an error.
            let _ = self.event_tx.send(event);
        }
        self.snapshot_tx.send_replace(self.snapshot());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use core_types::Bar;
    use rust_decimal_macros::dec;

    fn broker() -> VirtualBroker {
        VirtualBroker::new(
            &AccountConfig::new(dec!(10000), dec!(10)),
            &RiskManagement::default(),
            vec![],
        )
        .unwrap()
    }

    fn bar(minute: u32, price: Decimal) -> Observation {
        Bar::flat(Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(), price).into()
    }

    #[test]
    fn duplicate_and_stale_observations_are_ignored() {
        let mut broker = broker();
        assert!(broker.on_observation("EURUSD", bar(1, dec!(100))));
        assert!(!broker.on_observation("EURUSD", bar(1, dec!(100))));
        assert!(!broker.on_observation("EURUSD", bar(0, dec!(100))));
        assert!(broker.on_observation("GBPUSD", bar(0, dec!(100))));
    }

    #[test]
    fn snapshot_channel_follows_mutations() {
        let mut broker = broker();
        let rx = broker.subscribe();
        broker.on_observation("EURUSD", bar(0, dec!(100)));
        broker.submit(OrderIntent::market("EURUSD", 1).with_size(dec!(1)));
        assert_eq!(rx.borrow().active_orders.len(), 1);
        broker.on_observation("EURUSD", bar(1, dec!(100)));
        assert_eq!(rx.borrow().open_trades.len(), 1);
    }

    #[test]
    fn conversion_must_be_positive() {
        let mut broker = broker();
        assert!(broker.set_conversion("EURJPY", dec!(0)).is_err());
        broker.set_conversion("EURJPY", dec!(0.0067)).unwrap();
        assert_eq!(broker.instrument("EURJPY").quote_to_home, dec!(0.0067));
    }
}
