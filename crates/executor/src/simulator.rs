use crate::error::ExecutorError;
use crate::exchange::Executor;
use crate::ledger::AccountLedger;
use crate::order_book::OrderBook;
use crate::positions::{fifo_reduction, NewTrade, PositionManager};
use chrono::{DateTime, Utc};
use configuration::{AccountConfig, InstrumentSpec};
use core_types::{
    CancelReason, CloseReason, ClosedTrade, Direction, Exits, IsolatedPosition, LiveStop,
    Observation, OrderId, OrderKind, StopType, TradeId,
};
use events::{BrokerEvent, ForcedClosure};
use risk::{MarginEngine, PositionSizer, SizingRequest};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// The mutable books of one account. Owned by the broker, driven by the
/// simulator.
#[derive(Debug)]
pub struct BrokerState {
    pub(crate) ledger: AccountLedger,
    pub(crate) book: OrderBook,
    pub(crate) positions: PositionManager,
    pub(crate) last_seen: HashMap<String, Observation>,
    events: Vec<BrokerEvent>,
}

impl BrokerState {
    pub fn new(config: &AccountConfig) -> Self {
        Self {
            ledger: AccountLedger::new(config),
            book: OrderBook::new(),
            positions: PositionManager::new(),
            last_seen: HashMap::new(),
            events: Vec::new(),
        }
    }

    /// Moves pending order transitions into the event queue.
    pub fn flush(&mut self) {
        let transitions = self.book.drain_transitions();
        self.events
            .extend(transitions.into_iter().map(BrokerEvent::OrderTransition));
    }

    pub fn take_events(&mut self) -> Vec<BrokerEvent> {
        self.flush();
        std::mem::take(&mut self.events)
    }

    fn emit(&mut self, event: BrokerEvent) {
        self.flush();
        self.events.push(event);
    }

    fn cancel_order(&mut self, id: OrderId, reason: CancelReason, at: DateTime<Utc>) {
        if let Err(e) = self.book.cancel(id, reason, Some(at)) {
            tracing::warn!(order_id = %id, error = %e, "Failed to cancel order");
        }
    }
}

/// Matches open orders against arriving observations and applies the
/// consequences to a [`BrokerState`].
pub struct ExecutionSimulator {
    commission_rate: Decimal,
    instruments: HashMap<String, InstrumentSpec>,
    margin: MarginEngine,
    sizer: Box<dyn PositionSizer>,
    executor: Box<dyn Executor>,
}

impl ExecutionSimulator {
    pub fn new(
        config: &AccountConfig,
        instruments: Vec<InstrumentSpec>,
        margin: MarginEngine,
        sizer: Box<dyn PositionSizer>,
        executor: Box<dyn Executor>,
    ) -> Self {
        Self {
            commission_rate: config.commission_rate,
            instruments: instruments.into_iter().map(|i| (i.symbol.clone(), i)).collect(),
            margin,
            sizer,
            executor,
        }
    }

    pub fn set_executor(&mut self, executor: Box<dyn Executor>) {
        self.executor = executor;
    }

    /// The instrument's spec, or defaults for an unconfigured symbol.
    pub fn instrument(&self, symbol: &str) -> InstrumentSpec {
        self.instruments
            .get(symbol)
            .cloned()
            .unwrap_or_else(|| InstrumentSpec::new(symbol))
    }

    pub fn set_conversion(&mut self, symbol: &str, quote_to_home: Decimal) {
        self.instruments
            .entry(symbol.to_string())
            .or_insert_with(|| InstrumentSpec::new(symbol))
            .quote_to_home = quote_to_home;
    }

    /// Applies one observation: opens eligible orders, matches them in
    /// deterministic order, checks exits, marks to market and enforces margin.
    pub fn process(&self, state: &mut BrokerState, instrument: &str, obs: &Observation) {
        let at = obs.timestamp();
        state.last_seen.insert(instrument.to_string(), obs.clone());
        self.revalue(state);

        state.book.advance(instrument, at);
        let mut opened = Vec::new();
        for id in state.book.open_orders(instrument) {
            self.evaluate_order(state, id, instrument, obs, &mut opened);
        }

        self.check_exits(state, instrument, obs, &opened);
        self.revalue(state);
        self.enforce_margin(state, at);

        risk::update_drawdown(state.ledger.state_mut());
        state.ledger.record_equity(at);
        state.flush();
    }

    fn evaluate_order(
        &self,
        state: &mut BrokerState,
        id: OrderId,
        instrument: &str,
        obs: &Observation,
        opened: &mut Vec<TradeId>,
    ) {
        let Some(order) = state.book.get(id) else {
            return;
        };
        let Some(kind) = order.kind.clone() else {
            return;
        };
        let triggered_at = order.triggered_at;
        let at = obs.timestamp();

        match kind {
            OrderKind::Market { direction, size, exits } => {
                let price = self.executor.market_price(direction, obs);
                let fill = Fill { order_id: id, instrument, direction, size, price, exits, at };
                self.fill_entry(state, fill, opened);
            }
            OrderKind::Limit { direction, size, limit_price, exits } => {
                if limit_crossed(direction, limit_price, obs) {
                    let fill = Fill { order_id: id, instrument, direction, size, price: limit_price, exits, at };
                    self.fill_entry(state, fill, opened);
                }
            }
            OrderKind::StopLimit { direction, size, stop_price, limit_price, exits } => {
                match triggered_at {
                    None => {
                        if stop_crossed(direction, stop_price, obs) {
                            tracing::debug!(order_id = %id, stop = %stop_price, "Stop-limit triggered");
                            state.book.mark_triggered(id, at);
                        }
                    }
                    Some(triggered) if triggered < at => {
                        if limit_crossed(direction, limit_price, obs) {
                            let fill = Fill { order_id: id, instrument, direction, size, price: limit_price, exits, at };
                            self.fill_entry(state, fill, opened);
                        }
                    }
                    Some(_) => {}
                }
            }
            OrderKind::Close { trades } => self.close_order(state, id, instrument, trades, obs),
            OrderKind::Reduce { direction, size } => {
                self.reduce_order(state, id, instrument, direction, size, obs)
            }
            OrderKind::Modify { trade, exits } => {
                self.modify_order(state, id, instrument, trade, exits, obs)
            }
        }
    }

    fn fill_entry(&self, state: &mut BrokerState, fill: Fill<'_>, opened: &mut Vec<TradeId>) {
        let spec = self.instrument(fill.instrument);
        let Fill { order_id, direction, price, at, .. } = fill;

        let stop = match fill.exits.stop_loss {
            Some(sl) => {
                let trigger = sl.level.resolve(direction, price, spec.pip_size, true);
                let wrong_side = match direction {
                    Direction::Long => trigger >= price,
                    Direction::Short => trigger <= price,
                };
                if wrong_side {
                    state.cancel_order(order_id, CancelReason::StopOnWrongSide { stop: trigger, fill: price }, at);
                    return;
                }
                Some(LiveStop {
                    stop_type: sl.stop_type,
                    trigger,
                    distance: (price - trigger).abs(),
                })
            }
            None => None,
        };

        let take_profit = fill
            .exits
            .take_profit
            .map(|level| level.resolve(direction, price, spec.pip_size, false));
        if let Some(take) = take_profit {
            let wrong_side = match direction {
                Direction::Long => take <= price,
                Direction::Short => take >= price,
            };
            if wrong_side {
                let reason = CancelReason::Invalid(format!(
                    "take profit {take} is on the wrong side of fill {price}"
                ));
                state.cancel_order(order_id, reason, at);
                return;
            }
        }

        let size = match (fill.size, stop) {
            (Some(size), _) => size,
            (None, Some(stop)) => {
                let request = SizingRequest {
                    nav: state.ledger.state().nav,
                    entry_price: price,
                    stop_price: stop.trigger,
                    quote_to_home: spec.quote_to_home,
                    size_precision: spec.size_precision,
                };
                match self.sizer.size(&request) {
                    Ok(size) => size,
                    Err(e) => {
                        state.cancel_order(order_id, CancelReason::Invalid(e.to_string()), at);
                        return;
                    }
                }
            }
            (None, None) => {
                let reason = CancelReason::Invalid("size or stop loss required to size the order".to_string());
                state.cancel_order(order_id, reason, at);
                return;
            }
        };
        if size <= Decimal::ZERO {
            state.cancel_order(order_id, CancelReason::ZeroSize, at);
            return;
        }

        let margin = self.margin.required_margin(size, price, spec.quote_to_home);
        let commission = self.commission(size, price, spec.quote_to_home);
        let required = margin + commission;
        let available = state.ledger.state().margin_available;
        if self.margin.check_fill(required, available).is_err() {
            tracing::warn!(order_id = %order_id, required = %required, available = %available, "Insufficient margin for fill");
            state.cancel_order(order_id, CancelReason::InsufficientMargin { required, available }, at);
            return;
        }

        let origin = state.book.get(order_id).map(|o| o.origin).unwrap_or_default();
        state.ledger.charge_commission(commission);
        state.book.mark_filled(order_id, Some(price), at);
        let trade = state
            .positions
            .open_trade(NewTrade {
                order_id,
                origin,
                instrument: fill.instrument.to_string(),
                direction,
                entry_price: price,
                size,
                opened_at: at,
                stop,
                take_profit,
                entry_commission: commission,
                margin,
            })
            .trade
            .clone();

        tracing::info!(
            trade_id = %trade.id,
            order_id = %order_id,
            instrument = %trade.instrument,
            direction = %direction,
            size = %size,
            price = %price,
            "Trade opened"
        );
        opened.push(trade.id);
        state.emit(BrokerEvent::TradeOpened(trade));
        self.revalue(state);
    }

    fn close_order(
        &self,
        state: &mut BrokerState,
        id: OrderId,
        instrument: &str,
        trades: Vec<TradeId>,
        obs: &Observation,
    ) {
        let at = obs.timestamp();
        let targets: Vec<TradeId> = if trades.is_empty() {
            state.positions.open_trade_ids(instrument)
        } else {
            trades
                .into_iter()
                .filter(|t| {
                    state
                        .positions
                        .get(*t)
                        .is_some_and(|p| p.trade.instrument == instrument)
                })
                .collect()
        };
        if targets.is_empty() {
            state.cancel_order(id, CancelReason::NoMatchingTrades, at);
            return;
        }

        state.book.mark_filled(id, None, at);
        for trade_id in targets {
            let Some(direction) = state.positions.get(trade_id).map(|p| p.trade.direction) else {
                continue;
            };
            let price = self.executor.market_price(direction.opposite(), obs);
            self.close_trade(state, trade_id, price, at, CloseReason::Strategy);
        }
    }

    /// A reduce order in `direction` closes trades of the opposite direction,
    /// oldest first, splitting the last one if it is only partly consumed.
    fn reduce_order(
        &self,
        state: &mut BrokerState,
        id: OrderId,
        instrument: &str,
        direction: Direction,
        size: Decimal,
        obs: &Observation,
    ) {
        let at = obs.timestamp();
        let target_direction = direction.opposite();
        let plan = {
            let candidates: Vec<&IsolatedPosition> = state
                .positions
                .open_trades(Some(instrument))
                .into_iter()
                .filter(|p| p.trade.direction == target_direction)
                .collect();
            fifo_reduction(&candidates, size)
        };
        if plan.is_empty() {
            state.cancel_order(id, CancelReason::NoMatchingTrades, at);
            return;
        }

        let price = self.executor.market_price(direction, obs);
        state.book.mark_filled(id, Some(price), at);
        for step in plan {
            let target = if step.full {
                step.trade_id
            } else {
                match state.positions.split(step.trade_id, step.size) {
                    Ok(carved) => carved,
                    Err(e) => {
                        tracing::warn!(trade_id = %step.trade_id, error = %e, "Failed to split trade for reduction");
                        continue;
                    }
                }
            };
            self.close_trade(state, target, price, at, CloseReason::Reduce);
        }
    }

    /// Replaces the stop-loss and/or take-profit of one open trade. Distances
    /// are measured from the trade's entry price.
    ///
    /// The new levels must sit on the right side of the price the trade could
    /// be closed at when the modify takes effect: a stop strictly on the losing
    /// side, a take-profit strictly on the winning side. Otherwise the modify is
    /// cancelled and the trade keeps its exits.
    fn modify_order(
        &self,
        state: &mut BrokerState,
        id: OrderId,
        instrument: &str,
        trade: TradeId,
        exits: Exits,
        obs: &Observation,
    ) {
        let at = obs.timestamp();
        let pip_size = self.instrument(instrument).pip_size;
        let Some(position) = state
            .positions
            .get(trade)
            .filter(|p| p.trade.instrument == instrument)
        else {
            state.cancel_order(id, CancelReason::NoMatchingTrades, at);
            return;
        };

        let direction = position.trade.direction;
        let entry = position.trade.entry_price;
        let market = self.executor.market_price(direction.opposite(), obs);

        let stop = exits.stop_loss.map(|sl| {
            let trigger = sl.level.resolve(direction, entry, pip_size, true);
            LiveStop {
                stop_type: sl.stop_type,
                trigger,
                distance: (entry - trigger).abs(),
            }
        });
        if let Some(stop) = stop {
            let wrong_side = match direction {
                Direction::Long => stop.trigger >= market,
                Direction::Short => stop.trigger <= market,
            };
            if wrong_side {
                tracing::warn!(trade_id = %trade, stop = %stop.trigger, market = %market, "Modify rejected: stop on wrong side of market");
                state.cancel_order(id, CancelReason::StopOnWrongSide { stop: stop.trigger, fill: market }, at);
                return;
            }
        }

        let take_profit = exits
            .take_profit
            .map(|level| level.resolve(direction, entry, pip_size, false));
        if let Some(take) = take_profit {
            let wrong_side = match direction {
                Direction::Long => take <= market,
                Direction::Short => take >= market,
            };
            if wrong_side {
                tracing::warn!(trade_id = %trade, take_profit = %take, market = %market, "Modify rejected: take profit on wrong side of market");
                let reason = CancelReason::Invalid(format!(
                    "take profit {take} is on the wrong side of market {market}"
                ));
                state.cancel_order(id, reason, at);
                return;
            }
        }

        let Some(position) = state.positions.get_mut(trade) else {
            return;
        };
        if stop.is_some() {
            position.stop = stop;
        }
        if take_profit.is_some() {
            position.take_profit = take_profit;
        }
        tracing::info!(trade_id = %trade, stop = ?position.stop.map(|s| s.trigger), take_profit = ?position.take_profit, "Trade exits modified");
        state.book.mark_filled(id, None, at);
    }

    /// Stop-loss and take-profit checks for every open trade on `instrument`.
    ///
    /// Exits are checked against the exit-side range from the executor, so
    /// with a modelled spread a long is stopped on the bid, the same price it
    /// is marked at. The stop is checked first, so a bar that crosses both
    /// exits closes at the stop. On the bar a trade was opened only the stop
    /// is checked and a trailing stop does not move.
    fn check_exits(
        &self,
        state: &mut BrokerState,
        instrument: &str,
        obs: &Observation,
        opened: &[TradeId],
    ) {
        let at = obs.timestamp();
        for id in state.positions.open_trade_ids(instrument) {
            let Some((direction, live_stop, take_profit)) = state
                .positions
                .get(id)
                .map(|p| (p.trade.direction, p.stop, p.take_profit))
            else {
                continue;
            };
            let (low, high) = self.executor.exit_range(direction, obs);

            if let Some(stop) = live_stop {
                // A stop needs price to trade through it; touching is not enough.
                let hit = match direction {
                    Direction::Long => low < stop.trigger,
                    Direction::Short => high > stop.trigger,
                };
                if hit {
                    let reason = match stop.stop_type {
                        StopType::Limit => CloseReason::StopLoss,
                        StopType::Trailing => CloseReason::TrailingStop,
                    };
                    self.close_trade(state, id, stop.trigger, at, reason);
                    continue;
                }
            }
            if opened.contains(&id) {
                continue;
            }

            if let Some(take) = take_profit {
                let hit = match direction {
                    Direction::Long => high >= take,
                    Direction::Short => low <= take,
                };
                if hit {
                    self.close_trade(state, id, take, at, CloseReason::TakeProfit);
                    continue;
                }
            }

            let extreme = match direction {
                Direction::Long => high,
                Direction::Short => low,
            };
            if let Some(stop) = state.positions.get_mut(id).and_then(|p| p.stop.as_mut()) {
                if stop.ratchet(direction, extreme) {
                    tracing::debug!(trade_id = %id, trigger = %stop.trigger, "Trailing stop ratcheted");
                }
            }
        }
    }

    /// Closes the largest-margin trades until available margin is non-negative.
    fn enforce_margin(&self, state: &mut BrokerState, at: DateTime<Utc>) {
        loop {
            let available = state.ledger.state().margin_available;
            let next = {
                let open = state.positions.open_trades(None);
                self.margin.margin_call_plan(available, &open).first().copied()
            };
            let Some(id) = next else {
                break;
            };
            let Some((price, margin, instrument)) = state
                .positions
                .get(id)
                .map(|p| (p.mark_price, p.margin, p.trade.instrument.clone()))
            else {
                break;
            };

            tracing::warn!(
                forced = true,
                trade_id = %id,
                instrument = %instrument,
                margin_available = %available,
                "Margin call: closing trade"
            );
            if self.close_trade(state, id, price, at, CloseReason::MarginCall).is_none() {
                break;
            }
            state.ledger.record_forced_closure();
            state.emit(BrokerEvent::MarginCall(ForcedClosure {
                trade_id: id,
                instrument,
                margin_released: margin,
                margin_available_before: available,
                at,
            }));
        }
    }

    /// Closes the listed trades (or every trade on `instrument` when `trades`
    /// is empty) immediately at their last mark.
    pub fn close_now(
        &self,
        state: &mut BrokerState,
        instrument: &str,
        trades: &[TradeId],
        reason: CloseReason,
    ) -> Result<Vec<ClosedTrade>, ExecutorError> {
        let obs = state
            .last_seen
            .get(instrument)
            .cloned()
            .ok_or_else(|| ExecutorError::NoPriceData(instrument.to_string()))?;
        let at = obs.timestamp();
        let targets = if trades.is_empty() {
            state.positions.open_trade_ids(instrument)
        } else {
            trades.to_vec()
        };

        let mut closed = Vec::new();
        for id in targets {
            let position = state.positions.get(id).ok_or(ExecutorError::TradeNotFound(id))?;
            let price = self.executor.mark_price(position.trade.direction, &obs);
            if let Some(c) = self.close_trade(state, id, price, at, reason) {
                closed.push(c);
            }
        }
        risk::update_drawdown(state.ledger.state_mut());
        state.ledger.record_equity(at);
        state.flush();
        Ok(closed)
    }

    fn close_trade(
        &self,
        state: &mut BrokerState,
        id: TradeId,
        price: Decimal,
        at: DateTime<Utc>,
        reason: CloseReason,
    ) -> Option<ClosedTrade> {
        let (size, instrument) = state
            .positions
            .get(id)
            .map(|p| (p.trade.size, p.trade.instrument.clone()))?;
        let conversion = self.instrument(&instrument).quote_to_home;
        let commission = self.commission(size, price, conversion);

        match state.positions.close(id, price, at, reason, commission, conversion) {
            Ok(closed) => {
                state.ledger.realize(closed.gross_pnl);
                state.ledger.charge_commission(commission);
                tracing::info!(
                    trade_id = %id,
                    instrument = %instrument,
                    price = %price,
                    reason = ?reason,
                    net_pnl = %closed.net_pnl,
                    "Trade closed"
                );
                state.emit(BrokerEvent::TradeClosed(closed.clone()));
                self.revalue(state);
                Some(closed)
            }
            Err(e) => {
                tracing::warn!(trade_id = %id, error = %e, "Failed to close trade");
                None
            }
        }
    }

    /// Marks every open trade at its exit-side price and refreshes NAV and margin.
    fn revalue(&self, state: &mut BrokerState) {
        let mut floating = Decimal::ZERO;
        let mut margin_used = Decimal::ZERO;
        for position in state.positions.iter_mut() {
            let conversion = self.instrument(&position.trade.instrument).quote_to_home;
            if let Some(obs) = state.last_seen.get(&position.trade.instrument) {
                position.mark_price = self.executor.mark_price(position.trade.direction, obs);
            }
            position.floating_pnl = position.trade.floating_pnl(position.mark_price, conversion);
            position.margin =
                self.margin
                    .required_margin(position.trade.size, position.mark_price, conversion);
            floating += position.floating_pnl;
            margin_used += position.margin;
        }
        state.ledger.revalue(floating, margin_used);
    }

    fn commission(&self, size: Decimal, price: Decimal, conversion: Decimal) -> Decimal {
        size * price * conversion * self.commission_rate
    }
}

struct Fill<'a> {
    order_id: OrderId,
    instrument: &'a str,
    direction: Direction,
    size: Option<Decimal>,
    price: Decimal,
    exits: Exits,
    at: DateTime<Utc>,
}

/// A buy limit fills once the ask side trades at or below it; a sell limit
/// once the bid side trades at or above it.
fn limit_crossed(direction: Direction, limit: Decimal, obs: &Observation) -> bool {
    let (low, high) = obs.range_for(direction);
    match direction {
        Direction::Long => low <= limit,
        Direction::Short => high >= limit,
    }
}

fn stop_crossed(direction: Direction, stop: Decimal, obs: &Observation) -> bool {
    let (low, high) = obs.range_for(direction);
    match direction {
        Direction::Long => high >= stop,
        Direction::Short => low <= stop,
    }
}
