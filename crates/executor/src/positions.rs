use crate::error::ExecutorError;
use chrono::{DateTime, Utc};
use core_types::{
    ClosedTrade, CloseReason, Direction, IsolatedPosition, LiveStop, OrderId, OrderOrigin,
    Position, Trade, TradeId,
};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// Details of a fill that opens a new trade.
#[derive(Debug, Clone)]
pub struct NewTrade {
    pub order_id: OrderId,
    pub origin: OrderOrigin,
    pub instrument: String,
    pub direction: Direction,
    pub entry_price: Decimal,
    pub size: Decimal,
    pub opened_at: DateTime<Utc>,
    pub stop: Option<LiveStop>,
    pub take_profit: Option<Decimal>,
    pub entry_commission: Decimal,
    pub margin: Decimal,
}

/// One step of a reduction: how much of which trade to close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reduction {
    pub trade_id: TradeId,
    pub size: Decimal,
    /// True when the whole trade is consumed.
    pub full: bool,
}

/// The reduction policy: consume trades oldest first until `size` is covered.
///
/// `trades` must already be in opening order. A request larger than the
/// combined size consumes every trade.
pub fn fifo_reduction(trades: &[&IsolatedPosition], size: Decimal) -> Vec<Reduction> {
    let mut remaining = size;
    let mut plan = Vec::new();
    for position in trades {
        if remaining <= Decimal::ZERO {
            break;
        }
        let available = position.trade.size;
        let take = remaining.min(available);
        plan.push(Reduction {
            trade_id: position.trade.id,
            size: take,
            full: take == available,
        });
        remaining -= take;
    }
    plan
}

/// Owns open trades (each as an isolated position) and the closed-trade archive.
#[derive(Debug, Default)]
pub struct PositionManager {
    open: BTreeMap<TradeId, IsolatedPosition>,
    closed: Vec<ClosedTrade>,
    next_trade_id: u64,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_trade(&mut self, new: NewTrade) -> &IsolatedPosition {
        let id = self.allocate_id();
        let trade = Trade {
            id,
            order_id: new.order_id,
            origin: new.origin,
            instrument: new.instrument,
            direction: new.direction,
            entry_price: new.entry_price,
            size: new.size,
            opened_at: new.opened_at,
            stop_loss: new.stop.map(|s| s.trigger),
            take_profit: new.take_profit,
            entry_commission: new.entry_commission,
            split_from: None,
        };
        self.open.entry(id).or_insert(IsolatedPosition {
            trade,
            stop: new.stop,
            take_profit: new.take_profit,
            mark_price: new.entry_price,
            floating_pnl: Decimal::ZERO,
            margin: new.margin,
        })
    }

    pub fn get(&self, id: TradeId) -> Option<&IsolatedPosition> {
        self.open.get(&id)
    }

    pub fn get_mut(&mut self, id: TradeId) -> Option<&mut IsolatedPosition> {
        self.open.get_mut(&id)
    }

    /// Open trades in opening order, optionally restricted to one instrument.
    pub fn open_trades(&self, instrument: Option<&str>) -> Vec<&IsolatedPosition> {
        self.open
            .values()
            .filter(|p| instrument.is_none_or(|i| p.trade.instrument == i))
            .collect()
    }

    pub fn open_trade_ids(&self, instrument: &str) -> Vec<TradeId> {
        self.open_trades(Some(instrument))
            .into_iter()
            .map(|p| p.trade.id)
            .collect()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut IsolatedPosition> {
        self.open.values_mut()
    }

    pub fn closed(&self) -> &[ClosedTrade] {
        &self.closed
    }

    /// Carves `size` off an open trade into a new trade id. The original keeps
    /// its id, entry time and the remaining size; entry commission is shared
    /// pro rata.
    pub fn split(&mut self, id: TradeId, size: Decimal) -> Result<TradeId, ExecutorError> {
        let new_id = TradeId(self.next_trade_id + 1);
        let original = self.open.get_mut(&id).ok_or(ExecutorError::TradeNotFound(id))?;
        if size <= Decimal::ZERO || size >= original.trade.size {
            return Err(ExecutorError::InvalidClosingQuantity {
                requested: size,
                available: original.trade.size,
            });
        }

        let fraction = size / original.trade.size;
        let mut carved = original.clone();
        carved.trade.id = new_id;
        carved.trade.size = size;
        carved.trade.entry_commission = original.trade.entry_commission * fraction;
        carved.trade.split_from = Some(id);
        carved.margin = original.margin * fraction;
        carved.floating_pnl = original.floating_pnl * fraction;

        original.trade.size -= size;
        original.trade.entry_commission -= carved.trade.entry_commission;
        original.margin -= carved.margin;
        original.floating_pnl -= carved.floating_pnl;

        tracing::debug!(trade_id = %id, split_id = %new_id, size = %size, "Trade split");
        self.next_trade_id += 1;
        self.open.insert(new_id, carved);
        Ok(new_id)
    }

    /// Removes a trade from the open set and archives it.
    pub fn close(
        &mut self,
        id: TradeId,
        exit_price: Decimal,
        closed_at: DateTime<Utc>,
        reason: CloseReason,
        exit_commission: Decimal,
        quote_to_home: Decimal,
    ) -> Result<ClosedTrade, ExecutorError> {
        let position = self.open.remove(&id).ok_or(ExecutorError::TradeNotFound(id))?;
        let gross_pnl = position.trade.floating_pnl(exit_price, quote_to_home);
        let net_pnl = gross_pnl - position.trade.entry_commission - exit_commission;
        let closed = ClosedTrade {
            trade: position.trade,
            exit_price,
            closed_at,
            reason,
            exit_commission,
            gross_pnl,
            net_pnl,
        };
        self.closed.push(closed.clone());
        Ok(closed)
    }

    /// Aggregate long/short units per instrument, derived from open trades.
    pub fn positions(&self) -> BTreeMap<String, Position> {
        let mut out: BTreeMap<String, Position> = BTreeMap::new();
        for p in self.open.values() {
            let entry = out.entry(p.trade.instrument.clone()).or_insert_with(|| Position {
                instrument: p.trade.instrument.clone(),
                long_units: Decimal::ZERO,
                short_units: Decimal::ZERO,
                trade_ids: Vec::new(),
                floating_pnl: Decimal::ZERO,
            });
            match p.trade.direction {
                Direction::Long => entry.long_units += p.trade.size,
                Direction::Short => entry.short_units += p.trade.size,
            }
            entry.trade_ids.push(p.trade.id);
            entry.floating_pnl += p.floating_pnl;
        }
        out
    }

    fn allocate_id(&mut self) -> TradeId {
        self.next_trade_id += 1;
        TradeId(self.next_trade_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn new_trade(direction: Direction, size: Decimal) -> NewTrade {
        NewTrade {
            order_id: OrderId(1),
            origin: OrderOrigin::default(),
            instrument: "EURUSD".to_string(),
            direction,
            entry_price: dec!(100),
            size,
            opened_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            stop: None,
            take_profit: None,
            entry_commission: dec!(1),
            margin: dec!(10),
        }
    }

    #[test]
    fn fifo_consumes_oldest_first() {
        let mut manager = PositionManager::new();
        manager.open_trade(new_trade(Direction::Long, dec!(5)));
        manager.open_trade(new_trade(Direction::Long, dec!(5)));
        let open = manager.open_trades(None);
        let plan = fifo_reduction(&open, dec!(7));
        assert_eq!(
            plan,
            vec![
                Reduction { trade_id: TradeId(1), size: dec!(5), full: true },
                Reduction { trade_id: TradeId(2), size: dec!(2), full: false },
            ]
        );
    }

    #[test]
    fn split_keeps_original_id_for_remainder() {
        let mut manager = PositionManager::new();
        manager.open_trade(new_trade(Direction::Long, dec!(10)));
        let carved = manager.split(TradeId(1), dec!(4)).unwrap();
        assert_eq!(carved, TradeId(2));
        let original = manager.get(TradeId(1)).unwrap();
        assert_eq!(original.trade.size, dec!(6));
        assert_eq!(original.trade.entry_commission, dec!(0.6));
        let piece = manager.get(carved).unwrap();
        assert_eq!(piece.trade.split_from, Some(TradeId(1)));
        assert_eq!(piece.margin, dec!(4));
        assert!(manager.split(TradeId(1), dec!(6)).is_err());
    }

    #[test]
    fn aggregate_matches_sum_of_trades() {
        let mut manager = PositionManager::new();
        manager.open_trade(new_trade(Direction::Long, dec!(3)));
        manager.open_trade(new_trade(Direction::Long, dec!(2)));
        manager.open_trade(new_trade(Direction::Short, dec!(4)));
        let positions = manager.positions();
        let eur = &positions["EURUSD"];
        assert_eq!(eur.long_units, dec!(5));
        assert_eq!(eur.short_units, dec!(4));
        assert_eq!(eur.net_units(), dec!(1));
        assert_eq!(eur.trade_ids.len(), 3);
    }

    #[test]
    fn close_books_gross_and_net() {
        let mut manager = PositionManager::new();
        manager.open_trade(new_trade(Direction::Short, dec!(2)));
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let closed = manager
            .close(TradeId(1), dec!(90), at, CloseReason::Strategy, dec!(0.5), dec!(1))
            .unwrap();
        assert_eq!(closed.gross_pnl, dec!(20));
        assert_eq!(closed.net_pnl, dec!(18.5));
        assert!(manager.get(TradeId(1)).is_none());
        assert_eq!(manager.closed().len(), 1);
    }
}
