use crate::order::Order;
use crate::trade::{IsolatedPosition, Position};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Raw account figures for one ledger, in home currency.
///
/// Mutated only by the ledger (cash and valuation) and the risk engine
/// (drawdown statistics).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountState {
    pub home_currency: String,
    pub initial_balance: Decimal,
    /// Realized cash.
    pub balance: Decimal,
    /// Balance plus floating P&L of every open trade.
    pub nav: Decimal,
    pub margin_used: Decimal,
    pub margin_available: Decimal,
    pub realized_pnl: Decimal,
    pub commission_paid: Decimal,
    /// Highest NAV seen.
    pub peak: Decimal,
    /// Lowest NAV since the last new peak.
    pub trough: Decimal,
    /// Current drawdown as a non-positive fraction of the peak.
    pub drawdown: Decimal,
    /// Most negative drawdown ever recorded.
    pub max_drawdown: Decimal,
    pub forced_closures: u32,
}

impl AccountState {
    pub fn new(home_currency: &str, initial_balance: Decimal) -> Self {
        Self {
            home_currency: home_currency.to_string(),
            initial_balance,
            balance: initial_balance,
            nav: initial_balance,
            margin_used: Decimal::ZERO,
            margin_available: initial_balance,
            realized_pnl: Decimal::ZERO,
            commission_paid: Decimal::ZERO,
            peak: initial_balance,
            trough: initial_balance,
            drawdown: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            forced_closures: 0,
        }
    }
}

/// Everything a strategy or a report may read about a ledger, taken at one
/// point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerSnapshot {
    pub as_of: Option<DateTime<Utc>>,
    pub account: AccountState,
    pub positions: BTreeMap<String, Position>,
    pub open_trades: Vec<IsolatedPosition>,
    pub active_orders: Vec<Order>,
}

impl BrokerSnapshot {
    pub fn empty(account: AccountState) -> Self {
        Self {
            as_of: None,
            account,
            positions: BTreeMap::new(),
            open_trades: Vec::new(),
            active_orders: Vec::new(),
        }
    }

    pub fn position(&self, instrument: &str) -> Option<&Position> {
        self.positions.get(instrument)
    }

    pub fn open_trades_for<'a>(
        &'a self,
        instrument: &'a str,
    ) -> impl Iterator<Item = &'a IsolatedPosition> + 'a {
        self.open_trades
            .iter()
            .filter(move |p| p.trade.instrument == instrument)
    }
}
