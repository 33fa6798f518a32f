use chrono::{DateTime, Utc};
use configuration::AccountConfig;
use core_types::AccountState;
use rust_decimal::Decimal;

/// Owns the cash and valuation figures of one trading account.
///
/// The ledger never computes P&L itself; the execution simulator tells it
/// what was realized and what is floating, and the risk engine updates the
/// drawdown fields through [`AccountLedger::state_mut`].
#[derive(Debug, Clone)]
pub struct AccountLedger {
    state: AccountState,
    equity_curve: Vec<(DateTime<Utc>, Decimal)>,
}

impl AccountLedger {
    pub fn new(config: &AccountConfig) -> Self {
        Self {
            state: AccountState::new(&config.home_currency, config.initial_balance),
            equity_curve: Vec::new(),
        }
    }

    pub fn state(&self) -> &AccountState {
        &self.state
    }

    pub fn state_mut(&mut self) -> &mut AccountState {
        &mut self.state
    }

    /// Books a realized gross P&L into cash.
    pub fn realize(&mut self, gross_pnl: Decimal) {
        self.state.balance += gross_pnl;
        self.state.realized_pnl += gross_pnl;
    }

    pub fn charge_commission(&mut self, amount: Decimal) {
        self.state.balance -= amount;
        self.state.commission_paid += amount;
    }

    /// Recomputes NAV and available margin from the current floating P&L
    /// and locked margin of all open trades.
    pub fn revalue(&mut self, floating_pnl: Decimal, margin_used: Decimal) {
        self.state.nav = self.state.balance + floating_pnl;
        self.state.margin_used = margin_used;
        self.state.margin_available = self.state.nav - margin_used;
    }

    pub fn record_forced_closure(&mut self) {
        self.state.forced_closures += 1;
    }

    /// Appends the current NAV to the equity curve. Several observations at
    /// one timestamp (one per instrument) collapse into a single point.
    pub fn record_equity(&mut self, at: DateTime<Utc>) {
        match self.equity_curve.last_mut() {
            Some((last, nav)) if *last == at => *nav = self.state.nav,
            _ => self.equity_curve.push((at, self.state.nav)),
        }
    }

    pub fn equity_curve(&self) -> &[(DateTime<Utc>, Decimal)] {
        &self.equity_curve
    }
}
