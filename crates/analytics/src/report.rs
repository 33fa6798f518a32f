use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A standardized report of one ledger's performance.
///
/// This struct is the output of the `AnalyticsEngine` and the unit the run
/// summary aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    // I. Core Profitability Metrics
    pub total_net_profit: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub commission_paid: Decimal,
    pub profit_factor: Option<Decimal>, // Option<> because it can be infinite if GrossLoss is 0
    pub total_return_pct: Decimal,

    // II. Risk and Drawdown
    pub max_drawdown: Decimal,
    pub max_drawdown_pct: Decimal,
    pub sharpe_ratio: Option<Decimal>, // Option<> for cases with no stdev
    pub calmar_ratio: Option<Decimal>, // Option<> for cases with no drawdown
    pub forced_closures: usize,

    // III. Trade-Level Statistics
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate_pct: Option<Decimal>, // Option<> for cases with 0 trades
    pub average_win: Decimal,
    pub average_loss: Decimal,
    pub payoff_ratio: Option<Decimal>, // Option<> because avg_loss can be 0

    // IV. Time-Based Metrics
    pub average_holding_secs: i64,
}

impl PerformanceReport {
    /// Creates a new, zeroed-out PerformanceReport.
    pub fn new() -> Self {
        Self {
            total_net_profit: Decimal::ZERO,
            gross_profit: Decimal::ZERO,
            gross_loss: Decimal::ZERO,
            commission_paid: Decimal::ZERO,
            profit_factor: None,
            total_return_pct: Decimal::ZERO,
            max_drawdown: Decimal::ZERO,
            max_drawdown_pct: Decimal::ZERO,
            sharpe_ratio: None,
            calmar_ratio: None,
            forced_closures: 0,
            total_trades: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate_pct: None,
            average_win: Decimal::ZERO,
            average_loss: Decimal::ZERO,
            payoff_ratio: None,
            average_holding_secs: 0,
        }
    }
}

impl Default for PerformanceReport {
    fn default() -> Self {
        Self::new()
    }
}

/// Closed-trade statistics for one instrument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstrumentStats {
    pub trades: usize,
    pub wins: usize,
    pub net_pnl: Decimal,
    pub gross_profit: Decimal,
    pub gross_loss: Decimal,
    pub forced_closures: usize,
}

impl InstrumentStats {
    pub fn win_rate_pct(&self) -> Option<Decimal> {
        (self.trades > 0).then(|| Decimal::from(self.wins) / Decimal::from(self.trades) * Decimal::ONE_HUNDRED)
    }

    /// Average win divided by average loss.
    pub fn reward_risk(&self) -> Option<Decimal> {
        let losses = self.trades - self.wins;
        if self.wins == 0 || losses == 0 || self.gross_loss.is_zero() {
            return None;
        }
        let average_win = self.gross_profit / Decimal::from(self.wins);
        let average_loss = self.gross_loss / Decimal::from(losses);
        Some(average_win / average_loss)
    }
}
