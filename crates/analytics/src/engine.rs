use crate::error::AnalyticsError;
use crate::report::{InstrumentStats, PerformanceReport};
use chrono::{DateTime, Utc};
use core_types::ClosedTrade;
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;

/// A stateless calculator for deriving performance metrics from trading activity.
#[derive(Debug, Default)]
pub struct AnalyticsEngine {}

impl AnalyticsEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// The main entry point for calculating performance metrics.
    ///
    /// # Arguments
    ///
    /// * `trades` - Every closed trade of one ledger.
    /// * `equity_curve` - The ledger's `(timestamp, NAV)` series.
    /// * `initial_capital` - The starting balance of the ledger.
    pub fn calculate(
        &self,
        trades: &[ClosedTrade],
        equity_curve: &[(DateTime<Utc>, Decimal)],
        initial_capital: Decimal,
    ) -> Result<PerformanceReport, AnalyticsError> {
        tracing::debug!(trades = trades.len(), points = equity_curve.len(), "Calculating performance report");
        let mut report = PerformanceReport::new();

        // Drawdown and return come from the equity curve, so they are
        // meaningful even when every trade is still open.
        self.calculate_return(equity_curve, initial_capital, &mut report);
        self.calculate_drawdown(equity_curve, &mut report);
        if !trades.is_empty() {
            self.calculate_profitability(trades, &mut report);
            self.calculate_time_metrics(trades, &mut report);
        }
        self.calculate_ratios(equity_curve, &mut report)?;

        Ok(report)
    }

    /// Groups closed trades by instrument.
    pub fn per_instrument(&self, trades: &[ClosedTrade]) -> BTreeMap<String, InstrumentStats> {
        let mut stats: BTreeMap<String, InstrumentStats> = BTreeMap::new();
        for closed in trades {
            let entry = stats.entry(closed.trade.instrument.clone()).or_default();
            entry.trades += 1;
            entry.net_pnl += closed.net_pnl;
            if closed.is_win() {
                entry.wins += 1;
                entry.gross_profit += closed.net_pnl;
            } else {
                entry.gross_loss += closed.net_pnl.abs();
            }
            if closed.reason.is_forced() {
                entry.forced_closures += 1;
            }
        }
        stats
    }

    fn calculate_return(
        &self,
        equity_curve: &[(DateTime<Utc>, Decimal)],
        initial_capital: Decimal,
        report: &mut PerformanceReport,
    ) {
        let Some(&(_, final_equity)) = equity_curve.last() else {
            return;
        };
        report.total_net_profit = final_equity - initial_capital;
        if initial_capital > Decimal::ZERO {
            report.total_return_pct = (report.total_net_profit / initial_capital) * Decimal::ONE_HUNDRED;
        }
    }

    /// Calculates all profitability-related metrics.
    fn calculate_profitability(&self, trades: &[ClosedTrade], report: &mut PerformanceReport) {
        report.total_trades = trades.len();

        for closed in trades {
            let pnl = closed.net_pnl;
            report.commission_paid += closed.trade.entry_commission + closed.exit_commission;
            if closed.reason.is_forced() {
                report.forced_closures += 1;
            }

            if closed.is_win() {
                report.gross_profit += pnl;
                report.winning_trades += 1;
            } else {
                report.gross_loss += pnl.abs();
                report.losing_trades += 1;
            }
        }

        // --- Ratios ---
        if report.gross_loss > Decimal::ZERO {
            report.profit_factor = Some(report.gross_profit / report.gross_loss);
        }

        report.win_rate_pct = Some(
            (Decimal::from(report.winning_trades) / Decimal::from(report.total_trades))
                * Decimal::ONE_HUNDRED,
        );

        if report.winning_trades > 0 {
            report.average_win = report.gross_profit / Decimal::from(report.winning_trades);
        }

        if report.losing_trades > 0 {
            report.average_loss = report.gross_loss / Decimal::from(report.losing_trades);
            if report.average_loss > Decimal::ZERO {
                report.payoff_ratio = Some(report.average_win / report.average_loss);
            }
        }
    }

    /// Calculates maximum drawdown from the equity curve.
    fn calculate_drawdown(&self, equity_curve: &[(DateTime<Utc>, Decimal)], report: &mut PerformanceReport) {
        let Some(&(_, first)) = equity_curve.first() else {
            return;
        };

        let mut peak_equity = first;
        let mut max_drawdown = Decimal::ZERO;
        let mut max_drawdown_pct = Decimal::ZERO;
        for &(_timestamp, equity) in equity_curve {
            if equity > peak_equity {
                peak_equity = equity;
            }
            let drawdown = peak_equity - equity;
            if drawdown > max_drawdown {
                max_drawdown = drawdown;
            }
            if peak_equity > Decimal::ZERO {
                max_drawdown_pct = max_drawdown_pct.max(drawdown / peak_equity * Decimal::ONE_HUNDRED);
            }
        }

        report.max_drawdown = max_drawdown;
        report.max_drawdown_pct = max_drawdown_pct;
    }

    /// Calculates all ratio-based metrics like Sharpe and Calmar.
    fn calculate_ratios(
        &self,
        equity_curve: &[(DateTime<Utc>, Decimal)],
        report: &mut PerformanceReport,
    ) -> Result<(), AnalyticsError> {
        // --- Calmar Ratio ---
        if report.max_drawdown_pct > Decimal::ZERO {
            report.calmar_ratio = Some(report.total_return_pct / report.max_drawdown_pct);
        }

        // --- Sharpe Ratio ---
        // Per-observation returns, risk-free rate of zero, not annualized.
        let returns: Vec<Decimal> = equity_curve
            .windows(2)
            .filter(|w| !w[0].1.is_zero())
            .map(|w| (w[1].1 - w[0].1) / w[0].1)
            .collect();

        if returns.len() < 2 {
            return Ok(());
        }

        let mean_return = returns.iter().sum::<Decimal>() / Decimal::from(returns.len());
        let variance: Decimal = returns
            .iter()
            .map(|r| (*r - mean_return) * (*r - mean_return))
            .sum::<Decimal>()
            / Decimal::from(returns.len());

        if variance <= Decimal::ZERO {
            return Ok(());
        }

        let std_dev = variance.sqrt().ok_or_else(|| {
            AnalyticsError::InternalError("Failed to calculate square root for variance".to_string())
        })?;
        if std_dev > Decimal::ZERO {
            report.sharpe_ratio = Some(mean_return / std_dev);
        }

        Ok(())
    }

    /// Calculates time-based metrics.
    fn calculate_time_metrics(&self, trades: &[ClosedTrade], report: &mut PerformanceReport) {
        let total_duration_secs: i64 = trades
            .iter()
            .map(|c| (c.closed_at - c.trade.opened_at).num_seconds())
            .sum();
        report.average_holding_secs = total_duration_secs / trades.len() as i64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use core_types::{CloseReason, Direction, OrderId, OrderOrigin, Trade, TradeId};
    use rust_decimal_macros::dec;

    fn t(hours: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hours)
    }

    fn closed(id: u64, instrument: &str, net: Decimal, reason: CloseReason) -> ClosedTrade {
        ClosedTrade {
            trade: Trade {
                id: TradeId(id),
                order_id: OrderId(id),
                origin: OrderOrigin::default(),
                instrument: instrument.to_string(),
                direction: Direction::Long,
                entry_price: dec!(100),
                size: dec!(1),
                opened_at: t(0),
                stop_loss: None,
                take_profit: None,
                entry_commission: dec!(0.5),
                split_from: None,
            },
            exit_price: dec!(100) + net,
            closed_at: t(2),
            reason,
            exit_commission: dec!(0.5),
            gross_pnl: net + dec!(1),
            net_pnl: net,
        }
    }

    #[test]
    fn profitability_and_per_instrument_stats() {
        let trades = vec![
            closed(1, "EURUSD", dec!(30), CloseReason::TakeProfit),
            closed(2, "EURUSD", dec!(-10), CloseReason::StopLoss),
            closed(3, "GBPUSD", dec!(-20), CloseReason::MarginCall),
        ];
        let curve = vec![(t(0), dec!(1000)), (t(1), dec!(1030)), (t(2), dec!(1000))];
        let engine = AnalyticsEngine::new();
        let report = engine.calculate(&trades, &curve, dec!(1000)).unwrap();

        assert_eq!(report.total_trades, 3);
        assert_eq!(report.winning_trades, 1);
        assert_eq!(report.gross_profit, dec!(30));
        assert_eq!(report.gross_loss, dec!(30));
        assert_eq!(report.profit_factor, Some(dec!(1)));
        assert_eq!(report.commission_paid, dec!(3));
        assert_eq!(report.forced_closures, 1);
        assert_eq!(report.average_holding_secs, 7200);
        assert_eq!(report.total_net_profit, dec!(0));

        let stats = engine.per_instrument(&trades);
        let eur = &stats["EURUSD"];
        assert_eq!(eur.trades, 2);
        assert_eq!(eur.win_rate_pct(), Some(dec!(50)));
        assert_eq!(eur.reward_risk(), Some(dec!(3)));
        assert_eq!(stats["GBPUSD"].forced_closures, 1);
        assert_eq!(stats["GBPUSD"].reward_risk(), None);
    }

    #[test]
    fn drawdown_is_measured_from_the_running_peak() {
        let curve = vec![
            (t(0), dec!(1000)),
            (t(1), dec!(1200)),
            (t(2), dec!(900)),
            (t(3), dec!(1100)),
        ];
        let report = AnalyticsEngine::new().calculate(&[], &curve, dec!(1000)).unwrap();
        assert_eq!(report.max_drawdown, dec!(300));
        assert_eq!(report.max_drawdown_pct, dec!(25));
        assert_eq!(report.total_return_pct, dec!(10));
        assert_eq!(report.total_trades, 0);
        assert!(report.sharpe_ratio.is_some());
    }
}
