use analytics::{InstrumentStats, PerformanceReport};
use configuration::RunMode;
use core_types::AccountState;
use engine::BotReport;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use uuid::Uuid;

/// Results for one account ledger.
#[derive(Debug, Clone)]
pub struct LedgerSummary {
    pub label: String,
    /// Registration indices of the bots trading on this ledger.
    pub bots: Vec<usize>,
    pub account: AccountState,
    pub report: PerformanceReport,
}

/// The run-level view, aggregated across every ledger and bot.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub ticks: usize,
    pub ledgers: Vec<LedgerSummary>,
    pub bots: Vec<BotReport>,
    /// Closed-trade statistics across all ledgers.
    pub instruments: BTreeMap<String, InstrumentStats>,
}

impl RunSummary {
    pub fn initial_capital(&self) -> Decimal {
        self.ledgers.iter().map(|l| l.account.initial_balance).sum()
    }

    pub fn final_nav(&self) -> Decimal {
        self.ledgers.iter().map(|l| l.account.nav).sum()
    }

    /// Combined return of all ledgers, in percent.
    pub fn total_return_pct(&self) -> Option<Decimal> {
        let initial = self.initial_capital();
        (initial > Decimal::ZERO).then(|| (self.final_nav() - initial) / initial * Decimal::ONE_HUNDRED)
    }

    pub fn total_trades(&self) -> usize {
        self.instruments.values().map(|s| s.trades).sum()
    }

    pub fn forced_closures(&self) -> u32 {
        self.ledgers.iter().map(|l| l.account.forced_closures).sum()
    }
}
