use crate::error::RiskError;
use core_types::{IsolatedPosition, TradeId};
use rust_decimal::Decimal;

/// Margin arithmetic for one account.
#[derive(Debug, Clone)]
pub struct MarginEngine {
    leverage: Decimal,
}

impl MarginEngine {
    pub fn new(leverage: Decimal) -> Result<Self, RiskError> {
        if leverage < Decimal::ONE {
            return Err(RiskError::InvalidParameters(format!(
                "leverage must be at least 1, got {leverage}"
            )));
        }
        Ok(Self { leverage })
    }

    pub fn leverage(&self) -> Decimal {
        self.leverage
    }

    /// Notional value of `size` at `price`, divided by leverage, in home currency.
    pub fn required_margin(&self, size: Decimal, price: Decimal, quote_to_home: Decimal) -> Decimal {
        size * price * quote_to_home / self.leverage
    }

    /// NAV minus the margin locked by every open trade.
    pub fn available_margin(&self, nav: Decimal, open: &[&IsolatedPosition]) -> Decimal {
        nav - open.iter().map(|p| p.margin).sum::<Decimal>()
    }

    /// Refuses a fill that would drive available margin below zero.
    pub fn check_fill(&self, required: Decimal, available: Decimal) -> Result<(), RiskError> {
        if available - required < Decimal::ZERO {
            return Err(RiskError::InsufficientMargin {
                required,
                available,
            });
        }
        Ok(())
    }

    /// Chooses the trades to close when available margin is negative:
    /// largest margin first (oldest trade on ties) until the released margin
    /// covers the shortfall. Returns an empty plan when no call is due.
    pub fn margin_call_plan(&self, available: Decimal, open: &[&IsolatedPosition]) -> Vec<TradeId> {
        if available >= Decimal::ZERO {
            return Vec::new();
        }
        let mut candidates: Vec<(TradeId, Decimal)> =
            open.iter().map(|p| (p.trade.id, p.margin)).collect();
        candidates.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut plan = Vec::new();
        let mut remaining = available;
        for (id, margin) in candidates {
            if remaining >= Decimal::ZERO {
                break;
            }
            remaining += margin;
            plan.push(id);
        }
        tracing::debug!(shortfall = %available, closures = plan.len(), "Margin call plan computed");
        plan
    }
}
