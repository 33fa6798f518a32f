use crate::error::RiskError;
use configuration::RiskManagement;
use rust_decimal::{Decimal, RoundingStrategy};

/// Inputs for sizing an order that omitted its size.
#[derive(Debug, Clone)]
pub struct SizingRequest {
    pub nav: Decimal,
    pub entry_price: Decimal,
    pub stop_price: Decimal,
    pub quote_to_home: Decimal,
    pub size_precision: u32,
}

/// Turns an entry/stop pair into an order size.
pub trait PositionSizer: Send + Sync {
    fn size(&self, request: &SizingRequest) -> Result<Decimal, RiskError>;
}

/// Risks a fixed fraction of NAV between entry and stop.
#[derive(Debug, Clone)]
pub struct FixedFractionalSizer {
    params: RiskManagement,
}

impl FixedFractionalSizer {
    /// Creates a new `FixedFractionalSizer` with the given configuration parameters.
    pub fn new(params: RiskManagement) -> Result<Self, RiskError> {
        if params.risk_per_trade_pct <= Decimal::ZERO || params.risk_per_trade_pct >= Decimal::ONE {
            return Err(RiskError::InvalidParameters(
                "risk_per_trade_pct must be between 0 and 1".to_string(),
            ));
        }
        Ok(Self { params })
    }
}

impl PositionSizer for FixedFractionalSizer {
    /// `size = NAV * risk_pct / (|entry - stop| * quote_to_home)`, rounded
    /// toward zero to the instrument's size precision.
    fn size(&self, request: &SizingRequest) -> Result<Decimal, RiskError> {
        if request.entry_price <= Decimal::ZERO {
            return Err(RiskError::InvalidEntryPrice(request.entry_price));
        }
        if request.nav <= Decimal::ZERO {
            return Err(RiskError::InsufficientEquity(request.nav));
        }

        let stop_distance = (request.entry_price - request.stop_price).abs();
        if stop_distance.is_zero() {
            return Err(RiskError::Calculation(
                "Stop-loss distance cannot be zero".to_string(),
            ));
        }

        let risk_capital = request.nav * self.params.risk_per_trade_pct;
        let per_unit_risk = stop_distance * request.quote_to_home;
        let size = (risk_capital / per_unit_risk)
            .round_dp_with_strategy(request.size_precision, RoundingStrategy::ToZero);

        tracing::debug!(
            nav = %request.nav,
            risk_capital = %risk_capital,
            stop_distance = %stop_distance,
            size = %size,
            "Risk-based position size computed"
        );
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sizer(pct: Decimal) -> FixedFractionalSizer {
        FixedFractionalSizer::new(RiskManagement {
            risk_per_trade_pct: pct,
        })
        .unwrap()
    }

    #[test]
    fn risks_fraction_of_nav_over_stop_distance() {
        let size = sizer(dec!(0.01))
            .size(&SizingRequest {
                nav: dec!(10000),
                entry_price: dec!(1.1000),
                stop_price: dec!(1.0950),
                quote_to_home: dec!(1),
                size_precision: 0,
            })
            .unwrap();
        // 100 risked over 0.005 per unit.
        assert_eq!(size, dec!(20000));
    }

    #[test]
    fn size_rounds_toward_zero() {
        let size = sizer(dec!(0.01))
            .size(&SizingRequest {
                nav: dec!(1000),
                entry_price: dec!(100),
                stop_price: dec!(97),
                quote_to_home: dec!(1),
                size_precision: 1,
            })
            .unwrap();
        assert_eq!(size, dec!(3.3));
    }

    #[test]
    fn zero_stop_distance_is_an_error() {
        let result = sizer(dec!(0.01)).size(&SizingRequest {
            nav: dec!(1000),
            entry_price: dec!(100),
            stop_price: dec!(100),
            quote_to_home: dec!(1),
            size_precision: 0,
        });
        assert!(matches!(result, Err(RiskError::Calculation(_))));
    }

    #[test]
    fn invalid_risk_fraction_is_rejected() {
        assert!(FixedFractionalSizer::new(RiskManagement {
            risk_per_trade_pct: dec!(1.5)
        })
        .is_err());
    }
}
