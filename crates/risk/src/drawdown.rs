use core_types::AccountState;
use rust_decimal::Decimal;

/// Updates peak, trough, drawdown and max drawdown from the current NAV.
///
/// Drawdown is `(nav - peak) / peak`, a non-positive fraction clamped at -1.
/// Max drawdown only moves when a deeper drawdown is recorded; a new peak
/// resets the trough but never improves the max.
pub fn update_drawdown(account: &mut AccountState) {
    if account.nav > account.peak {
        account.peak = account.nav;
        account.trough = account.nav;
    } else if account.nav < account.trough {
        account.trough = account.nav;
    }

    account.drawdown = if account.peak > Decimal::ZERO {
        ((account.nav - account.peak) / account.peak).max(Decimal::NEGATIVE_ONE)
    } else {
        Decimal::NEGATIVE_ONE
    };

    if account.drawdown < account.max_drawdown {
        account.max_drawdown = account.drawdown;
        tracing::debug!(
            max_drawdown = %account.max_drawdown,
            peak = %account.peak,
            trough = %account.trough,
            "New max drawdown recorded"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn walk(navs: &[Decimal]) -> AccountState {
        let mut account = AccountState::new("USD", dec!(100));
        for nav in navs {
            account.nav = *nav;
            update_drawdown(&mut account);
        }
        account
    }

    #[test]
    fn max_drawdown_is_non_improving() {
        let account = walk(&[dec!(120), dec!(90), dec!(150), dec!(140)]);
        assert_eq!(account.peak, dec!(150));
        assert_eq!(account.trough, dec!(140));
        assert_eq!(account.max_drawdown, dec!(-0.25));
        assert_eq!(account.drawdown, (dec!(140) - dec!(150)) / dec!(150));
    }

    #[test]
    fn drawdown_never_exceeds_one_hundred_percent() {
        let account = walk(&[dec!(-50)]);
        assert_eq!(account.drawdown, dec!(-1));
        assert_eq!(account.max_drawdown, dec!(-1));
    }
}
