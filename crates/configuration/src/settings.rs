use crate::error::ConfigError;
use core_types::Direction;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;

/// The root configuration structure for a run.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub account: AccountConfig,
    pub risk_management: RiskManagement,
    #[serde(default)]
    pub instruments: Vec<InstrumentSpec>,
    #[serde(default)]
    pub run: RunConfig,
    /// Instruments every configured strategy is deployed on.
    #[serde(default)]
    pub watchlist: Vec<String>,
    #[serde(default)]
    pub bots: Vec<StrategyConfig>,
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.account.validate()?;
        self.risk_management.validate()?;
        for instrument in &self.instruments {
            instrument.validate()?;
        }
        if self.run.mode == RunMode::Continuous && self.run.tick_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "run.tick_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.run.window == Some(0) {
            return Err(ConfigError::ValidationError(
                "run.window must be greater than 0 when set".to_string(),
            ));
        }
        Ok(())
    }

    /// The spec for `symbol`, falling back to defaults for unlisted instruments.
    pub fn instrument(&self, symbol: &str) -> InstrumentSpec {
        self.instruments
            .iter()
            .find(|i| i.symbol == symbol)
            .cloned()
            .unwrap_or_else(|| InstrumentSpec::new(symbol))
    }
}

/// Account parameters consumed once at run start.
#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub initial_balance: Decimal,
    /// Notional exposure allowed per unit of margin (e.g. 30 for 30:1).
    pub leverage: Decimal,
    /// Commission per fill as a fraction of notional. 0.0004 is 0.04%.
    #[serde(default)]
    pub commission_rate: Decimal,
    #[serde(default = "default_home_currency")]
    pub home_currency: String,
    #[serde(default)]
    pub spread: SpreadModel,
}

fn default_home_currency() -> String {
    "USD".to_string()
}

impl AccountConfig {
    pub fn new(initial_balance: Decimal, leverage: Decimal) -> Self {
        Self {
            initial_balance,
            leverage,
            commission_rate: Decimal::ZERO,
            home_currency: default_home_currency(),
            spread: SpreadModel::default(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_balance <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "account.initial_balance must be greater than 0".to_string(),
            ));
        }
        if self.leverage < Decimal::ONE {
            return Err(ConfigError::ValidationError(
                "account.leverage must be at least 1".to_string(),
            ));
        }
        if self.commission_rate < Decimal::ZERO || self.commission_rate >= Decimal::ONE {
            return Err(ConfigError::ValidationError(
                "account.commission_rate must be between 0 and 1".to_string(),
            ));
        }
        self.spread.validate()
    }
}

/// Synthetic bid/ask model used when observations are bars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpreadModel {
    /// A fixed spread in price units.
    Constant { value: Decimal },
    /// A spread proportional to the mid price.
    Proportional { fraction: Decimal },
}

impl Default for SpreadModel {
    fn default() -> Self {
        SpreadModel::Constant {
            value: Decimal::ZERO,
        }
    }
}

impl SpreadModel {
    pub fn half_spread(&self, mid: Decimal) -> Decimal {
        match self {
            SpreadModel::Constant { value } => *value / Decimal::TWO,
            SpreadModel::Proportional { fraction } => mid * *fraction / Decimal::TWO,
        }
    }

    /// The price paid by a buyer (`Long`) or received by a seller (`Short`)
    /// around `mid`.
    pub fn price_for(&self, side: Direction, mid: Decimal) -> Decimal {
        match side {
            Direction::Long => mid + self.half_spread(mid),
            Direction::Short => mid - self.half_spread(mid),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let value = match self {
            SpreadModel::Constant { value } => *value,
            SpreadModel::Proportional { fraction } => *fraction,
        };
        if value < Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "account.spread must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// Contains parameters for trade-level risk management.
#[derive(Debug, Clone, Deserialize)]
pub struct RiskManagement {
    /// The fraction of NAV to risk on an order that omits its size (e.g. 0.01 for 1%).
    pub risk_per_trade_pct: Decimal,
}

impl Default for RiskManagement {
    fn default() -> Self {
        Self {
            risk_per_trade_pct: dec!(0.01),
        }
    }
}

impl RiskManagement {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.risk_per_trade_pct <= Decimal::ZERO || self.risk_per_trade_pct >= Decimal::ONE {
            return Err(ConfigError::ValidationError(
                "risk_management.risk_per_trade_pct must be between 0 and 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Per-instrument trading parameters.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: String,
    /// Size of one price increment; stop and take distances are in these units.
    #[serde(default = "default_pip_size")]
    pub pip_size: Decimal,
    /// Decimal places kept when the risk engine computes a size.
    #[serde(default)]
    pub size_precision: u32,
    /// Multiplier converting quote-currency amounts into the home currency.
    #[serde(default = "default_conversion")]
    pub quote_to_home: Decimal,
}

fn default_pip_size() -> Decimal {
    dec!(0.0001)
}

fn default_conversion() -> Decimal {
    Decimal::ONE
}

impl InstrumentSpec {
    pub fn new(symbol: &str) -> Self {
        Self {
            symbol: symbol.to_string(),
            pip_size: default_pip_size(),
            size_precision: 0,
            quote_to_home: default_conversion(),
        }
    }

    pub fn with_pip_size(mut self, pip_size: Decimal) -> Self {
        self.pip_size = pip_size;
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.pip_size <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "instrument {}: pip_size must be greater than 0",
                self.symbol
            )));
        }
        if self.quote_to_home <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "instrument {}: quote_to_home must be greater than 0",
                self.symbol
            )));
        }
        Ok(())
    }
}

/// How the scheduler invokes strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Index-driven: one pass over a known series.
    #[default]
    Periodic,
    /// Time-driven: one persistent strategy per bot, fed as time advances.
    Continuous,
}

/// The clock behind continuous mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
pub enum ClockKind {
    /// Steps through the timestamps of the historical data.
    #[default]
    Simulated,
    /// Ticks on the wall clock every `tick_interval_secs`.
    Wall,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub mode: RunMode,
    /// All bots settle against one ledger when true, otherwise each owns one.
    #[serde(default = "default_true")]
    pub shared_ledger: bool,
    /// Look-back window handed to live periodic polls. `None` means full history.
    #[serde(default)]
    pub window: Option<usize>,
    #[serde(default)]
    pub clock: ClockKind,
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,
    /// Directory holding one liveness marker file per continuous-mode bot.
    #[serde(default)]
    pub liveness_dir: Option<PathBuf>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// When set, logs are also written to a daily rolling file here.
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    #[serde(default)]
    pub progress: bool,
}

fn default_true() -> bool {
    true
}

fn default_tick_interval() -> u64 {
    60
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::default(),
            shared_ledger: true,
            window: None,
            clock: ClockKind::default(),
            tick_interval_secs: default_tick_interval(),
            liveness_dir: None,
            log_level: default_log_level(),
            log_dir: None,
            progress: false,
        }
    }
}

/// Identifies a strategy implementation in the factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyId {
    MaCrossover,
    Breakout,
}

/// One strategy to deploy on every watch-list instrument.
#[derive(Debug, Clone, Deserialize)]
pub struct StrategyConfig {
    pub strategy: StrategyId,
    /// Strategy parameters, parsed by the strategy factory.
    #[serde(default)]
    pub params: serde_json::Value,
    /// Restricts this strategy to a subset of instruments instead of the watch-list.
    #[serde(default)]
    pub instruments: Option<Vec<String>>,
    /// Inject a read-only broker handle into the strategy.
    #[serde(default)]
    pub include_broker: bool,
    /// Inject the latest-observation stream into the strategy.
    #[serde(default)]
    pub include_stream: bool,
}

/// Parameters for the moving average crossover strategy.
#[derive(Debug, Deserialize, Clone)]
pub struct MACrossoverParams {
    pub ma_fast_period: usize,
    pub ma_slow_period: usize,
    /// Stop distance in pips attached to every entry.
    pub stop_distance: Decimal,
    /// Optional take-profit distance in pips.
    #[serde(default)]
    pub take_distance: Option<Decimal>,
    /// Fixed size; when absent the risk engine sizes the trade.
    #[serde(default)]
    pub size: Option<Decimal>,
    #[serde(default)]
    pub trailing: bool,
}

/// Parameters for the channel breakout strategy.
#[derive(Debug, Deserialize, Clone)]
pub struct BreakoutParams {
    pub lookback: usize,
    pub stop_distance: Decimal,
    #[serde(default)]
    pub size: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(toml: &str) -> Config {
        config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap()
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let config = parse(
            r#"
            [account]
            initial_balance = "10000"
            leverage = "30"

            [risk_management]
            risk_per_trade_pct = "0.02"
            "#,
        );
        assert!(config.validate().is_ok());
        assert_eq!(config.account.home_currency, "USD");
        assert_eq!(config.run.mode, RunMode::Periodic);
        assert!(config.run.shared_ledger);
        assert_eq!(config.instrument("EURUSD").pip_size, dec!(0.0001));
    }

    #[test]
    fn spread_model_and_bots_deserialize() {
        let config = parse(
            r#"
            watchlist = ["EURUSD", "GBPUSD"]

            [account]
            initial_balance = "1000"
            leverage = "10"
            commission_rate = "0.001"
            spread = { kind = "proportional", fraction = "0.0002" }

            [risk_management]
            risk_per_trade_pct = "0.01"

            [[bots]]
            strategy = "ma_crossover"
            include_broker = true
            params = { ma_fast_period = 3, ma_slow_period = 8, stop_distance = "20" }
            "#,
        );
        assert_eq!(
            config.account.spread,
            SpreadModel::Proportional {
                fraction: dec!(0.0002)
            }
        );
        assert_eq!(config.bots[0].strategy, StrategyId::MaCrossover);
        assert!(config.bots[0].include_broker);
        assert_eq!(config.watchlist.len(), 2);
    }

    #[test]
    fn invalid_leverage_is_rejected() {
        let mut config = parse(
            r#"
            [account]
            initial_balance = "1000"
            leverage = "10"
            [risk_management]
            risk_per_trade_pct = "0.01"
            "#,
        );
        config.account.leverage = dec!(0.5);
        assert!(matches!(config.validate(), Err(ConfigError::ValidationError(_))));
    }

    #[test]
    fn spread_prices_straddle_mid() {
        let spread = SpreadModel::Constant { value: dec!(0.0002) };
        assert_eq!(spread.price_for(Direction::Long, dec!(1.1000)), dec!(1.1001));
        assert_eq!(spread.price_for(Direction::Short, dec!(1.1000)), dec!(1.0999));
    }
}
