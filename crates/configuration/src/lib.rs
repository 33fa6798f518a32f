use crate::error::ConfigError;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod settings;
pub mod telemetry;

// Re-export the core types to provide a clean public API.
pub use settings::{
    AccountConfig, BreakoutParams, ClockKind, Config, InstrumentSpec, MACrossoverParams, RiskManagement,
    RunConfig, RunMode, SpreadModel, StrategyConfig, StrategyId,
};
pub use telemetry::init_tracing;

/// Loads the run configuration from a TOML file.
///
/// Values can be overridden from the environment with the `BROKER__` prefix,
/// e.g. `BROKER__ACCOUNT__LEVERAGE=10`. The result is validated before it is
/// returned.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()))
        .add_source(
            config::Environment::with_prefix("BROKER")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}
