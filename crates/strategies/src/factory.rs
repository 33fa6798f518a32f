use crate::breakout::Breakout;
use crate::context::StrategyDeps;
use crate::error::StrategyError;
use crate::ma_crossover::MACrossover;
use crate::Strategy;
use configuration::{BreakoutParams, MACrossoverParams, StrategyConfig, StrategyId};

/// Creates a new strategy instance for one instrument from its bot configuration.
///
/// Parameters are parsed from the configuration's JSON `params` value; `deps`
/// carries whichever collaborators the configuration asked to inject.
pub fn create_strategy(
    config: &StrategyConfig,
    instrument: &str,
    deps: StrategyDeps,
) -> Result<Box<dyn Strategy>, StrategyError> {
    // The compiler will error if a new StrategyId is added but not handled here.
    match config.strategy {
        StrategyId::MaCrossover => {
            let params: MACrossoverParams = serde_json::from_value(config.params.clone())?;
            Ok(Box::new(MACrossover::new(params, instrument.to_string(), deps)?))
        }
        StrategyId::Breakout => {
            let params: BreakoutParams = serde_json::from_value(config.params.clone())?;
            Ok(Box::new(Breakout::new(params, instrument.to_string(), deps)?))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(strategy: StrategyId, params: serde_json::Value) -> StrategyConfig {
        StrategyConfig {
            strategy,
            params,
            instruments: None,
            include_broker: false,
            include_stream: false,
        }
    }

    #[test]
    fn builds_each_strategy_from_json_params() {
        let ma = config(
            StrategyId::MaCrossover,
            json!({"ma_fast_period": 5, "ma_slow_period": 20, "stop_distance": "30"}),
        );
        assert_eq!(create_strategy(&ma, "EURUSD", StrategyDeps::default()).unwrap().name(), "ma_crossover");

        let breakout = config(StrategyId::Breakout, json!({"lookback": 10, "stop_distance": "15"}));
        assert_eq!(
            create_strategy(&breakout, "EURUSD", StrategyDeps::default()).unwrap().name(),
            "breakout"
        );
    }

    #[test]
    fn malformed_params_are_an_error() {
        let bad = config(StrategyId::Breakout, json!({"lookback": "ten"}));
        assert!(matches!(
            create_strategy(&bad, "EURUSD", StrategyDeps::default()),
            Err(StrategyError::ParamsError(_))
        ));
    }
}
