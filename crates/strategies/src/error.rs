use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StrategyError {
    #[error("Strategy received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Failed to parse strategy parameters: {0}")]
    ParamsError(#[from] serde_json::Error),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),

    #[error("Look-ahead detected: data at {latest} handed to a strategy evaluating {now}")]
    LookAhead {
        latest: DateTime<Utc>,
        now: DateTime<Utc>,
    },
}
