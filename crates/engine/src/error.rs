use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Strategy error: {0}")]
    Strategy(#[from] strategies::StrategyError),

    #[error("Broker error: {0}")]
    Broker(#[from] executor::ExecutorError),

    #[error("Liveness marker I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Bot task failed: {0}")]
    TaskFailed(String),
}

impl EngineError {
    /// Errors that invalidate the whole run rather than a single bot.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::Strategy(strategies::StrategyError::LookAhead { .. })
                | EngineError::TaskFailed(_)
        )
    }
}
