use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Data handler error: {0}")]
    Data(String),

    #[error("Failed to read data file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed observation data: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Scheduler error: {0}")]
    Engine(#[from] engine::EngineError),

    #[error("Broker error: {0}")]
    Broker(#[from] executor::ExecutorError),

    #[error("Analytics error: {0}")]
    Analytics(#[from] analytics::AnalyticsError),
}
