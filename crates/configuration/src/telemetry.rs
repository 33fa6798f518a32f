use crate::error::ConfigError;
use crate::settings::RunConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global `tracing` subscriber for a run.
///
/// `RUST_LOG` takes precedence over `run.log_level`. When `run.log_dir` is set
/// a second, non-ANSI layer writes to a daily rolling file; the returned guard
/// must be held for as long as the file should receive events.
pub fn init_tracing(run: &RunConfig) -> Result<Option<WorkerGuard>, ConfigError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&run.log_level))
        .map_err(|e| ConfigError::Telemetry(e.to_string()))?;

    let stdout_layer = fmt::layer().with_target(false);
    let registry = tracing_subscriber::registry().with(filter).with(stdout_layer);

    match &run.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "broker.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_ansi(false).with_writer(writer))
                .try_init()
                .map_err(|e| ConfigError::Telemetry(e.to_string()))?;
            Ok(Some(guard))
        }
        None => {
            registry
                .try_init()
                .map_err(|e| ConfigError::Telemetry(e.to_string()))?;
            Ok(None)
        }
    }
}
