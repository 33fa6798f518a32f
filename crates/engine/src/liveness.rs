use crate::error::EngineError;
use std::path::{Path, PathBuf};
use tokio::sync::watch;

/// An out-of-band signal that a continuous-mode bot should keep running.
///
/// Checked once per tick. When it reports `false` the bot finishes the current
/// cycle, runs its shutdown routine and exits.
pub trait LivenessCheck: Send + Sync {
    fn is_alive(&self) -> bool;
}

/// Used when no external control is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysAlive;

impl LivenessCheck for AlwaysAlive {
    fn is_alive(&self) -> bool {
        true
    }
}

/// A marker file whose presence keeps the bot alive. Deleting the file asks
/// the bot to stop.
#[derive(Debug, Clone)]
pub struct FileMarker {
    path: PathBuf,
}

impl FileMarker {
    /// Creates `<dir>/<name>.alive`, creating `dir` if needed.
    pub fn create(dir: &Path, name: &str) -> Result<Self, EngineError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(format!("{name}.alive"));
        std::fs::write(&path, b"")?;
        tracing::debug!(path = %path.display(), "Liveness marker created");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LivenessCheck for FileMarker {
    fn is_alive(&self) -> bool {
        self.path.exists()
    }
}

/// In-process stop switch, paired with a [`StopHandle`].
#[derive(Debug, Clone)]
pub struct StopSignal {
    rx: watch::Receiver<bool>,
}

#[derive(Debug)]
pub struct StopHandle {
    tx: watch::Sender<bool>,
}

impl StopHandle {
    pub fn stop(&self) {
        self.tx.send_replace(true);
    }
}

pub fn stop_signal() -> (StopHandle, StopSignal) {
    let (tx, rx) = watch::channel(false);
    (StopHandle { tx }, StopSignal { rx })
}

impl LivenessCheck for StopSignal {
    fn is_alive(&self) -> bool {
        !*self.rx.borrow()
    }
}
