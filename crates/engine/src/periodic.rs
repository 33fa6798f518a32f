use crate::bot::Bot;
use crate::error::EngineError;
use crate::feed::SeriesStore;
use crate::{feed_routes, RunOutcome};
use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use std::sync::Arc;

/// Drives bots one index position at a time over the shared timeline.
///
/// At each timestamp every broker first receives the observation for each of
/// its instruments, in bot registration order, and then every trading bot
/// decides, also in registration order. A bot's orders are therefore never
/// filled on the observation that produced them.
pub struct PeriodicDriver {
    bots: Vec<Bot>,
    store: Arc<SeriesStore>,
    window: Option<usize>,
    progress: Option<ProgressBar>,
}

impl PeriodicDriver {
    pub fn new(bots: Vec<Bot>, store: Arc<SeriesStore>) -> Self {
        Self {
            bots,
            store,
            window: None,
            progress: None,
        }
    }

    /// Limits what strategies see to the last `len` observations.
    pub fn with_window(mut self, len: Option<usize>) -> Self {
        self.window = len;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub async fn run(mut self) -> Result<RunOutcome, EngineError> {
        let timeline = self
            .store
            .timeline(self.bots.iter().map(|b| b.instrument()));
        let routes = feed_routes(&self.bots);
        let start = timeline.first().copied().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        if let Some(progress) = &self.progress {
            progress.set_length(timeline.len() as u64);
        }
        tracing::info!(bots = self.bots.len(), steps = timeline.len(), "Starting periodic pass");

        for bot in &mut self.bots {
            bot.start(start).await;
        }

        let mut ticks = 0;
        let mut last = start;
        for now in timeline {
            for (instrument, broker) in &routes {
                if let Some(obs) = self.store.at(instrument, now) {
                    broker.lock().await.on_observation(instrument, obs.clone());
                }
            }

            for bot in self.bots.iter_mut().filter(|b| b.is_trading()) {
                match bot.step(&self.store, now, self.window).await {
                    Ok(false) => {}
                    Ok(true) => {
                        tracing::info!(bot = bot.id(), "Strategy requested termination");
                        bot.terminate(now).await;
                    }
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::error!(bot = bot.id(), instrument = bot.instrument(), error = %e, "Bot failed, terminating");
                        bot.terminate(now).await;
                    }
                }
            }

            ticks += 1;
            last = now;
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
            if self.bots.iter().all(|b| !b.is_trading()) {
                break;
            }
        }

        // The pass is over: every bot still trading shuts down now.
        for bot in &mut self.bots {
            bot.terminate(last).await;
        }
        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }
        tracing::info!(ticks, "Periodic pass complete");

        Ok(RunOutcome {
            ticks,
            bots: self.bots.iter().map(Bot::report).collect(),
        })
    }
}
