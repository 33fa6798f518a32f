use crate::bot::{Bot, BotReport};
use crate::clock::Clock;
use crate::error::EngineError;
use crate::feed::SeriesStore;
use crate::{feed_routes, RunOutcome};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

enum Command {
    Tick(DateTime<Utc>),
    Shutdown(DateTime<Utc>),
}

struct Ack {
    bot: usize,
    finished: bool,
}

/// Runs every bot on its own task, synchronised by a clock.
///
/// On each tick the clock task reveals the new observations to the brokers
/// under their locks, then releases all bots at once and waits until every
/// one of them has acknowledged before the next tick. Bots check their
/// liveness signal at the start of each cycle.
pub struct ContinuousDriver {
    bots: Vec<Bot>,
    store: Arc<SeriesStore>,
    clock: Box<dyn Clock>,
    window: Option<usize>,
}

impl ContinuousDriver {
    pub fn new(bots: Vec<Bot>, store: Arc<SeriesStore>, clock: Box<dyn Clock>) -> Self {
        Self {
            bots,
            store,
            clock,
            window: None,
        }
    }

    pub fn with_window(mut self, len: Option<usize>) -> Self {
        self.window = len;
        self
    }

    pub async fn run(self) -> Result<RunOutcome, EngineError> {
        let Self {
            mut bots,
            store,
            mut clock,
            window,
        } = self;
        let routes = feed_routes(&bots);
        let start = store
            .timeline(bots.iter().map(|b| b.instrument()))
            .first()
            .copied()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
        tracing::info!(bots = bots.len(), "Starting continuous run");

        let (ack_tx, mut ack_rx) = mpsc::unbounded_channel::<Ack>();
        let mut senders: BTreeMap<usize, mpsc::Sender<Command>> = BTreeMap::new();
        let mut handles: Vec<JoinHandle<Result<BotReport, EngineError>>> = Vec::new();
        for bot in &mut bots {
            bot.start(start).await;
        }
        for bot in bots {
            let (tx, rx) = mpsc::channel(1);
            senders.insert(bot.id(), tx);
            handles.push(tokio::spawn(run_bot(bot, rx, ack_tx.clone(), store.clone(), window)));
        }
        drop(ack_tx);

        let mut ticks = 0;
        let mut last: Option<DateTime<Utc>> = None;
        while !senders.is_empty() {
            let Some(now) = clock.tick().await else {
                break;
            };
            for (instrument, broker) in &routes {
                let fresh = store.between(instrument, last, now);
                if fresh.is_empty() {
                    continue;
                }
                let mut broker = broker.lock().await;
                for obs in fresh {
                    broker.on_observation(instrument, obs.clone());
                }
            }
            last = Some(now);
            ticks += 1;

            let mut expected = 0;
            for tx in senders.values() {
                if tx.send(Command::Tick(now)).await.is_ok() {
                    expected += 1;
                }
            }
            for _ in 0..expected {
                let Some(ack) = ack_rx.recv().await else {
                    break;
                };
                if ack.finished {
                    senders.remove(&ack.bot);
                }
            }
        }

        // Out of data: shut the remaining bots down one by one, in
        // registration order.
        let at = last.unwrap_or(start);
        for (_, tx) in std::mem::take(&mut senders) {
            if tx.send(Command::Shutdown(at)).await.is_ok() {
                ack_rx.recv().await;
            }
        }

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            let report = handle
                .await
                .map_err(|e| EngineError::TaskFailed(e.to_string()))??;
            reports.push(report);
        }
        tracing::info!(ticks, "Continuous run complete");
        Ok(RunOutcome { ticks, bots: reports })
    }
}

async fn run_bot(
    mut bot: Bot,
    mut commands: mpsc::Receiver<Command>,
    acks: mpsc::UnboundedSender<Ack>,
    store: Arc<SeriesStore>,
    window: Option<usize>,
) -> Result<BotReport, EngineError> {
    let mut outcome = Ok(());
    let mut last = None;
    while let Some(command) = commands.recv().await {
        let finished = match command {
            Command::Tick(now) => {
                last = Some(now);
                if !bot.is_alive() {
                    tracing::info!(bot = bot.id(), instrument = bot.instrument(), "Liveness signal lost, shutting down");
                    bot.terminate(now).await;
                    true
                } else {
                    match bot.step(&store, now, window).await {
                        Ok(false) => false,
                        Ok(true) => {
                            tracing::info!(bot = bot.id(), "Strategy requested termination");
                            bot.terminate(now).await;
                            true
                        }
                        Err(e) => {
                            tracing::error!(bot = bot.id(), instrument = bot.instrument(), error = %e, "Bot failed, terminating");
                            bot.terminate(now).await;
                            if e.is_fatal() {
                                outcome = Err(e);
                            }
                            true
                        }
                    }
                }
            }
            Command::Shutdown(at) => {
                bot.terminate(at).await;
                true
            }
        };
        // The clock may already have stopped listening.
        let _ = acks.send(Ack {
            bot: bot.id(),
            finished,
        });
        if finished {
            break;
        }
    }
    if let Some(at) = last {
        bot.terminate(at).await;
    }
    outcome.map(|_| bot.report())
}
