use crate::error::EngineError;
use crate::feed::SeriesStore;
use crate::liveness::{AlwaysAlive, LivenessCheck};
use chrono::{DateTime, Utc};
use configuration::StrategyConfig;
use core_types::{CancelReason, CloseReason, Observation, OrderOrigin};
use events::{BotLifecycle, BotTransition, BrokerEvent};
use executor::{SharedBroker, VirtualBroker};
use std::collections::BTreeMap;
use std::sync::Arc;
use strategies::{
    DataWindow, ShutdownAction, ShutdownContext, StateLifetime, Strategy, StrategyDeps, StrategyError,
};
use tokio::sync::watch;

/// Builds a fresh strategy instance from the collaborators it was granted.
pub type StrategyFactory =
    Arc<dyn Fn(StrategyDeps) -> Result<Box<dyn Strategy>, StrategyError> + Send + Sync>;

/// A factory backed by the strategy registry for one instrument.
pub fn factory_for(config: StrategyConfig, instrument: String) -> StrategyFactory {
    Arc::new(move |deps| strategies::create_strategy(&config, &instrument, deps))
}

/// Everything needed to register one bot.
pub struct BotSpec {
    /// Registration index; also the bot's priority when fills compete.
    pub id: usize,
    pub instrument: String,
    pub factory: StrategyFactory,
    pub include_broker: bool,
    pub include_stream: bool,
}

/// One strategy bound to one instrument and one broker.
///
/// The bot owns its strategy and its submission counter; the scheduler decides
/// when it runs. Lifecycle changes are published on a watch channel for the
/// [`BotRegistry`] and recorded in the broker's audit log.
pub struct Bot {
    id: usize,
    instrument: String,
    name: &'static str,
    strategy: Box<dyn Strategy>,
    factory: StrategyFactory,
    lifetime: StateLifetime,
    deps: StrategyDeps,
    stream: Option<watch::Sender<Option<Observation>>>,
    broker: SharedBroker,
    liveness: Box<dyn LivenessCheck>,
    state: watch::Sender<BotLifecycle>,
    seq: u64,
}

impl Bot {
    pub async fn new(spec: BotSpec, broker: SharedBroker) -> Result<Self, EngineError> {
        let view = if spec.include_broker {
            Some(broker.lock().await.subscribe())
        } else {
            None
        };
        let (stream, stream_rx) = if spec.include_stream {
            let (tx, rx) = watch::channel(None);
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let deps = StrategyDeps {
            broker: view,
            stream: stream_rx,
        };
        let strategy = (spec.factory)(deps.clone())?;
        let (state, _) = watch::channel(BotLifecycle::Initializing);

        Ok(Self {
            id: spec.id,
            instrument: spec.instrument,
            name: strategy.name(),
            strategy,
            factory: spec.factory,
            lifetime: StateLifetime::PerRun,
            deps,
            stream,
            broker,
            liveness: Box::new(AlwaysAlive),
            state,
            seq: 0,
        })
    }

    pub fn with_lifetime(mut self, lifetime: StateLifetime) -> Self {
        self.lifetime = lifetime;
        self
    }

    pub fn with_liveness(mut self, liveness: Box<dyn LivenessCheck>) -> Self {
        self.liveness = liveness;
        self
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn strategy_name(&self) -> &'static str {
        self.name
    }

    pub fn broker(&self) -> &SharedBroker {
        &self.broker
    }

    pub fn lifecycle(&self) -> BotLifecycle {
        *self.state.borrow()
    }

    pub fn is_trading(&self) -> bool {
        self.lifecycle() == BotLifecycle::Trading
    }

    pub fn is_alive(&self) -> bool {
        self.liveness.is_alive()
    }

    /// Moves the bot from initializing to trading.
    pub async fn start(&mut self, at: DateTime<Utc>) {
        if self.lifecycle() != BotLifecycle::Initializing {
            return;
        }
        let mut broker = self.broker.lock().await;
        self.transition(&mut broker, BotLifecycle::Trading, at);
    }

    /// Runs one decision cycle at `now`.
    ///
    /// Returns `true` when the strategy asked to terminate. Orders are tagged
    /// with this bot's registration index and a per-bot sequence number.
    pub async fn step(
        &mut self,
        store: &SeriesStore,
        now: DateTime<Utc>,
        window_len: Option<usize>,
    ) -> Result<bool, EngineError> {
        let series = store.visible(&self.instrument, now, window_len);
        let window = DataWindow::new(&self.instrument, series, now)?;
        if window.is_empty() {
            return Ok(false);
        }
        if let Some(stream) = &self.stream {
            stream.send_replace(window.latest().cloned());
        }
        if self.lifetime == StateLifetime::PerInvocation {
            self.strategy = (self.factory)(self.deps.clone())?;
        }

        self.strategy.refresh_features(&window)?;
        let decision = self.strategy.generate(&window)?;

        if !decision.orders.is_empty() {
            let mut broker = self.broker.lock().await;
            for intent in decision.orders {
                self.seq += 1;
                let origin = OrderOrigin {
                    bot: self.id,
                    seq: self.seq,
                };
                if let Some(order_id) = broker.submit_from(intent, origin) {
                    tracing::debug!(bot = self.id, instrument = %self.instrument, order_id = %order_id, "Order submitted");
                }
            }
        }
        Ok(decision.terminate)
    }

    /// Runs the strategy's shutdown routine and marks the bot terminated.
    /// Cleanup only reaches this bot's own orders and the trades they opened,
    /// so bots sharing a ledger are unaffected. Calling it again is a no-op.
    pub async fn terminate(&mut self, at: DateTime<Utc>) {
        if self.lifecycle() == BotLifecycle::Terminated {
            return;
        }
        let mut broker = self.broker.lock().await;
        let ctx = ShutdownContext {
            instrument: self.instrument.clone(),
            at: Some(at),
            snapshot: self.deps.broker.is_some().then(|| broker.snapshot()),
        };
        for action in self.strategy.shutdown(&ctx) {
            match action {
                ShutdownAction::CancelPendingOrders => {
                    broker.cancel_bot_orders(&self.instrument, self.id, CancelReason::Shutdown);
                }
                ShutdownAction::CloseOpenTrades => {
                    if let Err(e) = broker.close_bot_trades(&self.instrument, self.id, CloseReason::Shutdown) {
                        tracing::warn!(bot = self.id, instrument = %self.instrument, error = %e, "Shutdown could not close trades");
                    }
                }
            }
        }
        self.transition(&mut broker, BotLifecycle::Terminated, at);
    }

    pub fn report(&self) -> BotReport {
        BotReport {
            id: self.id,
            instrument: self.instrument.clone(),
            strategy: self.name,
            orders_submitted: self.seq,
            state: self.lifecycle(),
        }
    }

    fn transition(&self, broker: &mut VirtualBroker, to: BotLifecycle, at: DateTime<Utc>) {
        let from = self.state.send_replace(to);
        broker.record_event(BrokerEvent::Bot(BotTransition {
            bot: self.id,
            instrument: self.instrument.clone(),
            from,
            to,
            at,
        }));
        tracing::info!(bot = self.id, instrument = %self.instrument, strategy = self.name, ?from, ?to, "Bot lifecycle transition");
    }

    pub(crate) fn watch_state(&self) -> watch::Receiver<BotLifecycle> {
        self.state.subscribe()
    }
}

/// What a bot did over a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotReport {
    pub id: usize,
    pub instrument: String,
    pub strategy: &'static str,
    pub orders_submitted: u64,
    pub state: BotLifecycle,
}

#[derive(Debug, Clone)]
pub struct BotEntry {
    pub instrument: String,
    pub strategy: &'static str,
    state: watch::Receiver<BotLifecycle>,
}

impl BotEntry {
    pub fn state(&self) -> BotLifecycle {
        *self.state.borrow()
    }
}

/// In-process registry of bots and their live lifecycle state.
#[derive(Debug, Clone, Default)]
pub struct BotRegistry {
    entries: BTreeMap<usize, BotEntry>,
}

impl BotRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, bot: &Bot) {
        self.entries.insert(
            bot.id(),
            BotEntry {
                instrument: bot.instrument().to_string(),
                strategy: bot.strategy_name(),
                state: bot.watch_state(),
            },
        );
    }

    pub fn get(&self, id: usize) -> Option<&BotEntry> {
        self.entries.get(&id)
    }

    pub fn status(&self, id: usize) -> Option<BotLifecycle> {
        self.entries.get(&id).map(BotEntry::state)
    }

    /// Ids of bots that have not terminated yet.
    pub fn active(&self) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|(_, e)| e.state() != BotLifecycle::Terminated)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &BotEntry)> {
        self.entries.iter().map(|(id, e)| (*id, e))
    }
}
