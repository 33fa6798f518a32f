use crate::data_handler::{align_series, RawSeries};
use crate::error::CoordinatorError;
use crate::summary::{LedgerSummary, RunSummary};
use analytics::AnalyticsEngine;
use configuration::{ClockKind, Config, RunMode, StrategyConfig};
use engine::{
    factory_for, lifetime_for, Bot, BotRegistry, BotSpec, Clock, ContinuousDriver, FileMarker,
    PeriodicDriver, SeriesStore, SimulatedClock, WallClock,
};
use executor::{SharedBroker, VirtualBroker};
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// One bot to deploy: a strategy on an instrument.
#[derive(Debug, Clone)]
pub struct Deployment {
    /// Registration index.
    pub id: usize,
    pub instrument: String,
    pub strategy: StrategyConfig,
}

/// The watch-list × strategy cross-product, in registration order: bot
/// configurations in file order, each over its instruments in list order.
/// A bot configuration with its own `instruments` overrides the watch-list.
pub fn plan_deployments(config: &Config) -> Vec<Deployment> {
    let mut deployments = Vec::new();
    for strategy in &config.bots {
        let instruments = strategy.instruments.as_ref().unwrap_or(&config.watchlist);
        for instrument in instruments {
            deployments.push(Deployment {
                id: deployments.len(),
                instrument: instrument.clone(),
                strategy: strategy.clone(),
            });
        }
    }
    deployments
}

/// Deploys bots, runs the scheduler and summarizes the result.
///
/// With `run.shared_ledger` every bot trades on one broker, whose mutex is
/// the single serialization point for margin checks; otherwise each bot gets
/// its own isolated ledger.
pub struct Coordinator {
    config: Config,
    deployments: Vec<Deployment>,
    store: Arc<SeriesStore>,
    registry: BotRegistry,
}

impl Coordinator {
    pub fn new(config: Config, data: RawSeries) -> Result<Self, CoordinatorError> {
        let deployments = plan_deployments(&config);
        if deployments.is_empty() {
            return Err(CoordinatorError::Configuration(
                "no bots to deploy: configure `bots` and a `watchlist`".to_string(),
            ));
        }
        let mut instruments: Vec<String> = deployments.iter().map(|d| d.instrument.clone()).collect();
        instruments.sort();
        instruments.dedup();
        let store = align_series(data, &instruments)?;

        Ok(Self {
            config,
            deployments,
            store: Arc::new(store),
            registry: BotRegistry::new(),
        })
    }

    pub fn deployments(&self) -> &[Deployment] {
        &self.deployments
    }

    /// Lifecycle state of every bot deployed by the last run.
    pub fn registry(&self) -> &BotRegistry {
        &self.registry
    }

    pub async fn run(&mut self) -> Result<RunSummary, CoordinatorError> {
        let run_id = Uuid::new_v4();
        let run = self.config.run.clone();
        tracing::info!(%run_id, mode = ?run.mode, bots = self.deployments.len(), shared_ledger = run.shared_ledger, "Starting run");

        let ledgers = self.build_ledgers()?;
        let lifetime = lifetime_for(run.mode, run.window);
        self.registry = BotRegistry::new();

        let mut bots = Vec::with_capacity(self.deployments.len());
        for (deployment, (_, broker, _)) in self.deployments.iter().zip(self.bot_ledgers(&ledgers)) {
            let spec = BotSpec {
                id: deployment.id,
                instrument: deployment.instrument.clone(),
                factory: factory_for(deployment.strategy.clone(), deployment.instrument.clone()),
                include_broker: deployment.strategy.include_broker,
                include_stream: deployment.strategy.include_stream,
            };
            let mut bot = Bot::new(spec, broker.clone()).await?.with_lifetime(lifetime);
            if let (RunMode::Continuous, Some(dir)) = (run.mode, &run.liveness_dir) {
                let name = format!("{}-{}-{}", bot.id(), bot.instrument(), bot.strategy_name());
                bot = bot.with_liveness(Box::new(FileMarker::create(dir, &name)?));
            }
            self.registry.register(&bot);
            bots.push(bot);
        }

        let timeline = self.store.timeline(self.store.instruments());
        let outcome = match run.mode {
            RunMode::Periodic => {
                let mut driver = PeriodicDriver::new(bots, self.store.clone()).with_window(run.window);
                if run.progress {
                    driver = driver.with_progress(progress_bar(timeline.len()));
                }
                driver.run().await?
            }
            RunMode::Continuous => {
                let clock: Box<dyn Clock> = match run.clock {
                    ClockKind::Simulated => Box::new(SimulatedClock::new(timeline)),
                    ClockKind::Wall => Box::new(WallClock::new(
                        timeline,
                        Duration::from_secs(run.tick_interval_secs),
                    )),
                };
                ContinuousDriver::new(bots, self.store.clone(), clock)
                    .with_window(run.window)
                    .run()
                    .await?
            }
        };

        let summary = self.summarize(run_id, run.mode, outcome, &ledgers).await?;
        tracing::info!(
            %run_id,
            final_nav = %summary.final_nav(),
            trades = summary.total_trades(),
            forced_closures = summary.forced_closures(),
            "Run complete"
        );
        Ok(summary)
    }

    /// One `(label, broker, bot ids)` entry per ledger.
    fn build_ledgers(&self) -> Result<Vec<(String, SharedBroker, Vec<usize>)>, CoordinatorError> {
        if self.config.run.shared_ledger {
            let broker = VirtualBroker::from_config(&self.config)?.into_shared();
            let ids = self.deployments.iter().map(|d| d.id).collect();
            return Ok(vec![("shared".to_string(), broker, ids)]);
        }
        self.deployments
            .iter()
            .map(|d| {
                let broker = VirtualBroker::from_config(&self.config)?.into_shared();
                let label = format!("bot {} {} ({:?})", d.id, d.instrument, d.strategy.strategy);
                Ok((label, broker, vec![d.id]))
            })
            .collect()
    }

    /// The ledger each deployment trades on, in deployment order.
    fn bot_ledgers<'a>(
        &self,
        ledgers: &'a [(String, SharedBroker, Vec<usize>)],
    ) -> Vec<&'a (String, SharedBroker, Vec<usize>)> {
        self.deployments
            .iter()
            .filter_map(|d| ledgers.iter().find(|(_, _, ids)| ids.contains(&d.id)))
            .collect()
    }

    async fn summarize(
        &self,
        run_id: Uuid,
        mode: RunMode,
        outcome: engine::RunOutcome,
        ledgers: &[(String, SharedBroker, Vec<usize>)],
    ) -> Result<RunSummary, CoordinatorError> {
        let analytics = AnalyticsEngine::new();
        let mut summaries = Vec::with_capacity(ledgers.len());
        let mut all_closed = Vec::new();
        for (label, broker, ids) in ledgers {
            let broker = broker.lock().await;
            let account = broker.account_summary();
            let report = analytics.calculate(
                broker.closed_trades(),
                broker.equity_curve(),
                account.initial_balance,
            )?;
            all_closed.extend_from_slice(broker.closed_trades());
            summaries.push(LedgerSummary {
                label: label.clone(),
                bots: ids.clone(),
                account,
                report,
            });
        }

        Ok(RunSummary {
            run_id,
            mode,
            ticks: outcome.ticks,
            ledgers: summaries,
            bots: outcome.bots,
            instruments: analytics.per_instrument(&all_closed),
        })
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let progress_bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")
    {
        progress_bar.set_style(style.progress_chars("=>-"));
    }
    progress_bar
}
