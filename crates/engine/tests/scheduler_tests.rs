use chrono::{DateTime, Duration, TimeZone, Utc};
use configuration::{AccountConfig, InstrumentSpec, RiskManagement, RunMode, StrategyConfig, StrategyId};
use core_types::{Bar, ClosedTrade, Observation, OrderIntent};
use engine::{
    factory_for, lifetime_for, stop_signal, Bot, BotRegistry, BotSpec, ContinuousDriver,
    PeriodicDriver, SeriesStore, SimulatedClock, StrategyFactory,
};
use events::{BotLifecycle, BrokerEvent};
use executor::{SharedBroker, VirtualBroker};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::{Arc, Mutex};
use strategies::{
    DataWindow, Decision, ShutdownAction, ShutdownContext, StateLifetime, Strategy, StrategyError,
};

// ─── Helpers ────────────────────────────────────────────────────────────────

fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

/// A triangle wave with a spread of highs and lows, long enough for several
/// moving-average crosses.
fn wave(len: i64, base: i64) -> Vec<Observation> {
    (0..len)
        .map(|i| {
            let close = Decimal::from(base + ((i % 20) - 10).abs());
            let open = close - dec!(0.5);
            Bar::new(t(i), open, close + dec!(1), close - dec!(1), close).into()
        })
        .collect()
}

fn store() -> Arc<SeriesStore> {
    Arc::new(
        SeriesStore::new()
            .with_series("AAA", wave(80, 100))
            .with_series("BBB", wave(80, 50)),
    )
}

fn shared_broker(instruments: &[&str]) -> SharedBroker {
    VirtualBroker::new(
        &AccountConfig::new(dec!(10000), dec!(10)),
        &RiskManagement::default(),
        instruments.iter().map(|s| InstrumentSpec::new(*s).with_pip_size(dec!(1))).collect(),
    )
    .unwrap()
    .into_shared()
}

fn ma_config() -> StrategyConfig {
    StrategyConfig {
        strategy: StrategyId::MaCrossover,
        params: serde_json::json!({
            "ma_fast_period": 3,
            "ma_slow_period": 7,
            "stop_distance": "4",
            "size": "10",
            "trailing": true
        }),
        instruments: None,
        include_broker: false,
        include_stream: false,
    }
}

async fn ma_bot(id: usize, instrument: &str, broker: &SharedBroker) -> Bot {
    let spec = BotSpec {
        id,
        instrument: instrument.to_string(),
        factory: factory_for(ma_config(), instrument.to_string()),
        include_broker: false,
        include_stream: false,
    };
    Bot::new(spec, broker.clone()).await.unwrap()
}

/// The comparable content of a closed trade, without ids.
fn fills(trades: &[ClosedTrade]) -> Vec<(String, DateTime<Utc>, Decimal, DateTime<Utc>, Decimal, Decimal)> {
    let mut out: Vec<_> = trades
        .iter()
        .map(|c| {
            (
                c.trade.instrument.clone(),
                c.trade.opened_at,
                c.trade.entry_price,
                c.closed_at,
                c.exit_price,
                c.trade.size,
            )
        })
        .collect();
    out.sort();
    out
}

/// Records what the strategy was shown and buys on a chosen call.
struct Scripted {
    seen: Arc<Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>>,
    calls: usize,
    buy_on: usize,
    terminate_on: Option<usize>,
}

impl Strategy for Scripted {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn generate(&mut self, window: &DataWindow<'_>) -> Result<Decision, StrategyError> {
        self.calls += 1;
        if let Some(latest) = window.latest() {
            self.seen.lock().unwrap().push((latest.timestamp(), window.now()));
        }
        let mut decision = Decision::none();
        if self.calls == self.buy_on {
            decision.orders.push(OrderIntent::market(window.instrument(), 1).with_size(dec!(1)));
        }
        decision.terminate = self.terminate_on == Some(self.calls);
        Ok(decision)
    }

    fn shutdown(&mut self, _ctx: &ShutdownContext) -> Vec<ShutdownAction> {
        vec![ShutdownAction::CancelPendingOrders, ShutdownAction::CloseOpenTrades]
    }
}

type Seen = Arc<Mutex<Vec<(DateTime<Utc>, DateTime<Utc>)>>>;

fn scripted_factory(buy_on: usize, terminate_on: Option<usize>) -> (StrategyFactory, Seen) {
    let seen: Seen = Arc::default();
    let shared = seen.clone();
    let factory: StrategyFactory = Arc::new(move |_deps| {
        Ok(Box::new(Scripted {
            seen: shared.clone(),
            calls: 0,
            buy_on,
            terminate_on,
        }) as Box<dyn Strategy>)
    });
    (factory, seen)
}

async fn scripted_bot(id: usize, factory: StrategyFactory, broker: &SharedBroker) -> Bot {
    let spec = BotSpec {
        id,
        instrument: "AAA".to_string(),
        factory,
        include_broker: false,
        include_stream: false,
    };
    Bot::new(spec, broker.clone()).await.unwrap()
}

// ─── Mode equivalence ───────────────────────────────────────────────────────

#[tokio::test]
async fn periodic_and_continuous_produce_identical_fills_and_nav() {
    let store = store();

    let periodic_broker = shared_broker(&["AAA", "BBB"]);
    let bots = vec![
        ma_bot(0, "AAA", &periodic_broker).await,
        ma_bot(1, "BBB", &periodic_broker).await,
    ];
    let periodic = PeriodicDriver::new(bots, store.clone()).run().await.unwrap();

    let continuous_broker = shared_broker(&["AAA", "BBB"]);
    let bots = vec![
        ma_bot(0, "AAA", &continuous_broker).await,
        ma_bot(1, "BBB", &continuous_broker).await,
    ];
    let clock = SimulatedClock::new(store.timeline(["AAA", "BBB"]));
    let continuous = ContinuousDriver::new(bots, store.clone(), Box::new(clock))
        .run()
        .await
        .unwrap();

    assert_eq!(periodic.ticks, 80);
    assert_eq!(continuous.ticks, 80);

    let p = periodic_broker.lock().await;
    let c = continuous_broker.lock().await;
    assert!(!p.closed_trades().is_empty());
    assert_eq!(fills(p.closed_trades()), fills(c.closed_trades()));
    assert_eq!(p.account_summary().nav, c.account_summary().nav);
    assert_eq!(p.account_summary().max_drawdown, c.account_summary().max_drawdown);
    // MACrossover closes everything on shutdown.
    assert!(p.get_open_trades(None).is_empty());
    assert!(continuous.bots.iter().all(|b| b.state == BotLifecycle::Terminated));
}

#[tokio::test]
async fn bots_sharing_a_ledger_are_deterministic() {
    let store = store();
    let mut navs = Vec::new();
    for _ in 0..3 {
        let broker = shared_broker(&["AAA", "BBB"]);
        let bots = vec![
            ma_bot(0, "AAA", &broker).await,
            ma_bot(1, "AAA", &broker).await,
            ma_bot(2, "BBB", &broker).await,
        ];
        let clock = SimulatedClock::new(store.timeline(["AAA", "BBB"]));
        ContinuousDriver::new(bots, store.clone(), Box::new(clock))
            .run()
            .await
            .unwrap();
        let broker = broker.lock().await;
        navs.push((broker.account_summary().nav, fills(broker.closed_trades())));
    }
    assert_eq!(navs[0], navs[1]);
    assert_eq!(navs[1], navs[2]);
}

// ─── Data visibility ────────────────────────────────────────────────────────

#[tokio::test]
async fn strategies_never_see_past_now() {
    let broker = shared_broker(&["AAA"]);
    let (factory, seen) = scripted_factory(usize::MAX, None);
    let bot = scripted_bot(0, factory, &broker).await;
    PeriodicDriver::new(vec![bot], store())
        .with_window(Some(5))
        .run()
        .await
        .unwrap();

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 80);
    assert!(seen.iter().all(|(latest, now)| latest == now));
}

#[tokio::test]
async fn orders_fill_on_the_observation_after_the_decision() {
    let broker = shared_broker(&["AAA"]);
    let (factory, _) = scripted_factory(3, Some(6));
    let bot = scripted_bot(0, factory, &broker).await;
    PeriodicDriver::new(vec![bot], store()).run().await.unwrap();

    let broker = broker.lock().await;
    let closed = broker.closed_trades();
    assert_eq!(closed.len(), 1);
    // Decided at t(2), filled at the open of t(3).
    assert_eq!(closed[0].trade.opened_at, t(3));
    assert_eq!(closed[0].closed_at, t(5));
    assert_eq!(closed[0].reason, core_types::CloseReason::Shutdown);
}

// ─── Lifecycle ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn terminate_decision_runs_shutdown_and_records_transitions() {
    let broker = shared_broker(&["AAA"]);
    let (factory, seen) = scripted_factory(1, Some(4));
    let bot = scripted_bot(0, factory, &broker).await;
    let mut registry = BotRegistry::new();
    registry.register(&bot);
    assert_eq!(registry.status(0), Some(BotLifecycle::Initializing));

    let clock = SimulatedClock::new(store().timeline(["AAA"]));
    ContinuousDriver::new(vec![bot], store(), Box::new(clock))
        .run()
        .await
        .unwrap();

    assert_eq!(seen.lock().unwrap().len(), 4);
    assert_eq!(registry.status(0), Some(BotLifecycle::Terminated));
    assert!(registry.active().is_empty());

    let broker = broker.lock().await;
    assert!(broker.get_open_trades(None).is_empty());
    let lifecycle: Vec<BotLifecycle> = broker
        .audit_log()
        .iter()
        .filter_map(|e| match e {
            BrokerEvent::Bot(transition) => Some(transition.to),
            _ => None,
        })
        .collect();
    assert_eq!(lifecycle, vec![BotLifecycle::Trading, BotLifecycle::Terminated]);
}

#[tokio::test]
async fn early_shutdown_leaves_other_bots_trades_on_a_shared_ledger() {
    let mut outcomes = Vec::new();
    for continuous in [false, true] {
        let broker = shared_broker(&["AAA"]);
        let (stays, _) = scripted_factory(1, None);
        let (leaves, _) = scripted_factory(2, Some(4));
        let bots = vec![
            scripted_bot(0, stays, &broker).await,
            scripted_bot(1, leaves, &broker).await,
        ];
        if continuous {
            let clock = SimulatedClock::new(store().timeline(["AAA"]));
            ContinuousDriver::new(bots, store(), Box::new(clock)).run().await.unwrap();
        } else {
            PeriodicDriver::new(bots, store()).run().await.unwrap();
        }

        let broker = broker.lock().await;
        let closed = broker.closed_trades();
        assert_eq!(closed.len(), 2);
        // Bot 1 stops at t(3) and only takes its own trade with it.
        assert_eq!(closed[0].trade.origin.bot, 1);
        assert_eq!(closed[0].trade.opened_at, t(2));
        assert_eq!(closed[0].closed_at, t(3));
        // Bot 0's trade stays open until the data runs out.
        assert_eq!(closed[1].trade.origin.bot, 0);
        assert_eq!(closed[1].trade.opened_at, t(1));
        assert_eq!(closed[1].closed_at, t(79));
        assert!(closed.iter().all(|c| c.reason == core_types::CloseReason::Shutdown));
        outcomes.push((fills(closed), broker.account_summary().nav));
    }
    assert_eq!(outcomes[0], outcomes[1]);
}

#[tokio::test]
async fn lost_liveness_stops_the_bot_before_it_decides() {
    let broker = shared_broker(&["AAA"]);
    let (factory, seen) = scripted_factory(1, None);
    let (handle, signal) = stop_signal();
    let bot = scripted_bot(0, factory, &broker).await.with_liveness(Box::new(signal));
    handle.stop();

    let clock = SimulatedClock::new(store().timeline(["AAA"]));
    let outcome = ContinuousDriver::new(vec![bot], store(), Box::new(clock))
        .run()
        .await
        .unwrap();

    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(outcome.bots[0].orders_submitted, 0);
    assert_eq!(outcome.bots[0].state, BotLifecycle::Terminated);
}

#[tokio::test]
async fn removing_the_marker_file_stops_the_bot() {
    let dir = tempfile::tempdir().unwrap();
    let marker = engine::FileMarker::create(dir.path(), "0-AAA-scripted").unwrap();
    std::fs::remove_file(marker.path()).unwrap();

    let broker = shared_broker(&["AAA"]);
    let (factory, seen) = scripted_factory(1, None);
    let bot = scripted_bot(0, factory, &broker).await.with_liveness(Box::new(marker));
    let clock = SimulatedClock::new(store().timeline(["AAA"]));
    ContinuousDriver::new(vec![bot], store(), Box::new(clock))
        .run()
        .await
        .unwrap();
    assert!(seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn per_invocation_lifetime_rebuilds_the_strategy_each_poll() {
    assert_eq!(lifetime_for(RunMode::Periodic, Some(10)), StateLifetime::PerInvocation);
    assert_eq!(lifetime_for(RunMode::Periodic, None), StateLifetime::PerRun);
    assert_eq!(lifetime_for(RunMode::Continuous, Some(10)), StateLifetime::PerRun);

    let broker = shared_broker(&["AAA"]);
    // A fresh instance buys on its first call, so every poll submits one order.
    let (factory, _) = scripted_factory(1, None);
    let bot = scripted_bot(0, factory, &broker)
        .await
        .with_lifetime(StateLifetime::PerInvocation);
    let outcome = PeriodicDriver::new(vec![bot], store())
        .with_window(Some(3))
        .run()
        .await
        .unwrap();
    assert_eq!(outcome.bots[0].orders_submitted, 80);
}
