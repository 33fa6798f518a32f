use chrono::{DateTime, Duration, TimeZone, Utc};
use configuration::{
    AccountConfig, Config, InstrumentSpec, RiskManagement, RunConfig, RunMode, StrategyConfig, StrategyId,
};
use coordinator::{plan_deployments, Coordinator, CoordinatorError, RawSeries};
use core_types::{Bar, Observation};
use events::BotLifecycle;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

// ─── Helpers ────────────────────────────────────────────────────────────────

fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn wave(minutes: impl Iterator<Item = i64>, base: i64) -> Vec<Observation> {
    minutes
        .map(|i| {
            let close = Decimal::from(base + ((i % 16) - 8).abs());
            Bar::new(t(i), close - dec!(0.5), close + dec!(1), close - dec!(1), close).into()
        })
        .collect()
}

/// Two instruments; BBB has an extra leading observation that alignment drops.
fn data() -> RawSeries {
    let mut raw = RawSeries::new();
    raw.insert("AAA".to_string(), wave(0..60, 100));
    raw.insert("BBB".to_string(), wave(-1..60, 40));
    raw
}

fn ma_crossover() -> StrategyConfig {
    StrategyConfig {
        strategy: StrategyId::MaCrossover,
        params: serde_json::json!({
            "ma_fast_period": 2,
            "ma_slow_period": 5,
            "stop_distance": "3",
            "size": "5"
        }),
        instruments: None,
        include_broker: true,
        include_stream: false,
    }
}

fn breakout_on(instrument: &str) -> StrategyConfig {
    StrategyConfig {
        strategy: StrategyId::Breakout,
        params: serde_json::json!({ "lookback": 4, "stop_distance": "2", "size": "3" }),
        instruments: Some(vec![instrument.to_string()]),
        include_broker: false,
        include_stream: true,
    }
}

fn config(mode: RunMode, shared_ledger: bool) -> Config {
    let run = RunConfig {
        mode,
        shared_ledger,
        ..RunConfig::default()
    };
    Config {
        account: AccountConfig::new(dec!(10000), dec!(10)),
        risk_management: RiskManagement::default(),
        instruments: vec![
            InstrumentSpec::new("AAA").with_pip_size(dec!(1)),
            InstrumentSpec::new("BBB").with_pip_size(dec!(1)),
        ],
        run,
        watchlist: vec!["AAA".to_string(), "BBB".to_string()],
        bots: vec![ma_crossover(), breakout_on("AAA")],
    }
}

// ─── Deployment ─────────────────────────────────────────────────────────────

#[test]
fn deployments_are_the_watchlist_strategy_cross_product() {
    let deployments = plan_deployments(&config(RunMode::Periodic, true));
    let plan: Vec<(usize, &str, StrategyId)> = deployments
        .iter()
        .map(|d| (d.id, d.instrument.as_str(), d.strategy.strategy))
        .collect();
    assert_eq!(
        plan,
        vec![
            (0, "AAA", StrategyId::MaCrossover),
            (1, "BBB", StrategyId::MaCrossover),
            (2, "AAA", StrategyId::Breakout),
        ]
    );
}

#[test]
fn a_run_without_bots_is_rejected() {
    let mut cfg = config(RunMode::Periodic, true);
    cfg.bots.clear();
    assert!(matches!(
        Coordinator::new(cfg, data()),
        Err(CoordinatorError::Configuration(_))
    ));
}

// ─── Runs ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn periodic_and_continuous_runs_summarize_identically() {
    let mut periodic = Coordinator::new(config(RunMode::Periodic, true), data()).unwrap();
    let periodic = periodic.run().await.unwrap();
    let mut continuous = Coordinator::new(config(RunMode::Continuous, true), data()).unwrap();
    let continuous = continuous.run().await.unwrap();

    assert_eq!(periodic.ticks, 60);
    assert_eq!(periodic.ticks, continuous.ticks);
    assert!(periodic.total_trades() > 0);
    assert_eq!(periodic.total_trades(), continuous.total_trades());
    assert_eq!(periodic.final_nav(), continuous.final_nav());
    assert_eq!(periodic.instruments, continuous.instruments);
    assert_eq!(
        periodic.ledgers[0].report.max_drawdown,
        continuous.ledgers[0].report.max_drawdown
    );
}

#[tokio::test]
async fn shared_ledger_runs_are_repeatable() {
    let mut first = Coordinator::new(config(RunMode::Continuous, true), data()).unwrap();
    let first = first.run().await.unwrap();
    let mut second = Coordinator::new(config(RunMode::Continuous, true), data()).unwrap();
    let second = second.run().await.unwrap();

    assert_eq!(first.ledgers.len(), 1);
    assert_eq!(first.ledgers[0].bots, vec![0, 1, 2]);
    assert_eq!(first.final_nav(), second.final_nav());
    assert_eq!(first.instruments, second.instruments);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn isolated_ledgers_are_summarized_separately() {
    let mut coordinator = Coordinator::new(config(RunMode::Periodic, false), data()).unwrap();
    let summary = coordinator.run().await.unwrap();

    assert_eq!(summary.ledgers.len(), 3);
    assert_eq!(summary.initial_capital(), dec!(30000));
    assert!(summary.ledgers.iter().all(|l| l.bots.len() == 1));
    let nav_sum: Decimal = summary.ledgers.iter().map(|l| l.account.nav).sum();
    assert_eq!(summary.final_nav(), nav_sum);
    assert!(summary.total_return_pct().is_some());
}

#[tokio::test]
async fn continuous_bots_get_liveness_markers_and_terminate() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(RunMode::Continuous, true);
    cfg.run.liveness_dir = Some(dir.path().to_path_buf());

    let mut coordinator = Coordinator::new(cfg, data()).unwrap();
    let summary = coordinator.run().await.unwrap();

    let markers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(markers, 3);
    assert!(dir.path().join("0-AAA-ma_crossover.alive").exists());
    assert!(summary.bots.iter().all(|b| b.state == BotLifecycle::Terminated));
    assert!(coordinator.registry().active().is_empty());
}
