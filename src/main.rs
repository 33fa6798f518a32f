use anyhow::Context;
use clap::{Parser, Subcommand};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use configuration::{init_tracing, load_config, RunMode};
use coordinator::{load_series, Coordinator, RunSummary};
use rust_decimal::Decimal;
use std::path::PathBuf;

/// The main entry point for the virtual broker.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Backtest(args) => handle_backtest(args).await,
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// A virtual broker for backtesting and paper-trading rule-based strategies.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the configured bots over a file of historical observations.
    Backtest(BacktestArgs),
}

#[derive(Parser)]
struct BacktestArgs {
    /// Path to the TOML run configuration.
    #[arg(long)]
    config: PathBuf,

    /// Path to a JSON file mapping each instrument to its observations.
    #[arg(long)]
    data: PathBuf,

    /// Overrides `run.mode` from the configuration.
    #[arg(long, value_enum)]
    mode: Option<RunMode>,
}

// ==============================================================================
// Backtest Command Logic
// ==============================================================================

async fn handle_backtest(args: BacktestArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;
    if let Some(mode) = args.mode {
        config.run.mode = mode;
    }
    // Keep the guard alive so the log file is flushed on exit.
    let _guard = init_tracing(&config.run)?;

    let data = load_series(&args.data)
        .with_context(|| format!("loading observations from {}", args.data.display()))?;
    let mut coordinator = Coordinator::new(config, data)?;
    let summary = coordinator.run().await?;

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    let mut overview = Table::new();
    overview.load_preset(UTF8_FULL).set_header(vec!["Run", "Value"]);
    overview.add_row(vec!["Run id".to_string(), summary.run_id.to_string()]);
    overview.add_row(vec!["Mode".to_string(), format!("{:?}", summary.mode)]);
    overview.add_row(vec!["Steps".to_string(), summary.ticks.to_string()]);
    overview.add_row(vec!["Initial capital".to_string(), money(summary.initial_capital())]);
    overview.add_row(vec!["Final NAV".to_string(), money(summary.final_nav())]);
    overview.add_row(vec!["Total return %".to_string(), optional(summary.total_return_pct())]);
    overview.add_row(vec!["Closed trades".to_string(), summary.total_trades().to_string()]);
    overview.add_row(vec!["Forced closures".to_string(), summary.forced_closures().to_string()]);
    println!("{overview}");

    let mut ledgers = Table::new();
    ledgers.load_preset(UTF8_FULL).set_header(vec![
        "Ledger", "Bots", "Balance", "NAV", "Return %", "Max DD %", "Trades", "Win %", "Profit factor",
        "Sharpe",
    ]);
    for ledger in &summary.ledgers {
        let report = &ledger.report;
        ledgers.add_row(vec![
            ledger.label.clone(),
            ledger.bots.len().to_string(),
            money(ledger.account.balance),
            money(ledger.account.nav),
            money(report.total_return_pct),
            money(report.max_drawdown_pct),
            report.total_trades.to_string(),
            optional(report.win_rate_pct),
            optional(report.profit_factor),
            optional(report.sharpe_ratio),
        ]);
    }
    println!("{ledgers}");

    let mut instruments = Table::new();
    instruments.load_preset(UTF8_FULL).set_header(vec![
        "Instrument", "Trades", "Win %", "Reward/Risk", "Net P&L", "Forced",
    ]);
    for (instrument, stats) in &summary.instruments {
        instruments.add_row(vec![
            instrument.clone(),
            stats.trades.to_string(),
            optional(stats.win_rate_pct()),
            optional(stats.reward_risk()),
            money(stats.net_pnl),
            stats.forced_closures.to_string(),
        ]);
    }
    println!("{instruments}");

    let mut bots = Table::new();
    bots.load_preset(UTF8_FULL)
        .set_header(vec!["Bot", "Instrument", "Strategy", "Orders", "State"]);
    for bot in &summary.bots {
        bots.add_row(vec![
            bot.id.to_string(),
            bot.instrument.clone(),
            bot.strategy.to_string(),
            bot.orders_submitted.to_string(),
            format!("{:?}", bot.state),
        ]);
    }
    println!("{bots}");
}

fn money(value: Decimal) -> String {
    value.round_dp(2).to_string()
}

fn optional(value: Option<Decimal>) -> String {
    value.map(money).unwrap_or_else(|| "-".to_string())
}
