//! ReplayLab CLI: direct and streamed replays.
//!
//! Commands:
//! - `run`: replay a built-in strategy straight through the executor
//! - `stream`: replay through the orchestrator as an asynchronous task,
//!   snapshotting its state, or recover the last snapshotted task

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use replaylab_core::data::{BarProvider, BarRequest, CsvBarProvider, SyntheticBarProvider};
use replaylab_core::strategies::{self, BUILTIN};
use replaylab_core::strategy::{parse_assignment, Params};
use replaylab_core::{Executor, ExecutorResult, ReplayConfig};
use replaylab_stream::{
    JsonFileSnapshotStore, MemorySnapshotStore, RunSpec, SnapshotStore, StreamSession, TaskPhase, TaskSnapshot,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "replaylab", about = "ReplayLab CLI: deterministic strategy replay")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a strategy directly and print its metrics.
    Run {
        #[command(flatten)]
        replay: ReplayArgs,
    },
    /// Replay a strategy as a streamed task.
    Stream {
        #[command(flatten)]
        replay: ReplayArgs,

        /// Snapshot file. Without it the task state lives in memory only.
        #[arg(long)]
        snapshot: Option<PathBuf>,

        /// Recover the task stored in --snapshot instead of starting one.
        #[arg(long, default_value_t = false, requires = "snapshot")]
        recover: bool,
    },
}

#[derive(Args)]
struct ReplayArgs {
    /// Directory of `<SYMBOL>_<timeframe>.csv` files.
    #[arg(long, conflicts_with = "synthetic")]
    csv: Option<PathBuf>,

    /// Generate seeded synthetic bars instead of reading files.
    #[arg(long)]
    synthetic: Option<u64>,

    #[arg(long, default_value = "SPY")]
    symbol: String,

    /// Start date (YYYY-MM-DD).
    #[arg(long, default_value = "2020-01-02")]
    start: String,

    /// End date (YYYY-MM-DD).
    #[arg(long, default_value = "2024-12-31")]
    end: String,

    /// Built-in strategy: sma_cross, rsi_reversion, buy_and_hold.
    #[arg(long, default_value = "sma_cross")]
    strategy: String,

    /// Strategy parameter override, e.g. `--param fast_period=5`. Repeatable.
    #[arg(long = "param")]
    params: Vec<String>,

    /// TOML file with `[engine]` and `[stream]` sections.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides `engine.initial_capital`.
    #[arg(long)]
    capital: Option<f64>,

    /// Write the full result as JSON.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run { replay } => run_direct(&replay),
        Commands::Stream {
            replay,
            snapshot,
            recover,
        } => run_stream(&replay, snapshot, recover).await,
    }
}

fn run_direct(args: &ReplayArgs) -> Result<()> {
    let config = load_config(args)?;
    let (start, end) = date_range(args)?;
    let params = parse_params(&args.params)?;
    let Some(strategy) = strategies::by_name(&args.strategy) else {
        bail!("unknown strategy '{}'. Valid: {}", args.strategy, BUILTIN.join(", "));
    };

    let provider = build_provider(args)?;
    let request = BarRequest::daily(&args.symbol, start, end);
    let set = provider.fetch(&request)?;
    info!(provider = provider.name(), symbol = %args.symbol, bars = set.bars.len(), "bars loaded");

    let mut executor = Executor::new(strategy, params, config.engine);
    let result = executor.run(&set.bars, &args.symbol);
    for rejected in executor.rejected() {
        println!("REJECTED bar {}: {}", rejected.bar_index, rejected.reason);
    }

    print_summary(&args.symbol, &result);
    println!("Fingerprint:    {}", result.fingerprint()?.0);
    if let Some(path) = &args.output {
        write_json(path, &result)?;
    }
    Ok(())
}

async fn run_stream(args: &ReplayArgs, snapshot: Option<PathBuf>, recover: bool) -> Result<()> {
    let config = load_config(args)?;
    let provider: Arc<dyn BarProvider> = Arc::from(build_provider(args)?);
    let store: Arc<dyn SnapshotStore> = match snapshot {
        Some(path) => Arc::new(JsonFileSnapshotStore::new(path)),
        None => Arc::new(MemorySnapshotStore::new()),
    };

    let mut session = StreamSession::local(provider, store, &config);
    let cancel = session.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, cancelling");
            cancel.cancel();
        }
    });

    let finished = if recover {
        match session.recover().await? {
            Some(snapshot) => snapshot,
            None => bail!("no snapshot to recover"),
        }
    } else {
        let (start, end) = date_range(args)?;
        let mut spec = RunSpec::new(&args.symbol, start, end, &args.strategy);
        spec.selection.params = parse_params(&args.params)?;
        spec.initial_capital = config.engine.initial_capital;
        spec.sizing = config.engine.sizing.clone();
        session.run(spec).await
    };

    print_task(&finished);
    if let Some(result) = session.orchestrator().final_result() {
        print_summary(&args.symbol, &result);
        println!("Fingerprint:    {}", result.fingerprint()?.0);
    }
    if let Some(path) = &args.output {
        write_json(path, &finished)?;
    }
    if finished.phase == TaskPhase::Error {
        std::process::exit(1);
    }
    Ok(())
}

// ── Helpers ──────────────────────────────────────────────────────────

fn load_config(args: &ReplayArgs) -> Result<ReplayConfig> {
    let mut config = match &args.config {
        Some(path) => ReplayConfig::load(path)?,
        None => ReplayConfig::default(),
    };
    if let Some(capital) = args.capital {
        config.engine.initial_capital = capital;
        config.validate()?;
    }
    Ok(config)
}

fn date_range(args: &ReplayArgs) -> Result<(NaiveDate, NaiveDate)> {
    let start = NaiveDate::parse_from_str(&args.start, "%Y-%m-%d")
        .with_context(|| format!("invalid --start '{}'", args.start))?;
    let end = NaiveDate::parse_from_str(&args.end, "%Y-%m-%d")
        .with_context(|| format!("invalid --end '{}'", args.end))?;
    if start > end {
        bail!("--start {start} is after --end {end}");
    }
    Ok((start, end))
}

fn parse_params(raw: &[String]) -> Result<Params> {
    let mut params = Params::new();
    for text in raw {
        let Some((name, value)) = parse_assignment(text) else {
            bail!("invalid --param '{text}', expected name=value");
        };
        params.insert(name, value);
    }
    Ok(params)
}

fn build_provider(args: &ReplayArgs) -> Result<Box<dyn BarProvider>> {
    match (&args.csv, args.synthetic) {
        (Some(dir), _) => Ok(Box::new(CsvBarProvider::new(dir))),
        (None, Some(seed)) => Ok(Box::new(SyntheticBarProvider::new(seed))),
        (None, None) => bail!("one of --csv or --synthetic is required"),
    }
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value)?;
    std::fs::write(path, text).with_context(|| format!("writing {}", path.display()))?;
    println!("Saved to: {}", path.display());
    Ok(())
}

fn print_task(snapshot: &TaskSnapshot) {
    println!();
    println!("=== Task ===");
    match &snapshot.task_id {
        Some(id) => println!("Task:           {id}"),
        None => println!("Task:           (none)"),
    }
    println!("Phase:          {}", snapshot.phase);
    println!("Progress:       {:.1}%", snapshot.progress);
    if let Some(error) = &snapshot.error {
        println!("Error:          {error}");
    }
}

fn print_summary(symbol: &str, result: &ExecutorResult) {
    let m = &result.metrics;
    println!();
    println!("=== Replay Result ===");
    println!("Symbol:         {symbol}");
    if let (Some(first), Some(last)) = (result.candles.first(), result.candles.last()) {
        println!(
            "Period:         {} to {}",
            first.timestamp.date_naive(),
            last.timestamp.date_naive()
        );
    }
    println!("Bars:           {}", m.bars_processed);
    println!("Trades:         {} ({} won, {} lost)", m.trade_count, m.winning_trades, m.losing_trades);
    println!();
    println!("--- Performance ---");
    println!("Final Equity:   {:.2}", m.final_equity);
    println!("Total Return:   {:.2}%", m.total_return * 100.0);
    println!("Sharpe:         {:.3}", m.sharpe);
    println!("Sortino:        {:.3}", m.sortino);
    println!("Max Drawdown:   {:.2}%", m.max_drawdown * 100.0);
    println!("Win Rate:       {:.1}%", m.win_rate * 100.0);
    println!("Profit Factor:  {:.2}", m.profit_factor);
    println!("Commission:     {:.2}", m.total_commission);
    println!();
}
