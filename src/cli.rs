//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::csv_report_adapter::CsvReportAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_tree_adapter::JsonTreeAdapter;
use crate::domain::backtest::{self as backtest_engine, BacktestConfig, BacktestMode, BacktestResult};
use crate::domain::config_validation::validate_backtest_config;
use crate::domain::error::FlowError;
use crate::domain::flow::Strategy;
use crate::domain::metrics::Metrics;
use crate::domain::price_matrix::build_price_matrix;
use crate::domain::tree_validation::validate_strategy;
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;
use crate::ports::tree_port::TreePort;

const LOG_ENV: &str = "FLOWTRADER_LOG";

#[derive(Parser, Debug)]
#[command(name = "flowtrader", about = "Strategy-tree backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate a strategy tree over historical data
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        tree: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Overrides `[backtest] mode` (CC, OO, OC or CO)
        #[arg(long)]
        mode: Option<BacktestMode>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Load and validate a strategy tree
    Validate {
        #[arg(short, long)]
        tree: PathBuf,
    },
    /// Show the data range of one ticker, or of every ticker in the data path
    Info {
        #[arg(long)]
        ticker: Option<String>,
        #[arg(short, long)]
        config: PathBuf,
    },
}

/// Parse a filter directive such as `info` or `flowtrader=debug`.
pub fn log_filter(directive: &str) -> Result<EnvFilter, String> {
    EnvFilter::try_new(directive).map_err(|err| format!("invalid log filter `{directive}`: {err}"))
}

/// Install the global subscriber. `FLOWTRADER_LOG` wins over the configured
/// level; `format = json` switches to JSON lines.
pub fn init_tracing(log_level: &str, log_format: &str) -> Result<(), String> {
    let directive = std::env::var(LOG_ENV).unwrap_or_else(|_| log_level.to_string());
    install_subscriber(log_filter(&directive)?, log_format);
    Ok(())
}

fn install_subscriber(filter: EnvFilter, log_format: &str) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let installed = if log_format.trim().eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    // A subscriber may already be installed when running under a test harness.
    if let Err(err) = installed {
        tracing::debug!(%err, "tracing subscriber already set");
    }
}

fn init_tracing_from(config: Option<&dyn ConfigPort>) {
    let level = config
        .and_then(|c| c.get_string("log", "level"))
        .unwrap_or_else(|| "info".to_string());
    let format = config
        .and_then(|c| c.get_string("log", "format"))
        .unwrap_or_else(|| "text".to_string());
    if let Err(e) = init_tracing(&level, &format) {
        // The bad directive may come from FLOWTRADER_LOG, so skip it here.
        eprintln!("warning: {e}, falling back to info");
        install_subscriber(EnvFilter::new("info"), &format);
    }
}

pub fn run(cli: Cli) -> ExitCode {
    let outcome = match cli.command {
        Command::Backtest {
            config,
            tree,
            output,
            mode,
            dry_run,
        } => {
            if dry_run {
                run_dry_run(&config, &tree)
            } else {
                run_backtest(&config, &tree, output.as_deref(), mode)
            }
        }
        Command::Validate { tree } => {
            init_tracing_from(None);
            run_validate(&tree)
        }
        Command::Info { ticker, config } => run_info(ticker.as_deref(), &config),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }
    }
}

/// Load the INI file and install logging from its `[log]` section.
pub fn load_config(path: &Path) -> Result<FileConfigAdapter, FlowError> {
    let adapter = FileConfigAdapter::from_file(path)?;
    init_tracing_from(Some(&adapter));
    Ok(adapter)
}

fn data_adapter(config: &dyn ConfigPort) -> Result<CsvAdapter, FlowError> {
    let path = config
        .get_string("data", "path")
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| FlowError::ConfigMissing {
            section: "data".to_string(),
            key: "path".to_string(),
        })?;
    Ok(CsvAdapter::new(PathBuf::from(path.trim())))
}

/// Fetch bars for every anchor ticker, align them, evaluate the
/// tree and score the result.
pub fn run_backtest_pipeline(
    strategy: &Strategy,
    data: &dyn DataPort,
    config: &BacktestConfig,
) -> Result<(BacktestResult, Metrics), FlowError> {
    let anchors = validate_strategy(strategy)?;
    if anchors.is_empty() {
        return Err(FlowError::EmptyAnchors);
    }

    let mut series = HashMap::new();
    for ticker in &anchors {
        let bars = data.fetch_bars(ticker, config.start_date, config.end_date)?;
        if bars.is_empty() {
            return Err(FlowError::NoData {
                ticker: ticker.clone(),
            });
        }
        tracing::debug!(ticker, bars = bars.len(), "fetched");
        series.insert(ticker.clone(), bars);
    }

    let anchor_list: Vec<String> = anchors.into_iter().collect();
    let matrix = build_price_matrix(&series, &anchor_list)?;
    if matrix.is_empty() {
        return Err(FlowError::NoData {
            ticker: anchor_list.join(", "),
        });
    }

    let result = backtest_engine::run_backtest(strategy, &matrix, config)?;
    let metrics = Metrics::from_result(&result, config.risk_free_rate);
    Ok((result, metrics))
}

pub fn run_backtest(
    config_path: &Path,
    tree_path: &Path,
    output_path: Option<&Path>,
    mode: Option<BacktestMode>,
) -> Result<(), FlowError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;

    let mut backtest_config = BacktestConfig::from_config(&config)?;
    if let Some(mode) = mode {
        backtest_config.mode = mode;
    }

    eprintln!("Loading strategy tree from {}", tree_path.display());
    let strategy = JsonTreeAdapter::new().load_strategy(tree_path)?;
    let data = data_adapter(&config)?;

    let (result, metrics) = run_backtest_pipeline(&strategy, &data, &backtest_config)?;
    print_summary(&strategy, &backtest_config, &result, &metrics);

    let output = output_path
        .map(|p| p.display().to_string())
        .or_else(|| config.get_string("report", "output"));
    if let Some(output) = output {
        CsvReportAdapter::new().write(&result, &metrics, &strategy, &output)?;
        eprintln!("\nReport written to: {output}");
    }
    Ok(())
}

fn print_summary(
    strategy: &Strategy,
    config: &BacktestConfig,
    result: &BacktestResult,
    metrics: &Metrics,
) {
    let (first, last) = match (result.dates.first(), result.dates.last()) {
        (Some(f), Some(l)) => (f.to_string(), l.to_string()),
        _ => ("-".to_string(), "-".to_string()),
    };
    eprintln!("\n=== {} ({}) ===", strategy.name, config.mode);
    eprintln!("Period:           {first} .. {last}");
    eprintln!("Trading Days:     {}", metrics.trading_days);
    eprintln!("Total Return:     {:.2}%", metrics.total_return * 100.0);
    eprintln!("Annualized:       {:.2}%", metrics.annualized_return * 100.0);
    eprintln!("Sharpe Ratio:     {:.2}", metrics.sharpe_ratio);
    eprintln!("Sortino Ratio:    {:.2}", metrics.sortino_ratio);
    eprintln!("Calmar Ratio:     {:.2}", metrics.calmar_ratio);
    eprintln!("Volatility:       {:.2}%", metrics.annualized_volatility * 100.0);
    eprintln!("Max Drawdown:     -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Drawdown Days:    {}", metrics.max_drawdown_duration);
    eprintln!("Win Rate:         {:.1}%", metrics.win_rate * 100.0);
    eprintln!("Time in Market:   {:.1}%", metrics.time_in_market * 100.0);
    eprintln!("Rebalances:       {}", metrics.rebalance_count);
}

pub fn run_dry_run(config_path: &Path, tree_path: &Path) -> Result<(), FlowError> {
    eprintln!("Loading config from {}", config_path.display());
    let config = load_config(config_path)?;
    validate_backtest_config(&config)?;
    eprintln!("Config validated successfully");

    let strategy = JsonTreeAdapter::new().load_strategy(tree_path)?;
    let anchors = validate_strategy(&strategy)?;
    if anchors.is_empty() {
        return Err(FlowError::EmptyAnchors);
    }

    eprintln!("\nStrategy: {}", strategy.name);
    eprintln!("Chains:   {}", strategy.chains.len());
    eprintln!("Anchors:  {}", anchors.into_iter().collect::<Vec<_>>().join(", "));
    eprintln!("\nDry run complete: configuration is valid");
    Ok(())
}

pub fn run_validate(tree_path: &Path) -> Result<(), FlowError> {
    eprintln!("Validating strategy tree: {}", tree_path.display());
    let strategy = JsonTreeAdapter::new().load_strategy(tree_path)?;
    let anchors = validate_strategy(&strategy)?;

    let mut nodes = 0usize;
    strategy.root.walk(&mut |_| nodes += 1);
    for chain in strategy.chains.values() {
        chain.walk(&mut |_| nodes += 1);
    }

    eprintln!("\nStrategy: {}", strategy.name);
    eprintln!("Nodes:    {nodes}");
    eprintln!("Chains:   {}", strategy.chains.len());
    if anchors.is_empty() {
        eprintln!("Anchors:  (none, strategy only holds cash)");
    } else {
        eprintln!("Anchors:  {}", anchors.into_iter().collect::<Vec<_>>().join(", "));
    }
    eprintln!("\nStrategy tree is valid.");
    Ok(())
}

pub fn run_info(ticker: Option<&str>, config_path: &Path) -> Result<(), FlowError> {
    let config = load_config(config_path)?;
    let data = data_adapter(&config)?;

    let tickers = match ticker {
        Some(t) => vec![t.to_string()],
        None => data.list_tickers()?,
    };
    if tickers.is_empty() {
        return Err(FlowError::NoData {
            ticker: "*".to_string(),
        });
    }

    for ticker in &tickers {
        match data.get_data_range(ticker)? {
            Some((first, last, count)) => println!("{ticker}: {first} .. {last} ({count} bars)"),
            None => {
                return Err(FlowError::NoData {
                    ticker: ticker.clone(),
                });
            }
        }
    }
    Ok(())
}
