//! CLI integration tests for command orchestration.
//!
//! Tests cover:
//! - Argument parsing for every subcommand
//! - Dry-run and validate with real files on disk
//! - Full backtest through CSV data, INI config and a JSON tree
//! - Error classes surfaced by the commands

use clap::Parser;
use flowtrader::cli::{self, Cli, Command};
use flowtrader::domain::backtest::BacktestMode;
use flowtrader::domain::error::FlowError;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const TREE: &str = r#"{
    "name": "rsi switch",
    "root": {
        "id": "root",
        "kind": "indicator",
        "conditions": [
            {"type": "if", "metric": "rsi", "window": 2, "ticker": "SPY",
             "comparator": "<", "rhs": 60}
        ],
        "then": [{"id": "buy", "kind": "position", "tickers": ["SPY"]}],
        "else": [{"id": "hedge", "kind": "call", "callId": "bonds"}]
    },
    "chains": {
        "bonds": {"id": "bonds-root", "kind": "position", "tickers": ["TLT"]}
    }
}"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let data = dir.path().join("data");
        fs::create_dir_all(&data).unwrap();

        let mut spy = String::from("date,open,high,low,close,adj_close\n");
        let mut tlt = String::from("date,open,close\n");
        for day in 0..20u32 {
            let close = if day % 2 == 0 { 100.0 } else { 104.0 } + day as f64;
            spy.push_str(&format!(
                "2024-02-{:02},{close},{},{},{close},{close}\n",
                day + 1,
                close + 1.0,
                close - 1.0
            ));
            let bond = 50.0 + day as f64 * 0.1;
            tlt.push_str(&format!("2024-02-{:02},{bond},{bond}\n", day + 1));
        }
        fs::write(data.join("SPY.csv"), spy).unwrap();
        fs::write(data.join("TLT.csv"), tlt).unwrap();
        fs::write(dir.path().join("tree.json"), TREE).unwrap();

        Self { dir }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn write_config(&self, extra: &str) -> PathBuf {
        let content = format!(
            "[backtest]\nmode = CC\ncost_bps = 1\ninitial_capital = 10000\n{extra}\n\n[data]\npath = {}\n",
            self.path("data").display()
        );
        let path = self.path("config.ini");
        fs::write(&path, content).unwrap();
        path
    }
}

fn tree_path(ws: &Workspace) -> PathBuf {
    ws.path("tree.json")
}

mod parsing {
    use super::*;

    #[test]
    fn backtest_arguments() {
        let cli = Cli::try_parse_from([
            "flowtrader",
            "backtest",
            "--config",
            "c.ini",
            "--tree",
            "t.json",
            "--mode",
            "oo",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Command::Backtest {
                config,
                tree,
                output,
                mode,
                dry_run,
            } => {
                assert_eq!(config, Path::new("c.ini"));
                assert_eq!(tree, Path::new("t.json"));
                assert_eq!(output, None);
                assert_eq!(mode, Some(BacktestMode::OpenToOpen));
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn invalid_mode_rejected_by_parser() {
        let result = Cli::try_parse_from([
            "flowtrader", "backtest", "-c", "c.ini", "-t", "t.json", "--mode", "XX",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn validate_and_info_arguments() {
        let cli = Cli::try_parse_from(["flowtrader", "validate", "--tree", "t.json"]).unwrap();
        assert!(matches!(cli.command, Command::Validate { .. }));

        let cli =
            Cli::try_parse_from(["flowtrader", "info", "--ticker", "SPY", "-c", "c.ini"]).unwrap();
        assert!(
            matches!(cli.command, Command::Info { ref ticker, .. } if ticker.as_deref() == Some("SPY"))
        );

        let cli = Cli::try_parse_from(["flowtrader", "info", "-c", "c.ini"]).unwrap();
        assert!(matches!(cli.command, Command::Info { ticker: None, .. }));
    }

    #[test]
    fn backtest_requires_tree() {
        assert!(Cli::try_parse_from(["flowtrader", "backtest", "--config", "c.ini"]).is_err());
    }
}

mod commands {
    use super::*;

    #[test]
    fn dry_run_valid_inputs_succeeds() {
        let ws = Workspace::new();
        let config = ws.write_config("");
        cli::run_dry_run(&config, &tree_path(&ws)).unwrap();
    }

    #[test]
    fn dry_run_missing_config_is_parse_error() {
        let ws = Workspace::new();
        let err = cli::run_dry_run(Path::new("/nonexistent/config.ini"), &tree_path(&ws))
            .unwrap_err();
        assert!(matches!(err, FlowError::ConfigParse { .. }));
    }

    #[test]
    fn dry_run_rejects_bad_config_before_tree() {
        let ws = Workspace::new();
        let config = ws.write_config("risk_free_rate = 2");
        let err = cli::run_dry_run(&config, Path::new("/nonexistent/tree.json")).unwrap_err();
        assert!(matches!(err, FlowError::ConfigInvalid { ref key, .. } if key == "risk_free_rate"));
    }

    #[test]
    fn validate_reports_dangling_call() {
        let ws = Workspace::new();
        let broken = TREE.replace(r#""callId": "bonds""#, r#""callId": "missing""#);
        let path = ws.path("broken.json");
        fs::write(&path, broken).unwrap();

        let err = cli::run_validate(&path).unwrap_err();
        assert!(matches!(err, FlowError::DanglingCall { ref chain_id, .. } if chain_id == "missing"));
    }

    #[test]
    fn validate_rejects_unknown_kind() {
        let ws = Workspace::new();
        let path = ws.path("bad.json");
        fs::write(&path, TREE.replace(r#""kind": "indicator""#, r#""kind": "loop""#)).unwrap();
        assert!(matches!(
            cli::run_validate(&path),
            Err(FlowError::TreeParse { .. })
        ));
    }

    #[test]
    fn backtest_writes_report() {
        let ws = Workspace::new();
        let config = ws.write_config("");
        let output = ws.path("out/results.csv");

        cli::run_backtest(&config, &tree_path(&ws), Some(&output), None).unwrap();

        let report = fs::read_to_string(&output).unwrap();
        let lines: Vec<&str> = report.lines().collect();
        assert_eq!(lines[0], "date,equity,cash,SPY,TLT");
        assert_eq!(lines.len(), 21);
        assert!(lines[1].starts_with("2024-02-01,"));

        let metrics = fs::read_to_string(ws.path("out/results.metrics.csv")).unwrap();
        assert!(metrics.contains("strategy,rsi switch"));
        assert!(metrics.contains("trading_days,20"));
    }

    #[test]
    fn backtest_uses_report_output_from_config() {
        let ws = Workspace::new();
        let target = ws.path("configured.csv");
        let config = ws.write_config(&format!(
            "start_date = 2024-02-05\n\n[report]\noutput = {}",
            target.display()
        ));

        cli::run_backtest(&config, &tree_path(&ws), None, Some(BacktestMode::OpenToClose))
            .unwrap();

        let report = fs::read_to_string(&target).unwrap();
        assert_eq!(report.lines().count(), 17);
        assert!(report.lines().nth(1).unwrap().starts_with("2024-02-05,"));
    }

    #[test]
    fn backtest_missing_ticker_is_no_data() {
        let ws = Workspace::new();
        fs::remove_file(ws.path("data/TLT.csv")).unwrap();
        let config = ws.write_config("");

        let err = cli::run_backtest(&config, &tree_path(&ws), None, None).unwrap_err();
        assert!(matches!(err, FlowError::NoData { ref ticker } if ticker == "TLT"));
    }

    #[test]
    fn info_prints_range() {
        let ws = Workspace::new();
        let config = ws.write_config("");
        cli::run_info(Some("SPY"), &config).unwrap();

        let err = cli::run_info(Some("QQQ"), &config).unwrap_err();
        assert!(matches!(err, FlowError::NoData { .. }));
    }

    #[test]
    fn info_without_ticker_lists_data_path() {
        let ws = Workspace::new();
        let config = ws.write_config("");
        cli::run_info(None, &config).unwrap();

        fs::remove_file(ws.path("data/SPY.csv")).unwrap();
        fs::remove_file(ws.path("data/TLT.csv")).unwrap();
        assert!(matches!(
            cli::run_info(None, &config),
            Err(FlowError::NoData { .. })
        ));
    }

    #[test]
    fn log_filter_rejects_bad_level() {
        assert!(cli::log_filter("info").is_ok());
        assert!(cli::log_filter("flowtrader=debug").is_ok());
        let err = cli::log_filter("flowtrader=loud").unwrap_err();
        assert!(err.contains("invalid log filter `flowtrader=loud`"));
    }

    #[test]
    fn bad_log_level_falls_back() {
        let ws = Workspace::new();
        let config = ws.write_config("\n[log]\nlevel = flowtrader=loud");
        cli::load_config(&config).unwrap();
        cli::run_info(Some("SPY"), &config).unwrap();
    }
}
