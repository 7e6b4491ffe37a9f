//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use crate::adapters::csv_adapter::CsvPanelAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::config_validation::{
    parse_mean, parse_rank_by, parse_weighting, required_period, validate_backtest_config,
    validate_panel_config, validate_search_config,
};
use crate::domain::error::QuantscreenError;
use crate::domain::formula::Formula;
use crate::domain::metrics::{MetricsConfig, MetricsSummary};
use crate::domain::panel::Period;
use crate::domain::report::BacktestReport;
use crate::domain::search::proposer::{default_catalogue, MutationProposer};
use crate::domain::search::{Fitness, SearchConfig, SearchController, StopReason};
use crate::domain::simulator::{run_backtest, BacktestConfig};
use crate::ports::config_port::ConfigPort;
use crate::ports::panel_port::PanelPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "quantscreen", about = "Rule-based stock screening backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Backtest one formula against the panel
    Backtest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        formula: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Search for high-fitness formulas
    Search {
        #[arg(short, long)]
        config: PathBuf,
        /// Write the best formula as JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Write the best formula's full backtest report
        #[arg(short, long)]
        report: Option<PathBuf>,
        /// Override the configured random seed
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Validate a formula file
    Validate {
        #[arg(short, long)]
        formula: PathBuf,
    },
    /// List companies in the panel at a period
    ListCompanies {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        period: u32,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Backtest {
            config,
            formula,
            output,
            dry_run,
        } => run_backtest_cmd(&config, &formula, output.as_ref(), dry_run),
        Command::Search {
            config,
            output,
            report,
            seed,
        } => run_search_cmd(&config, output.as_ref(), report.as_ref(), seed),
        Command::Validate { formula } => run_validate(&formula),
        Command::ListCompanies { config, period } => run_list_companies(&config, period),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = QuantscreenError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn load_formula(path: &PathBuf) -> Result<Formula, ExitCode> {
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: failed to read {}: {}", path.display(), e);
            return Err(ExitCode::from(1));
        }
    };
    Formula::from_json(&content).map_err(|e| {
        let err = QuantscreenError::Formula(e);
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn build_panel(adapter: &FileConfigAdapter) -> Result<Box<dyn PanelPort>, QuantscreenError> {
    validate_panel_config(adapter)?;
    let source = adapter.get_string("panel", "source").unwrap_or_default();
    let path = adapter.get_string("panel", "path").unwrap_or_default();

    match source.as_str() {
        "csv" => Ok(Box::new(CsvPanelAdapter::from_dir(&path)?)),
        "sqlite" => {
            #[cfg(feature = "sqlite")]
            {
                use crate::adapters::sqlite_adapter::SqliteAdapter;
                Ok(Box::new(SqliteAdapter::from_config(adapter)?))
            }
            #[cfg(not(feature = "sqlite"))]
            {
                Err(QuantscreenError::ConfigInvalid {
                    section: "panel".to_string(),
                    key: "source".to_string(),
                    reason: "sqlite feature is not enabled in this build".to_string(),
                })
            }
        }
        other => Err(QuantscreenError::ConfigInvalid {
            section: "panel".to_string(),
            key: "source".to_string(),
            reason: format!("unknown panel source '{other}'"),
        }),
    }
}

pub fn build_backtest_config(
    adapter: &dyn ConfigPort,
) -> Result<BacktestConfig, QuantscreenError> {
    let start = required_period(adapter, "start_period")?;
    let end = required_period(adapter, "end_period")?;

    let mut config = BacktestConfig::new(Period(start), Period(end));
    config.rebalance_every = adapter.get_int("backtest", "rebalance_every", 1) as u32;
    config.initial_capital = adapter.get_double("backtest", "initial_capital", 1.0);
    config.max_periods =
        adapter.get_int("backtest", "max_periods", config.max_periods as i64) as u32;

    let top_k = adapter.get_int("backtest", "top_k", 0);
    config.top_k = if top_k > 0 { Some(top_k as usize) } else { None };

    if let Some(value) = adapter.get_string("backtest", "rank_by") {
        config.rank_by =
            parse_rank_by(&value).map_err(|reason| QuantscreenError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "rank_by".to_string(),
                reason,
            })?;
    }
    if let Some(value) = adapter.get_string("backtest", "weighting") {
        config.weighting =
            parse_weighting(&value).map_err(|reason| QuantscreenError::ConfigInvalid {
                section: "backtest".to_string(),
                key: "weighting".to_string(),
                reason,
            })?;
    }

    Ok(config)
}

pub fn build_metrics_config(adapter: &dyn ConfigPort) -> Result<MetricsConfig, QuantscreenError> {
    let mut config = MetricsConfig::default();
    if let Some(value) = adapter.get_string("backtest", "mean") {
        config.mean = parse_mean(&value).map_err(|reason| QuantscreenError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "mean".to_string(),
            reason,
        })?;
    }
    config.downside_target = adapter.get_double("backtest", "downside_target", 0.0);
    config.risk_free_rate = adapter.get_double("backtest", "risk_free_rate", 0.0);
    Ok(config)
}

pub fn build_search_config(adapter: &dyn ConfigPort) -> Result<SearchConfig, QuantscreenError> {
    let mut config = SearchConfig {
        population_size: adapter.get_int("search", "population_size", 20) as usize,
        generations: adapter.get_int("search", "generations", 10) as u32,
        retain_fraction: adapter.get_double("search", "retain_fraction", 0.25),
        patience: adapter.get_int("search", "patience", 0) as u32,
        seed: adapter.get_int("search", "seed", 0) as u64,
        ..Default::default()
    };

    let threads = adapter.get_int("search", "threads", 0);
    config.threads = if threads > 0 {
        Some(threads as usize)
    } else {
        None
    };

    if let Some(value) = adapter.get_string("search", "fitness") {
        config.fitness = match value.as_str() {
            "sortino" => Fitness::Sortino,
            "weighted" => Fitness::Weighted {
                return_weight: adapter.get_double("search", "return_weight", 1.0),
                risk_weight: adapter.get_double("search", "risk_weight", 1.0),
            },
            other => {
                return Err(QuantscreenError::ConfigInvalid {
                    section: "search".to_string(),
                    key: "fitness".to_string(),
                    reason: format!("unknown fitness '{other}'"),
                });
            }
        };
    }

    Ok(config)
}

fn run_backtest_cmd(
    config_path: &PathBuf,
    formula_path: &PathBuf,
    output_path: Option<&PathBuf>,
    dry_run: bool,
) -> ExitCode {
    // Stage 1: Load config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    // Stage 2: Validate backtest config
    if let Err(e) = validate_backtest_config(&adapter) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let metrics_config = match build_metrics_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 3: Load and validate formula
    eprintln!("Loading formula from {}", formula_path.display());
    let formula = match load_formula(formula_path) {
        Ok(f) => f,
        Err(code) => return code,
    };
    eprintln!(
        "Formula '{}': {} filter(s)",
        formula.name,
        formula.filters.len()
    );

    // Stage 4: Build panel
    let panel = match build_panel(&adapter) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    if dry_run {
        eprintln!("Dry run OK: config, formula, and panel all load");
        return ExitCode::SUCCESS;
    }

    // Stage 5: Run backtest
    eprintln!(
        "Running backtest: periods {} to {}, rebalancing every {}",
        bt_config.start, bt_config.end, bt_config.rebalance_every,
    );
    let trajectory = match run_backtest(panel.as_ref(), &formula, &bt_config) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 6: Compute metrics and print summary
    let metrics = MetricsSummary::compute(&trajectory, &metrics_config);
    print_metrics(&metrics);

    // Stage 7: Write report
    if let Some(path) = output_path {
        let report = BacktestReport::new(formula, trajectory, metrics);
        if let Err(e) = JsonReportAdapter.write(&report, &path.display().to_string()) {
            eprintln!("error: {e}");
            return (&e).into();
        }
        eprintln!("Report written to {}", path.display());
    }

    ExitCode::SUCCESS
}

fn run_search_cmd(
    config_path: &PathBuf,
    output_path: Option<&PathBuf>,
    report_path: Option<&PathBuf>,
    seed_override: Option<u64>,
) -> ExitCode {
    // Stage 1: Load and validate config
    eprintln!("Loading config from {}", config_path.display());
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    for validation in [
        validate_backtest_config(&adapter),
        validate_search_config(&adapter),
    ] {
        if let Err(e) = validation {
            eprintln!("error: {e}");
            return (&e).into();
        }
    }

    let bt_config = match build_backtest_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let metrics_config = match build_metrics_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    let mut search_config = match build_search_config(&adapter) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    if let Some(seed) = seed_override {
        search_config.seed = seed;
    }

    // Stage 2: Build panel
    let panel = match build_panel(&adapter) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    // Stage 3: Run the search
    eprintln!(
        "Searching: {} candidates/generation, {} generations, seed {}",
        search_config.population_size, search_config.generations, search_config.seed,
    );
    let max_filters = adapter.get_int("search", "max_filters", 5) as usize;
    let mut proposer = MutationProposer::new(default_catalogue(), max_filters);
    let controller =
        SearchController::new(panel.as_ref(), &bt_config, &metrics_config, &search_config);
    let cancel = AtomicBool::new(false);
    let outcome = controller.run(&mut proposer, &cancel);

    match &outcome.stop {
        StopReason::GenerationBudget => eprintln!("Search ended at generation budget"),
        StopReason::Converged { stale_generations } => eprintln!(
            "Search converged: no improvement for {stale_generations} generation(s)"
        ),
        StopReason::Cancelled => eprintln!("Search cancelled"),
    }

    // Stage 4: Report the best candidate
    let Some(best) = outcome.best else {
        eprintln!("error: no candidate was evaluated");
        return ExitCode::from(5);
    };

    eprintln!(
        "\nBest formula: '{}' (fitness {:.4})",
        best.formula.name, best.fitness
    );
    if let Some(metrics) = &best.metrics {
        print_metrics(metrics);
    } else {
        eprintln!("  (best candidate's backtest failed; formula reported as-is)");
    }

    let formula_json = match best.formula.to_json() {
        Ok(j) => j,
        Err(e) => {
            let err = QuantscreenError::from(e);
            eprintln!("error: {err}");
            return (&err).into();
        }
    };

    match output_path {
        Some(path) => {
            if let Err(e) = fs::write(path, &formula_json) {
                eprintln!("error: failed to write {}: {}", path.display(), e);
                return ExitCode::from(1);
            }
            eprintln!("Best formula written to {}", path.display());
        }
        None => println!("{formula_json}"),
    }

    if let Some(path) = report_path {
        match run_backtest(panel.as_ref(), &best.formula, &bt_config) {
            Ok(trajectory) => {
                let metrics = MetricsSummary::compute(&trajectory, &metrics_config);
                let report = BacktestReport::new(best.formula.clone(), trajectory, metrics);
                if let Err(e) = JsonReportAdapter.write(&report, &path.display().to_string()) {
                    eprintln!("error: {e}");
                    return (&e).into();
                }
                eprintln!("Report written to {}", path.display());
            }
            Err(e) => {
                eprintln!("warning: best candidate no longer backtests cleanly ({e})");
            }
        }
    }

    ExitCode::SUCCESS
}

fn run_validate(formula_path: &PathBuf) -> ExitCode {
    match load_formula(formula_path) {
        Ok(formula) => {
            eprintln!(
                "Formula '{}' is valid: {} filter(s), max window {}",
                formula.name,
                formula.filters.len(),
                formula.max_window(),
            );
            ExitCode::SUCCESS
        }
        Err(code) => code,
    }
}

fn run_list_companies(config_path: &PathBuf, period: u32) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };

    let panel = match build_panel(&adapter) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };

    match panel.list_companies(Period(period)) {
        Ok(companies) => {
            eprintln!("{} companies listed at period {}", companies.len(), period);
            for company in companies {
                println!("{company}");
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn print_metrics(metrics: &MetricsSummary) {
    eprintln!("\n=== Backtest Results ===");
    eprintln!("Periods:            {}", metrics.periods);
    eprintln!("Mean Return:        {:.2}%", metrics.mean_return * 100.0);
    eprintln!("Median Return:      {:.2}%", metrics.median_return * 100.0);
    eprintln!("Volatility:         {:.2}%", metrics.volatility * 100.0);
    eprintln!(
        "Downside Deviation: {:.2}%",
        metrics.downside_deviation * 100.0
    );
    eprintln!("Sharpe:             {:.2}", metrics.sharpe);
    eprintln!("Sortino:            {:.2}", metrics.sortino);
    eprintln!("Max Drawdown:       -{:.1}%", metrics.max_drawdown * 100.0);
    eprintln!("Turnover:           {:.2}", metrics.turnover);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::MeanKind;
    use crate::domain::weighting::{RankBy, WeightScheme};

    fn adapter(content: &str) -> FileConfigAdapter {
        FileConfigAdapter::from_string(content).unwrap()
    }

    #[test]
    fn build_backtest_config_applies_defaults() {
        let config = build_backtest_config(&adapter(
            "[backtest]\nstart_period = 2005\nend_period = 2020\n",
        ))
        .unwrap();
        assert_eq!(config.start, Period(2005));
        assert_eq!(config.end, Period(2020));
        assert_eq!(config.rebalance_every, 1);
        assert_eq!(config.top_k, None);
        assert_eq!(config.rank_by, RankBy::PriorReturn);
        assert_eq!(config.weighting, WeightScheme::Equal);
    }

    #[test]
    fn build_backtest_config_reads_overrides() {
        let config = build_backtest_config(&adapter(
            "[backtest]\nstart_period = 2005\nend_period = 2020\n\
             rebalance_every = 2\ntop_k = 20\nrank_by = ratio:market_cap\n\
             weighting = inverse_vol\n",
        ))
        .unwrap();
        assert_eq!(config.rebalance_every, 2);
        assert_eq!(config.top_k, Some(20));
        assert_eq!(config.rank_by, RankBy::Ratio("market_cap".to_string()));
        assert_eq!(config.weighting, WeightScheme::InverseVolatility);
    }

    #[test]
    fn build_backtest_config_requires_periods() {
        let result = build_backtest_config(&adapter("[backtest]\nstart_period = 2005\n"));
        assert!(matches!(
            result,
            Err(QuantscreenError::ConfigMissing { key, .. }) if key == "end_period"
        ));
    }

    #[test]
    fn build_metrics_config_reads_mean_kind() {
        let config = build_metrics_config(&adapter("[backtest]\nmean = geometric\n")).unwrap();
        assert_eq!(config.mean, MeanKind::Geometric);
        let config = build_metrics_config(&adapter("[backtest]\n")).unwrap();
        assert_eq!(config.mean, MeanKind::Arithmetic);
    }

    #[test]
    fn build_search_config_reads_weighted_fitness() {
        let config = build_search_config(&adapter(
            "[search]\nfitness = weighted\nreturn_weight = 2.0\nrisk_weight = 0.5\n\
             population_size = 12\ngenerations = 7\nseed = 99\nthreads = 4\n",
        ))
        .unwrap();
        assert_eq!(config.population_size, 12);
        assert_eq!(config.generations, 7);
        assert_eq!(config.seed, 99);
        assert_eq!(config.threads, Some(4));
        assert_eq!(
            config.fitness,
            Fitness::Weighted {
                return_weight: 2.0,
                risk_weight: 0.5
            }
        );
    }

    #[test]
    fn build_search_config_defaults_to_sortino() {
        let config = build_search_config(&adapter("[search]\n")).unwrap();
        assert_eq!(config.fitness, Fitness::Sortino);
        assert_eq!(config.threads, None);
    }
}
