//! Backtest simulation: drives the evaluator across a rebalancing schedule
//! and accrues holding-window returns into a [`Trajectory`].
//!
//! # Timing
//!
//! A rebalance at period `p` decides composition using data as of `p - 1`
//! (the last completed period), then holds the weights through periods
//! `p .. p + rebalance_every`. Selection therefore never sees the returns it
//! is about to be scored on.
//!
//! # Pricing
//!
//! A company's return over one period is `(last_close - first_close +
//! dividends) / first_close` over that period's price series, dividends taken
//! as cash. Companies with no usable series in a period are dropped and the
//! remaining weights renormalized; a holding window in which *nothing* can be
//! priced fails the run with a [`QuantscreenError::DataGap`].

use crate::domain::error::QuantscreenError;
use crate::domain::evaluator::evaluate;
use crate::domain::formula::Formula;
use crate::domain::panel::Period;
use crate::domain::trajectory::{
    Holding, PeriodReturn, PortfolioSnapshot, Trajectory,
};
use crate::domain::weighting::{
    assign_weights, rank_companies, select_top_k, RankBy, WeightScheme,
};
use crate::ports::panel_port::PanelPort;

pub const DEFAULT_MAX_PERIODS: u32 = 512;

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub start: Period,
    pub end: Period,
    /// Rebalance every k periods.
    pub rebalance_every: u32,
    pub initial_capital: f64,
    /// `None` keeps every eligible company.
    pub top_k: Option<usize>,
    pub rank_by: RankBy,
    pub weighting: WeightScheme,
    /// Upper bound on the number of simulated periods per run.
    pub max_periods: u32,
}

impl BacktestConfig {
    pub fn new(start: Period, end: Period) -> Self {
        BacktestConfig {
            start,
            end,
            rebalance_every: 1,
            initial_capital: 1.0,
            top_k: None,
            rank_by: RankBy::PriorReturn,
            weighting: WeightScheme::Equal,
            max_periods: DEFAULT_MAX_PERIODS,
        }
    }

    pub fn validate(&self) -> Result<(), QuantscreenError> {
        if self.start > self.end {
            return Err(QuantscreenError::InvalidBacktest {
                reason: format!(
                    "start period {} is after end period {}",
                    self.start, self.end
                ),
            });
        }
        if self.rebalance_every == 0 {
            return Err(QuantscreenError::InvalidBacktest {
                reason: "rebalance_every must be at least 1".to_string(),
            });
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(QuantscreenError::InvalidBacktest {
                reason: "initial_capital must be positive".to_string(),
            });
        }
        if self.top_k == Some(0) {
            return Err(QuantscreenError::InvalidBacktest {
                reason: "top_k must be at least 1 when set".to_string(),
            });
        }
        if self.max_periods == 0 {
            return Err(QuantscreenError::InvalidBacktest {
                reason: "max_periods must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn span(&self) -> u32 {
        self.end.0 - self.start.0 + 1
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Failed { detail: String },
}

/// One backtest run; tracks the `Idle → Running → Completed | Failed`
/// lifecycle around [`run_backtest`].
pub struct BacktestRun<'a> {
    panel: &'a dyn PanelPort,
    config: &'a BacktestConfig,
    state: RunState,
}

impl<'a> BacktestRun<'a> {
    pub fn new(panel: &'a dyn PanelPort, config: &'a BacktestConfig) -> Self {
        BacktestRun {
            panel,
            config,
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn run(&mut self, formula: &Formula) -> Result<Trajectory, QuantscreenError> {
        self.state = RunState::Running;
        match simulate(self.panel, formula, self.config) {
            Ok(trajectory) => {
                self.state = RunState::Completed;
                Ok(trajectory)
            }
            Err(err) => {
                self.state = RunState::Failed {
                    detail: err.to_string(),
                };
                Err(err)
            }
        }
    }
}

/// Convenience wrapper constructing a [`BacktestRun`] for a single formula.
pub fn run_backtest(
    panel: &dyn PanelPort,
    formula: &Formula,
    config: &BacktestConfig,
) -> Result<Trajectory, QuantscreenError> {
    BacktestRun::new(panel, config).run(formula)
}

fn simulate(
    panel: &dyn PanelPort,
    formula: &Formula,
    config: &BacktestConfig,
) -> Result<Trajectory, QuantscreenError> {
    config.validate()?;
    formula.validate()?;

    if config.span() > config.max_periods {
        return Err(QuantscreenError::PeriodBudget {
            limit: config.max_periods,
        });
    }

    let mut snapshots: Vec<PortfolioSnapshot> = Vec::new();
    let mut returns: Vec<PeriodReturn> = Vec::new();
    let mut equity = config.initial_capital;

    let mut rebalance = config.start;
    while rebalance <= config.end {
        let decision = rebalance.prev();
        let eligible = evaluate(panel, formula, decision)?;

        let holdings: Vec<Holding> = if eligible.is_empty() {
            Vec::new()
        } else {
            let ranked = rank_companies(panel, &eligible, &config.rank_by, decision)?;
            let selected = select_top_k(ranked, config.top_k);
            assign_weights(panel, &selected, &config.weighting, decision)?
        };

        let snapshot = PortfolioSnapshot {
            period: rebalance,
            holdings,
        };

        let window_end = Period(
            (rebalance.0 + config.rebalance_every - 1).min(config.end.0),
        );

        // Cash windows accrue zero return and need no prices.
        let mut window_priced = snapshot.is_cash();

        let mut period = rebalance;
        while period <= window_end {
            let value = if snapshot.is_cash() {
                0.0
            } else {
                match portfolio_return(panel, &snapshot, period)? {
                    Some(r) => {
                        window_priced = true;
                        r
                    }
                    // Every holding unpriced this period; treat as stale.
                    None => 0.0,
                }
            };
            equity *= 1.0 + value;
            returns.push(PeriodReturn { period, value });
            period = period.next();
        }

        if !window_priced {
            return Err(QuantscreenError::DataGap {
                period: rebalance,
                companies: snapshot
                    .holdings
                    .iter()
                    .map(|h| h.company.clone())
                    .collect(),
            });
        }

        snapshots.push(snapshot);
        rebalance = rebalance.offset(config.rebalance_every);
    }

    Ok(Trajectory {
        snapshots,
        returns,
        initial_capital: config.initial_capital,
        final_equity: equity,
    })
}

/// Weighted return of the held companies over one period, renormalized over
/// the companies that have a usable price series. `None` when nothing could
/// be priced.
fn portfolio_return(
    panel: &dyn PanelPort,
    snapshot: &PortfolioSnapshot,
    period: Period,
) -> Result<Option<f64>, QuantscreenError> {
    let mut weighted = 0.0;
    let mut priced_weight = 0.0;

    for holding in &snapshot.holdings {
        if let Some(r) = company_return(panel, &holding.company, period)? {
            weighted += holding.weight * r;
            priced_weight += holding.weight;
        }
    }

    if priced_weight <= 0.0 {
        return Ok(None);
    }
    Ok(Some(weighted / priced_weight))
}

fn company_return(
    panel: &dyn PanelPort,
    company: &str,
    period: Period,
) -> Result<Option<f64>, QuantscreenError> {
    let series = panel.price_series(company, period.first_day(), period.last_day())?;
    if series.len() < 2 {
        return Ok(None);
    }

    let entry = series[0].close;
    if entry <= 0.0 {
        return Ok(None);
    }
    let exit = series[series.len() - 1].close;
    let dividends: f64 = series[1..].iter().map(|p| p.dividend).sum();

    Ok(Some((exit - entry + dividends) / entry))
}
