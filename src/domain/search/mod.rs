//! Rule search: propose candidate formulas, score them with the backtester,
//! retain survivors, iterate.
//!
//! Candidates within a generation are independent and the panel is read-only,
//! so evaluation fans out across a rayon pool and joins before ranking. The
//! generation loop is the only sequential boundary. A failed candidate is
//! scored at `-inf` and discarded; it never aborts the generation. The best
//! candidate seen across the whole run is returned even when the final
//! generation retains nothing.

pub mod proposer;

use crate::domain::formula::Formula;
use crate::domain::metrics::{MetricsConfig, MetricsSummary};
use crate::domain::simulator::{run_backtest, BacktestConfig};
use crate::ports::panel_port::PanelPort;
use proposer::Proposer;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};

/// How a candidate's metrics collapse into a single score.
#[derive(Debug, Clone, PartialEq)]
pub enum Fitness {
    Sortino,
    /// `return_weight * mean_return - risk_weight * downside_deviation`.
    Weighted {
        return_weight: f64,
        risk_weight: f64,
    },
}

impl Fitness {
    pub fn score(&self, metrics: &MetricsSummary) -> f64 {
        let score = match self {
            Fitness::Sortino => metrics.sortino,
            Fitness::Weighted {
                return_weight,
                risk_weight,
            } => return_weight * metrics.mean_return - risk_weight * metrics.downside_deviation,
        };
        if score.is_nan() {
            f64::NEG_INFINITY
        } else {
            score
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
    Proposed,
    Evaluated,
    Retained,
    Discarded,
}

/// A candidate after evaluation. `metrics` is `None` when its backtest
/// failed; such candidates carry `-inf` fitness and are never retained.
#[derive(Debug, Clone)]
pub struct ScoredFormula {
    pub formula: Formula,
    pub metrics: Option<MetricsSummary>,
    pub fitness: f64,
    pub state: CandidateState,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchConfig {
    pub population_size: usize,
    pub generations: u32,
    /// Fraction of each generation retained as parents.
    pub retain_fraction: f64,
    /// Stop after this many generations without best-fitness improvement;
    /// 0 disables the convergence check.
    pub patience: u32,
    pub fitness: Fitness,
    pub seed: u64,
    /// Worker threads for candidate evaluation; `None` uses the rayon
    /// default pool.
    pub threads: Option<usize>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            population_size: 20,
            generations: 10,
            retain_fraction: 0.25,
            patience: 0,
            fitness: Fitness::Sortino,
            seed: 0,
            threads: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    pub generation: u32,
    pub proposed: usize,
    pub failed: usize,
    pub retained: usize,
    pub best_fitness: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    GenerationBudget,
    Converged { stale_generations: u32 },
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    /// Best candidate seen across all generations.
    pub best: Option<ScoredFormula>,
    pub generations: Vec<GenerationReport>,
    pub stop: StopReason,
}

pub struct SearchController<'a> {
    panel: &'a dyn PanelPort,
    backtest: &'a BacktestConfig,
    metrics: &'a MetricsConfig,
    config: &'a SearchConfig,
}

impl<'a> SearchController<'a> {
    pub fn new(
        panel: &'a dyn PanelPort,
        backtest: &'a BacktestConfig,
        metrics: &'a MetricsConfig,
        config: &'a SearchConfig,
    ) -> Self {
        SearchController {
            panel,
            backtest,
            metrics,
            config,
        }
    }

    pub fn run(&self, proposer: &mut dyn Proposer, cancel: &AtomicBool) -> SearchOutcome {
        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let mut retained: Vec<ScoredFormula> = Vec::new();
        let mut best: Option<ScoredFormula> = None;
        let mut reports = Vec::new();
        let mut stale = 0u32;
        let mut stop = StopReason::GenerationBudget;

        for generation in 1..=self.config.generations {
            if cancel.load(Ordering::Relaxed) {
                stop = StopReason::Cancelled;
                break;
            }

            let candidates =
                proposer.propose(&retained, self.config.population_size, &mut rng);
            let proposed = candidates.len();

            let mut scored = self.evaluate_generation(candidates, cancel);
            scored.sort_by(|a, b| {
                b.fitness
                    .partial_cmp(&a.fitness)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.formula.name.cmp(&b.formula.name))
            });

            let failed = scored.iter().filter(|c| c.metrics.is_none()).count();
            let generation_best = scored
                .first()
                .map(|c| c.fitness)
                .unwrap_or(f64::NEG_INFINITY);

            let improved = match &best {
                Some(current) => generation_best > current.fitness,
                None => !scored.is_empty(),
            };
            if improved {
                best = scored.first().cloned();
            }

            let keep = ((proposed as f64 * self.config.retain_fraction).ceil() as usize).max(1);
            retained = scored
                .iter()
                .filter(|c| c.metrics.is_some() && c.fitness.is_finite())
                .take(keep)
                .cloned()
                .map(|mut c| {
                    c.state = CandidateState::Retained;
                    c
                })
                .collect();

            eprintln!(
                "Generation {}/{}: best fitness {:.4}, {} proposed, {} failed, {} retained",
                generation,
                self.config.generations,
                generation_best,
                proposed,
                failed,
                retained.len(),
            );

            reports.push(GenerationReport {
                generation,
                proposed,
                failed,
                retained: retained.len(),
                best_fitness: generation_best,
            });

            if cancel.load(Ordering::Relaxed) {
                stop = StopReason::Cancelled;
                break;
            }

            if improved {
                stale = 0;
            } else {
                stale += 1;
                if self.config.patience > 0 && stale >= self.config.patience {
                    stop = StopReason::Converged {
                        stale_generations: stale,
                    };
                    break;
                }
            }
        }

        SearchOutcome {
            best,
            generations: reports,
            stop,
        }
    }

    /// Fan-out/fan-in evaluation of one generation. Candidates skipped by a
    /// mid-generation cancel stay `Proposed` with `-inf` fitness.
    fn evaluate_generation(
        &self,
        candidates: Vec<Formula>,
        cancel: &AtomicBool,
    ) -> Vec<ScoredFormula> {
        let evaluate = |formula: Formula| self.evaluate_candidate(formula, cancel);

        match self.config.threads {
            Some(threads) => {
                match rayon::ThreadPoolBuilder::new().num_threads(threads).build() {
                    Ok(pool) => {
                        pool.install(|| candidates.into_par_iter().map(evaluate).collect())
                    }
                    Err(_) => candidates.into_par_iter().map(evaluate).collect(),
                }
            }
            None => candidates.into_par_iter().map(evaluate).collect(),
        }
    }

    fn evaluate_candidate(&self, formula: Formula, cancel: &AtomicBool) -> ScoredFormula {
        if cancel.load(Ordering::Relaxed) {
            return ScoredFormula {
                formula,
                metrics: None,
                fitness: f64::NEG_INFINITY,
                state: CandidateState::Proposed,
            };
        }

        match run_backtest(self.panel, &formula, self.backtest) {
            Ok(trajectory) => {
                let metrics = MetricsSummary::compute(&trajectory, self.metrics);
                let fitness = self.config.fitness.score(&metrics);
                ScoredFormula {
                    formula,
                    metrics: Some(metrics),
                    fitness,
                    state: CandidateState::Evaluated,
                }
            }
            Err(err) => {
                eprintln!("warning: candidate '{}' failed ({err})", formula.name);
                ScoredFormula {
                    formula,
                    metrics: None,
                    fitness: f64::NEG_INFINITY,
                    state: CandidateState::Discarded,
                }
            }
        }
    }
}
