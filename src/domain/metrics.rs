//! Performance metrics over a completed trajectory.
//!
//! `compute` is a pure function: no side effects, safe to call repeatedly,
//! and every field is a defined finite number. Ratios over a zero
//! denominator are clamped to `±RATIO_CAP` rather than producing NaN or
//! infinity.

use crate::domain::trajectory::{turnover_between, Trajectory};
use serde::{Deserialize, Serialize};

/// Sentinel magnitude for risk-adjusted ratios whose denominator is zero.
pub const RATIO_CAP: f64 = 1.0e4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeanKind {
    Arithmetic,
    Geometric,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricsConfig {
    pub mean: MeanKind,
    /// Returns below this target count toward downside deviation.
    pub downside_target: f64,
    /// Per-period risk-free rate subtracted in sharpe/sortino.
    pub risk_free_rate: f64,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        MetricsConfig {
            mean: MeanKind::Arithmetic,
            downside_target: 0.0,
            risk_free_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub mean_return: f64,
    pub median_return: f64,
    pub volatility: f64,
    pub downside_deviation: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub max_drawdown: f64,
    pub turnover: f64,
    pub periods: usize,
}

impl MetricsSummary {
    pub fn compute(trajectory: &Trajectory, config: &MetricsConfig) -> Self {
        let returns: Vec<f64> = trajectory.returns.iter().map(|r| r.value).collect();
        let n = returns.len();

        if n == 0 {
            return MetricsSummary {
                mean_return: 0.0,
                median_return: 0.0,
                volatility: 0.0,
                downside_deviation: 0.0,
                sharpe: 0.0,
                sortino: 0.0,
                max_drawdown: 0.0,
                turnover: 0.0,
                periods: 0,
            };
        }

        let mean_return = match config.mean {
            MeanKind::Arithmetic => returns.iter().sum::<f64>() / n as f64,
            MeanKind::Geometric => geometric_mean(&returns),
        };
        let median_return = median(&returns);

        let arithmetic = returns.iter().sum::<f64>() / n as f64;
        let variance =
            returns.iter().map(|r| (r - arithmetic).powi(2)).sum::<f64>() / n as f64;
        let volatility = variance.sqrt();

        // Sub-target deviations in the numerator, full period count in the
        // denominator. All-non-negative runs yield exactly 0.
        let downside_sum: f64 = returns
            .iter()
            .filter(|&&r| r < config.downside_target)
            .map(|&r| (r - config.downside_target).powi(2))
            .sum();
        let downside_deviation = (downside_sum / n as f64).sqrt();

        let excess = mean_return - config.risk_free_rate;
        let sharpe = capped_ratio(excess, volatility);
        let sortino = capped_ratio(excess, downside_deviation);

        let max_drawdown = compute_drawdown(&trajectory.equity_curve());

        let rebalances = trajectory.snapshots.len().saturating_sub(1);
        let turnover = if rebalances == 0 {
            0.0
        } else {
            trajectory
                .snapshots
                .windows(2)
                .map(|w| turnover_between(&w[0], &w[1]))
                .sum::<f64>()
                / rebalances as f64
        };

        MetricsSummary {
            mean_return,
            median_return,
            volatility,
            downside_deviation,
            sharpe,
            sortino,
            max_drawdown,
            turnover,
            periods: n,
        }
    }
}

fn capped_ratio(excess: f64, denominator: f64) -> f64 {
    if denominator > 0.0 {
        (excess / denominator).clamp(-RATIO_CAP, RATIO_CAP)
    } else if excess > 0.0 {
        RATIO_CAP
    } else if excess < 0.0 {
        -RATIO_CAP
    } else {
        0.0
    }
}

fn geometric_mean(returns: &[f64]) -> f64 {
    let mut product = 1.0_f64;
    for r in returns {
        let growth = 1.0 + r;
        if growth <= 0.0 {
            // Total loss in some period; the compounded mean floors at -100%.
            return -1.0;
        }
        product *= growth;
    }
    product.powf(1.0 / returns.len() as f64) - 1.0
}

fn median(returns: &[f64]) -> f64 {
    let mut sorted = returns.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[mid]
    } else {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    }
}

fn compute_drawdown(equity_curve: &[f64]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_dd = 0.0_f64;

    for &equity in equity_curve {
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            let dd = (peak - equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd
}
