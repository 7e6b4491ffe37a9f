//! Portfolio snapshots and the backtest trajectory.

use crate::domain::panel::Period;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub company: String,
    pub weight: f64,
}

/// Portfolio composition fixed at one rebalance date. Weights sum to 1, or
/// the holdings list is empty and the portfolio sits in cash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub period: Period,
    pub holdings: Vec<Holding>,
}

impl PortfolioSnapshot {
    pub fn cash(period: Period) -> Self {
        PortfolioSnapshot {
            period,
            holdings: Vec::new(),
        }
    }

    pub fn is_cash(&self) -> bool {
        self.holdings.is_empty()
    }

    pub fn weight_of(&self, company: &str) -> f64 {
        self.holdings
            .iter()
            .find(|h| h.company == company)
            .map(|h| h.weight)
            .unwrap_or(0.0)
    }
}

/// Sum of absolute weight changes between two consecutive snapshots,
/// counting positions entered and exited on both sides.
pub fn turnover_between(prev: &PortfolioSnapshot, next: &PortfolioSnapshot) -> f64 {
    let mut total = 0.0;
    for holding in &next.holdings {
        total += (holding.weight - prev.weight_of(&holding.company)).abs();
    }
    for holding in &prev.holdings {
        if next.weight_of(&holding.company) == 0.0 {
            total += holding.weight.abs();
        }
    }
    total
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodReturn {
    pub period: Period,
    pub value: f64,
}

/// Completed backtest output: one snapshot per rebalance date plus the
/// realized return of every period in the run. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    pub snapshots: Vec<PortfolioSnapshot>,
    pub returns: Vec<PeriodReturn>,
    pub initial_capital: f64,
    pub final_equity: f64,
}

impl Trajectory {
    /// Equity after each period, starting from `initial_capital`.
    pub fn equity_curve(&self) -> Vec<f64> {
        let mut curve = Vec::with_capacity(self.returns.len() + 1);
        let mut equity = self.initial_capital;
        curve.push(equity);
        for r in &self.returns {
            equity *= 1.0 + r.value;
            curve.push(equity);
        }
        curve
    }
}
