//! Backtest result report for downstream consumers.

use crate::domain::formula::Formula;
use crate::domain::metrics::MetricsSummary;
use crate::domain::trajectory::Trajectory;
use serde::{Deserialize, Serialize};

/// Trajectory plus metrics, keyed by formula name and run timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub formula_name: String,
    /// RFC 3339 UTC timestamp of the run that produced this report.
    pub run_at: String,
    pub formula: Formula,
    pub trajectory: Trajectory,
    pub metrics: MetricsSummary,
}

impl BacktestReport {
    pub fn new(formula: Formula, trajectory: Trajectory, metrics: MetricsSummary) -> Self {
        Self::with_timestamp(
            formula,
            trajectory,
            metrics,
            chrono::Utc::now().to_rfc3339(),
        )
    }

    pub fn with_timestamp(
        formula: Formula,
        trajectory: Trajectory,
        metrics: MetricsSummary,
        run_at: String,
    ) -> Self {
        BacktestReport {
            formula_name: formula.name.clone(),
            run_at,
            formula,
            trajectory,
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::formula::{Comparator, Condition};
    use crate::domain::metrics::MetricsConfig;
    use std::collections::BTreeMap;

    fn sample_report() -> BacktestReport {
        let mut filters = BTreeMap::new();
        filters.insert(
            "ROE".to_string(),
            Condition::new(Comparator::Gt, 15.0, 2, 3).unwrap(),
        );
        let formula = Formula::new("quality", filters).unwrap();
        let trajectory = Trajectory {
            snapshots: Vec::new(),
            returns: Vec::new(),
            initial_capital: 1.0,
            final_equity: 1.0,
        };
        let metrics = MetricsSummary::compute(&trajectory, &MetricsConfig::default());
        BacktestReport::with_timestamp(
            formula,
            trajectory,
            metrics,
            "2024-06-01T00:00:00+00:00".to_string(),
        )
    }

    #[test]
    fn report_keyed_by_formula_name() {
        let report = sample_report();
        assert_eq!(report.formula_name, "quality");
        assert_eq!(report.formula.name, "quality");
    }

    #[test]
    fn report_round_trips_through_json() {
        let report = sample_report();
        let json = serde_json::to_string(&report).unwrap();
        let back: BacktestReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, report);
    }
}
