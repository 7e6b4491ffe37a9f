//! Report output port trait.

use crate::domain::error::QuantscreenError;
use crate::domain::report::BacktestReport;

/// Port for writing backtest result reports for downstream consumers
/// (plotting, attribution) to pick up.
pub trait ReportPort {
    fn write(&self, report: &BacktestReport, output_path: &str) -> Result<(), QuantscreenError>;
}
