//! JSON report adapter.

use crate::domain::error::QuantscreenError;
use crate::domain::report::BacktestReport;
use crate::ports::report_port::ReportPort;
use std::fs;

/// Writes a backtest report as pretty-printed JSON for external plotting and
/// attribution tools.
pub struct JsonReportAdapter;

impl ReportPort for JsonReportAdapter {
    fn write(&self, report: &BacktestReport, output_path: &str) -> Result<(), QuantscreenError> {
        let json = serde_json::to_string_pretty(report)?;
        fs::write(output_path, json)?;
        Ok(())
    }
}
