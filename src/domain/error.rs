//! Domain error types.

use crate::domain::formula::FormulaError;
use crate::domain::panel::Period;

/// Top-level error type for quantscreen.
#[derive(Debug, thiserror::Error)]
pub enum QuantscreenError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error(transparent)]
    Formula(#[from] FormulaError),

    #[error("invalid backtest configuration: {reason}")]
    InvalidBacktest { reason: String },

    #[error("no panel data for company {company}")]
    NoData { company: String },

    /// Candidate-fatal: an entire holding window could not be priced.
    #[error("price gap at period {period}: no usable series for {companies:?}")]
    DataGap {
        period: Period,
        companies: Vec<String>,
    },

    #[error("backtest span exceeds period budget of {limit} periods")]
    PeriodBudget { limit: u32 },

    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for QuantscreenError {
    fn from(err: serde_json::Error) -> Self {
        QuantscreenError::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<&QuantscreenError> for std::process::ExitCode {
    fn from(err: &QuantscreenError) -> Self {
        let code: u8 = match err {
            QuantscreenError::Io(_) => 1,
            QuantscreenError::ConfigParse { .. }
            | QuantscreenError::ConfigMissing { .. }
            | QuantscreenError::ConfigInvalid { .. } => 2,
            QuantscreenError::Database { .. } | QuantscreenError::DatabaseQuery { .. } => 3,
            QuantscreenError::Formula(_) | QuantscreenError::Serialization { .. } => 4,
            QuantscreenError::InvalidBacktest { .. }
            | QuantscreenError::NoData { .. }
            | QuantscreenError::DataGap { .. }
            | QuantscreenError::PeriodBudget { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
