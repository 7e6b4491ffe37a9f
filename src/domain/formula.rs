//! Formula data structures.
//!
//! A formula is a declarative selection rule: a set of named threshold
//! filters on financial ratios, each with a temporal persistence requirement
//! ("the ratio satisfied the threshold in at least `hold_count` of the last
//! `window_length` periods"), plus an optional single-period market-cap gate.
//!
//! Invariants are enforced at construction and re-checked after
//! deserialization; a malformed formula is rejected with the violated
//! constraint named, never coerced.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ratio name the market-cap gate reads.
pub const MARKET_CAP_RATIO: &str = "market_cap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
}

impl Comparator {
    pub fn holds(self, value: f64, threshold: f64) -> bool {
        match self {
            Comparator::Gt => value > threshold,
            Comparator::Lt => value < threshold,
            Comparator::Ge => value >= threshold,
            Comparator::Le => value <= threshold,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Comparator::Gt => ">",
            Comparator::Lt => "<",
            Comparator::Ge => ">=",
            Comparator::Le => "<=",
        }
    }

    pub const ALL: [Comparator; 4] = [
        Comparator::Gt,
        Comparator::Lt,
        Comparator::Ge,
        Comparator::Le,
    ];
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.symbol())
    }
}

/// One threshold filter with persistence: `comparator(value, threshold)` must
/// hold in at least `hold_count` of the most recent `window_length` periods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub comparator: Comparator,
    pub threshold: f64,
    pub hold_count: u32,
    pub window_length: u32,
}

impl Condition {
    pub fn new(
        comparator: Comparator,
        threshold: f64,
        hold_count: u32,
        window_length: u32,
    ) -> Result<Self, FormulaError> {
        let condition = Condition {
            comparator,
            threshold,
            hold_count,
            window_length,
        };
        condition.validate("(unnamed)")?;
        Ok(condition)
    }

    fn validate(&self, filter: &str) -> Result<(), FormulaError> {
        if !self.threshold.is_finite() {
            return Err(FormulaError::NonFiniteThreshold {
                filter: filter.to_string(),
            });
        }
        if self.window_length == 0 {
            return Err(FormulaError::ZeroWindow {
                filter: filter.to_string(),
            });
        }
        if self.hold_count == 0 {
            return Err(FormulaError::ZeroHold {
                filter: filter.to_string(),
            });
        }
        if self.hold_count > self.window_length {
            return Err(FormulaError::HoldExceedsWindow {
                filter: filter.to_string(),
                hold_count: self.hold_count,
                window_length: self.window_length,
            });
        }
        Ok(())
    }
}

/// Single-period threshold on the latest `market_cap` observation, applied
/// before the persistence filters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCapGate {
    pub comparator: Comparator,
    pub threshold: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Formula {
    pub name: String,
    /// filter name (ratio name) → condition. BTreeMap keeps iteration order
    /// deterministic across runs and serialization round-trips.
    pub filters: BTreeMap<String, Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub market_cap_gate: Option<MarketCapGate>,
}

impl Formula {
    pub fn new(
        name: impl Into<String>,
        filters: BTreeMap<String, Condition>,
    ) -> Result<Self, FormulaError> {
        let formula = Formula {
            name: name.into(),
            filters,
            market_cap_gate: None,
        };
        formula.validate()?;
        Ok(formula)
    }

    pub fn with_market_cap_gate(mut self, gate: MarketCapGate) -> Result<Self, FormulaError> {
        self.market_cap_gate = Some(gate);
        self.validate()?;
        Ok(self)
    }

    /// Re-check every construction invariant. Called on every deserialized
    /// formula before it reaches the evaluator.
    pub fn validate(&self) -> Result<(), FormulaError> {
        if self.filters.is_empty() {
            return Err(FormulaError::Empty);
        }
        for (filter, condition) in &self.filters {
            condition.validate(filter)?;
        }
        if let Some(gate) = &self.market_cap_gate {
            if !gate.threshold.is_finite() {
                return Err(FormulaError::NonFiniteThreshold {
                    filter: MARKET_CAP_RATIO.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Longest window any filter looks back over.
    pub fn max_window(&self) -> u32 {
        self.filters
            .values()
            .map(|c| c.window_length)
            .max()
            .unwrap_or(0)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> Result<Self, FormulaError> {
        let formula: Formula =
            serde_json::from_str(json).map_err(|e| FormulaError::Malformed {
                reason: e.to_string(),
            })?;
        formula.validate()?;
        Ok(formula)
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FormulaError {
    #[error("formula has no filters")]
    Empty,

    #[error("filter {filter}: threshold must be finite")]
    NonFiniteThreshold { filter: String },

    #[error("filter {filter}: window_length must be at least 1")]
    ZeroWindow { filter: String },

    #[error("filter {filter}: hold_count must be at least 1")]
    ZeroHold { filter: String },

    #[error(
        "filter {filter}: hold_count {hold_count} exceeds window_length {window_length}"
    )]
    HoldExceedsWindow {
        filter: String,
        hold_count: u32,
        window_length: u32,
    },

    #[error("malformed formula: {reason}")]
    Malformed { reason: String },
}
