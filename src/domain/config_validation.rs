//! Configuration validation.
//!
//! Validates every config field before a backtest or search run starts, so
//! misconfiguration fails up front with the offending section/key named.

use crate::domain::error::QuantscreenError;
use crate::domain::metrics::MeanKind;
use crate::domain::weighting::{RankBy, WeightScheme};
use crate::ports::config_port::ConfigPort;

pub fn validate_panel_config(config: &dyn ConfigPort) -> Result<(), QuantscreenError> {
    let source = config
        .get_string("panel", "source")
        .ok_or_else(|| QuantscreenError::ConfigMissing {
            section: "panel".to_string(),
            key: "source".to_string(),
        })?;
    match source.as_str() {
        "csv" | "sqlite" => {}
        other => {
            return Err(QuantscreenError::ConfigInvalid {
                section: "panel".to_string(),
                key: "source".to_string(),
                reason: format!("unknown panel source '{other}' (expected csv or sqlite)"),
            });
        }
    }
    match config.get_string("panel", "path") {
        Some(p) if !p.trim().is_empty() => Ok(()),
        _ => Err(QuantscreenError::ConfigMissing {
            section: "panel".to_string(),
            key: "path".to_string(),
        }),
    }
}

pub fn validate_backtest_config(config: &dyn ConfigPort) -> Result<(), QuantscreenError> {
    let start = required_period(config, "start_period")?;
    let end = required_period(config, "end_period")?;
    if start > end {
        return Err(QuantscreenError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "start_period".to_string(),
            reason: "start_period must not be after end_period".to_string(),
        });
    }

    if config.get_int("backtest", "rebalance_every", 1) < 1 {
        return Err(QuantscreenError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "rebalance_every".to_string(),
            reason: "rebalance_every must be at least 1".to_string(),
        });
    }

    let capital = config.get_double("backtest", "initial_capital", 1.0);
    if !(capital.is_finite() && capital > 0.0) {
        return Err(QuantscreenError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "initial_capital".to_string(),
            reason: "initial_capital must be positive".to_string(),
        });
    }

    if config.get_int("backtest", "top_k", 0) < 0 {
        return Err(QuantscreenError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "top_k".to_string(),
            reason: "top_k must be non-negative (0 keeps all eligible)".to_string(),
        });
    }

    if config.get_int("backtest", "max_periods", 512) < 1 {
        return Err(QuantscreenError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "max_periods".to_string(),
            reason: "max_periods must be at least 1".to_string(),
        });
    }

    let rf = config.get_double("backtest", "risk_free_rate", 0.0);
    if !(0.0..1.0).contains(&rf) {
        return Err(QuantscreenError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "risk_free_rate".to_string(),
            reason: "risk_free_rate must be between 0 and 1".to_string(),
        });
    }

    if let Some(value) = config.get_string("backtest", "rank_by") {
        parse_rank_by(&value).map_err(|reason| QuantscreenError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "rank_by".to_string(),
            reason,
        })?;
    }
    if let Some(value) = config.get_string("backtest", "weighting") {
        parse_weighting(&value).map_err(|reason| QuantscreenError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "weighting".to_string(),
            reason,
        })?;
    }
    if let Some(value) = config.get_string("backtest", "mean") {
        parse_mean(&value).map_err(|reason| QuantscreenError::ConfigInvalid {
            section: "backtest".to_string(),
            key: "mean".to_string(),
            reason,
        })?;
    }

    Ok(())
}

pub fn validate_search_config(config: &dyn ConfigPort) -> Result<(), QuantscreenError> {
    if config.get_int("search", "population_size", 20) < 1 {
        return Err(QuantscreenError::ConfigInvalid {
            section: "search".to_string(),
            key: "population_size".to_string(),
            reason: "population_size must be at least 1".to_string(),
        });
    }

    if config.get_int("search", "generations", 10) < 1 {
        return Err(QuantscreenError::ConfigInvalid {
            section: "search".to_string(),
            key: "generations".to_string(),
            reason: "generations must be at least 1".to_string(),
        });
    }

    let retain = config.get_double("search", "retain_fraction", 0.25);
    if !(retain > 0.0 && retain <= 1.0) {
        return Err(QuantscreenError::ConfigInvalid {
            section: "search".to_string(),
            key: "retain_fraction".to_string(),
            reason: "retain_fraction must be in (0, 1]".to_string(),
        });
    }

    if config.get_int("search", "patience", 0) < 0 {
        return Err(QuantscreenError::ConfigInvalid {
            section: "search".to_string(),
            key: "patience".to_string(),
            reason: "patience must be non-negative".to_string(),
        });
    }

    if let Some(value) = config.get_string("search", "fitness") {
        match value.as_str() {
            "sortino" | "weighted" => {}
            other => {
                return Err(QuantscreenError::ConfigInvalid {
                    section: "search".to_string(),
                    key: "fitness".to_string(),
                    reason: format!("unknown fitness '{other}' (expected sortino or weighted)"),
                });
            }
        }
    }

    if config.get_int("search", "threads", 0) < 0 {
        return Err(QuantscreenError::ConfigInvalid {
            section: "search".to_string(),
            key: "threads".to_string(),
            reason: "threads must be non-negative (0 uses the default pool)".to_string(),
        });
    }

    if config.get_int("search", "max_filters", 5) < 1 {
        return Err(QuantscreenError::ConfigInvalid {
            section: "search".to_string(),
            key: "max_filters".to_string(),
            reason: "max_filters must be at least 1".to_string(),
        });
    }

    Ok(())
}

pub fn required_period(
    config: &dyn ConfigPort,
    key: &str,
) -> Result<u32, QuantscreenError> {
    let value = config.get_int("backtest", key, -1);
    if value < 0 {
        return Err(QuantscreenError::ConfigMissing {
            section: "backtest".to_string(),
            key: key.to_string(),
        });
    }
    u32::try_from(value).map_err(|_| QuantscreenError::ConfigInvalid {
        section: "backtest".to_string(),
        key: key.to_string(),
        reason: "period out of range".to_string(),
    })
}

pub fn parse_rank_by(value: &str) -> Result<RankBy, String> {
    if let Some(ratio) = value.strip_prefix("ratio:") {
        if ratio.trim().is_empty() {
            return Err("ratio name missing after 'ratio:'".to_string());
        }
        return Ok(RankBy::Ratio(ratio.trim().to_string()));
    }
    match value {
        "prior_return" => Ok(RankBy::PriorReturn),
        "none" => Ok(RankBy::Unranked),
        other => Err(format!(
            "unknown rank_by '{other}' (expected prior_return, none, or ratio:<name>)"
        )),
    }
}

pub fn parse_weighting(value: &str) -> Result<WeightScheme, String> {
    if let Some(ratio) = value.strip_prefix("ratio:") {
        if ratio.trim().is_empty() {
            return Err("ratio name missing after 'ratio:'".to_string());
        }
        return Ok(WeightScheme::RatioWeighted(ratio.trim().to_string()));
    }
    match value {
        "equal" => Ok(WeightScheme::Equal),
        "score" => Ok(WeightScheme::ScoreWeighted),
        "inverse_vol" => Ok(WeightScheme::InverseVolatility),
        other => Err(format!(
            "unknown weighting '{other}' (expected equal, score, inverse_vol, or ratio:<name>)"
        )),
    }
}

pub fn parse_mean(value: &str) -> Result<MeanKind, String> {
    match value {
        "arithmetic" => Ok(MeanKind::Arithmetic),
        "geometric" => Ok(MeanKind::Geometric),
        other => Err(format!(
            "unknown mean '{other}' (expected arithmetic or geometric)"
        )),
    }
}
