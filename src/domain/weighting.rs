//! Company ranking and portfolio weight assignment.
//!
//! Ranking and weighting both read only data dated at or before the decision
//! period. Ties in ranking break by company id ascending, so selection is
//! deterministic regardless of panel iteration order.

use crate::domain::error::QuantscreenError;
use crate::domain::evaluator::EligibleSet;
use crate::domain::panel::Period;
use crate::domain::trajectory::Holding;
use crate::ports::panel_port::PanelPort;
use serde::{Deserialize, Serialize};

const VOL_EPSILON: f64 = 1e-8;
/// Fallback annual volatility for companies with too little price history.
const DEFAULT_VOL: f64 = 0.2;

/// Score used to order eligible companies before top-k selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RankBy {
    /// Total close-to-close return over the decision period.
    PriorReturn,
    /// Latest observation of a named ratio, descending (e.g. `market_cap`).
    Ratio(String),
    /// No ranking: all companies score equally and order by id.
    Unranked,
}

/// How the selected companies split the portfolio.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WeightScheme {
    Equal,
    /// Proportional to the (non-negative part of the) ranking score.
    ScoreWeighted,
    /// Proportional to the latest observation of a named ratio.
    RatioWeighted(String),
    /// Proportional to the inverse of prior-period daily volatility.
    InverseVolatility,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedCompany {
    pub company: String,
    pub score: f64,
}

pub fn rank_companies(
    panel: &dyn PanelPort,
    eligible: &EligibleSet,
    rank_by: &RankBy,
    decision: Period,
) -> Result<Vec<RankedCompany>, QuantscreenError> {
    let mut ranked = Vec::with_capacity(eligible.len());

    for company in &eligible.companies {
        let score = match rank_by {
            RankBy::PriorReturn => prior_return(panel, company, decision)?,
            RankBy::Ratio(name) => panel
                .latest_ratio(company, name, decision)?
                .map(|obs| obs.value)
                .unwrap_or(f64::NEG_INFINITY),
            RankBy::Unranked => 0.0,
        };
        ranked.push(RankedCompany {
            company: company.clone(),
            score,
        });
    }

    ranked.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.company.cmp(&b.company))
    });

    Ok(ranked)
}

/// Keep the `k` best-ranked companies; `None` keeps all.
pub fn select_top_k(mut ranked: Vec<RankedCompany>, k: Option<usize>) -> Vec<RankedCompany> {
    if let Some(k) = k {
        ranked.truncate(k);
    }
    ranked
}

pub fn assign_weights(
    panel: &dyn PanelPort,
    selected: &[RankedCompany],
    scheme: &WeightScheme,
    decision: Period,
) -> Result<Vec<Holding>, QuantscreenError> {
    if selected.is_empty() {
        return Ok(Vec::new());
    }

    let raw: Vec<f64> = match scheme {
        WeightScheme::Equal => vec![1.0; selected.len()],
        WeightScheme::ScoreWeighted => selected.iter().map(|r| r.score.max(0.0)).collect(),
        WeightScheme::RatioWeighted(name) => {
            let mut values = Vec::with_capacity(selected.len());
            for r in selected {
                let value = panel
                    .latest_ratio(&r.company, name, decision)?
                    .map(|obs| obs.value)
                    .unwrap_or(1.0);
                values.push(value.max(0.0));
            }
            values
        }
        WeightScheme::InverseVolatility => {
            let mut values = Vec::with_capacity(selected.len());
            for r in selected {
                let vol = prior_volatility(panel, &r.company, decision)?;
                values.push(1.0 / (vol + VOL_EPSILON));
            }
            values
        }
    };

    let total: f64 = raw.iter().sum();
    if total <= 0.0 {
        // Degenerate scores (all zero or negative) fall back to equal weight.
        let equal = 1.0 / selected.len() as f64;
        return Ok(selected
            .iter()
            .map(|r| Holding {
                company: r.company.clone(),
                weight: equal,
            })
            .collect());
    }

    Ok(selected
        .iter()
        .zip(raw)
        .map(|(r, v)| Holding {
            company: r.company.clone(),
            weight: v / total,
        })
        .collect())
}

/// Close-to-close return over the decision period, or -inf when fewer than
/// two prices exist (ranks the company last).
fn prior_return(
    panel: &dyn PanelPort,
    company: &str,
    decision: Period,
) -> Result<f64, QuantscreenError> {
    let series = panel.price_series(company, decision.first_day(), decision.last_day())?;
    if series.len() < 2 {
        return Ok(f64::NEG_INFINITY);
    }
    let first = series[0].close;
    let last = series[series.len() - 1].close;
    if first <= 0.0 {
        return Ok(f64::NEG_INFINITY);
    }
    Ok(last / first - 1.0)
}

/// Population standard deviation of daily returns over the decision period.
fn prior_volatility(
    panel: &dyn PanelPort,
    company: &str,
    decision: Period,
) -> Result<f64, QuantscreenError> {
    let series = panel.price_series(company, decision.first_day(), decision.last_day())?;
    if series.len() < 3 {
        return Ok(DEFAULT_VOL);
    }

    let returns: Vec<f64> = series
        .windows(2)
        .filter(|w| w[0].close > 0.0)
        .map(|w| w[1].close / w[0].close - 1.0)
        .collect();
    if returns.is_empty() {
        return Ok(DEFAULT_VOL);
    }

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    Ok(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::MemoryPanelAdapter;
    use crate::domain::company::Company;
    use chrono::NaiveDate;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn eligible(companies: &[&str]) -> EligibleSet {
        EligibleSet {
            period: Period(2020),
            companies: companies.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn panel_with_prices() -> MemoryPanelAdapter {
        let mut panel = MemoryPanelAdapter::new();
        for id in ["UP", "DOWN", "FLAT"] {
            panel.add_company(Company {
                id: id.to_string(),
                name: id.to_string(),
                sector: "Test".to_string(),
                listing_date: date(2000, 1, 1),
                delisted_date: None,
            });
        }
        // 2020 prices: UP doubles, DOWN halves, FLAT unchanged.
        panel.add_price("UP", date(2020, 1, 2), 10.0, 0.0);
        panel.add_price("UP", date(2020, 12, 30), 20.0, 0.0);
        panel.add_price("DOWN", date(2020, 1, 2), 10.0, 0.0);
        panel.add_price("DOWN", date(2020, 12, 30), 5.0, 0.0);
        panel.add_price("FLAT", date(2020, 1, 2), 10.0, 0.0);
        panel.add_price("FLAT", date(2020, 12, 30), 10.0, 0.0);
        panel
    }

    #[test]
    fn rank_by_prior_return_orders_descending() {
        let panel = panel_with_prices();
        let ranked = rank_companies(
            &panel,
            &eligible(&["DOWN", "FLAT", "UP"]),
            &RankBy::PriorReturn,
            Period(2020),
        )
        .unwrap();
        let names: Vec<&str> = ranked.iter().map(|r| r.company.as_str()).collect();
        assert_eq!(names, vec!["UP", "FLAT", "DOWN"]);
        assert!((ranked[0].score - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rank_missing_prices_sorts_last() {
        let mut panel = panel_with_prices();
        panel.add_company(Company {
            id: "NOPX".to_string(),
            name: "No Prices".to_string(),
            sector: "Test".to_string(),
            listing_date: date(2000, 1, 1),
            delisted_date: None,
        });
        let ranked = rank_companies(
            &panel,
            &eligible(&["NOPX", "UP"]),
            &RankBy::PriorReturn,
            Period(2020),
        )
        .unwrap();
        assert_eq!(ranked[1].company, "NOPX");
    }

    #[test]
    fn rank_by_ratio_uses_latest_observation() {
        let mut panel = panel_with_prices();
        panel.add_ratio("UP", "market_cap", Period(2020), 100.0);
        panel.add_ratio("DOWN", "market_cap", Period(2020), 900.0);
        let ranked = rank_companies(
            &panel,
            &eligible(&["UP", "DOWN"]),
            &RankBy::Ratio("market_cap".to_string()),
            Period(2020),
        )
        .unwrap();
        assert_eq!(ranked[0].company, "DOWN");
    }

    #[test]
    fn unranked_ties_break_by_id() {
        let panel = panel_with_prices();
        let ranked = rank_companies(
            &panel,
            &eligible(&["UP", "DOWN", "FLAT"]),
            &RankBy::Unranked,
            Period(2020),
        )
        .unwrap();
        let names: Vec<&str> = ranked.iter().map(|r| r.company.as_str()).collect();
        assert_eq!(names, vec!["DOWN", "FLAT", "UP"]);
    }

    #[test]
    fn select_top_k_truncates() {
        let ranked = vec![
            RankedCompany {
                company: "A".to_string(),
                score: 3.0,
            },
            RankedCompany {
                company: "B".to_string(),
                score: 2.0,
            },
            RankedCompany {
                company: "C".to_string(),
                score: 1.0,
            },
        ];
        assert_eq!(select_top_k(ranked.clone(), Some(2)).len(), 2);
        assert_eq!(select_top_k(ranked, None).len(), 3);
    }

    #[test]
    fn equal_weights_sum_to_one() {
        let panel = panel_with_prices();
        let selected = vec![
            RankedCompany {
                company: "UP".to_string(),
                score: 1.0,
            },
            RankedCompany {
                company: "DOWN".to_string(),
                score: -0.5,
            },
        ];
        let holdings =
            assign_weights(&panel, &selected, &WeightScheme::Equal, Period(2020)).unwrap();
        assert_eq!(holdings.len(), 2);
        let total: f64 = holdings.iter().map(|h| h.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!((holdings[0].weight - 0.5).abs() < 1e-12);
    }

    #[test]
    fn score_weights_clamp_negative_scores() {
        let panel = panel_with_prices();
        let selected = vec![
            RankedCompany {
                company: "UP".to_string(),
                score: 1.0,
            },
            RankedCompany {
                company: "DOWN".to_string(),
                score: -0.5,
            },
        ];
        let holdings =
            assign_weights(&panel, &selected, &WeightScheme::ScoreWeighted, Period(2020))
                .unwrap();
        assert!((holdings[0].weight - 1.0).abs() < 1e-12);
        assert!((holdings[1].weight - 0.0).abs() < 1e-12);
    }

    #[test]
    fn all_nonpositive_scores_fall_back_to_equal() {
        let panel = panel_with_prices();
        let selected = vec![
            RankedCompany {
                company: "DOWN".to_string(),
                score: -0.5,
            },
            RankedCompany {
                company: "FLAT".to_string(),
                score: 0.0,
            },
        ];
        let holdings =
            assign_weights(&panel, &selected, &WeightScheme::ScoreWeighted, Period(2020))
                .unwrap();
        assert!((holdings[0].weight - 0.5).abs() < 1e-12);
        assert!((holdings[1].weight - 0.5).abs() < 1e-12);
    }

    #[test]
    fn ratio_weights_proportional_to_value() {
        let mut panel = panel_with_prices();
        panel.add_ratio("UP", "market_cap", Period(2020), 300.0);
        panel.add_ratio("DOWN", "market_cap", Period(2020), 100.0);
        let selected = vec![
            RankedCompany {
                company: "UP".to_string(),
                score: 0.0,
            },
            RankedCompany {
                company: "DOWN".to_string(),
                score: 0.0,
            },
        ];
        let holdings = assign_weights(
            &panel,
            &selected,
            &WeightScheme::RatioWeighted("market_cap".to_string()),
            Period(2020),
        )
        .unwrap();
        assert!((holdings[0].weight - 0.75).abs() < 1e-12);
        assert!((holdings[1].weight - 0.25).abs() < 1e-12);
    }

    #[test]
    fn inverse_vol_favors_steady_series() {
        let mut panel = MemoryPanelAdapter::new();
        for id in ["CALM", "WILD"] {
            panel.add_company(Company {
                id: id.to_string(),
                name: id.to_string(),
                sector: "Test".to_string(),
                listing_date: date(2000, 1, 1),
                delisted_date: None,
            });
        }
        let mut day = date(2020, 1, 2);
        for i in 0..10 {
            panel.add_price("CALM", day, 100.0 + i as f64 * 0.1, 0.0);
            let wild = if i % 2 == 0 { 100.0 } else { 120.0 };
            panel.add_price("WILD", day, wild, 0.0);
            day = day.succ_opt().unwrap();
        }
        let selected = vec![
            RankedCompany {
                company: "CALM".to_string(),
                score: 0.0,
            },
            RankedCompany {
                company: "WILD".to_string(),
                score: 0.0,
            },
        ];
        let holdings = assign_weights(
            &panel,
            &selected,
            &WeightScheme::InverseVolatility,
            Period(2020),
        )
        .unwrap();
        assert!(holdings[0].weight > holdings[1].weight);
        let total: f64 = holdings.iter().map(|h| h.weight).sum();
        assert!((total - 1.0).abs() < 1e-12);
    }

    #[test]
    fn empty_selection_yields_no_holdings() {
        let panel = panel_with_prices();
        let holdings =
            assign_weights(&panel, &[], &WeightScheme::Equal, Period(2020)).unwrap();
        assert!(holdings.is_empty());
    }
}
