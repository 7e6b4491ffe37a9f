//! Formula evaluation against the point-in-time panel.
//!
//! # Evaluation Semantics
//!
//! - A company passes a filter when `comparator(value, threshold)` holds in
//!   at least `hold_count` of the most recent `window_length` observations at
//!   or before the as-of period.
//! - Fewer than `window_length` observations fails the filter closed: the
//!   company is excluded, no error is raised.
//! - The market-cap gate, when present, checks only the latest observation;
//!   a missing observation fails the gate closed.
//! - A company is eligible iff the gate and every filter pass.
//!
//! Evaluation is a pure function of (formula, period, panel contents as of
//! that period): it never reads data dated after the as-of period, so
//! identical inputs always produce identical eligible sets.

use crate::domain::error::QuantscreenError;
use crate::domain::formula::{Condition, Formula, MARKET_CAP_RATIO};
use crate::domain::panel::Period;
use crate::ports::panel_port::PanelPort;

/// Companies passing a formula at one period, sorted by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibleSet {
    pub period: Period,
    pub companies: Vec<String>,
}

impl EligibleSet {
    pub fn is_empty(&self) -> bool {
        self.companies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.companies.len()
    }
}

pub fn evaluate(
    panel: &dyn PanelPort,
    formula: &Formula,
    period: Period,
) -> Result<EligibleSet, QuantscreenError> {
    let mut companies = Vec::new();

    for company in panel.list_companies(period)? {
        if is_eligible(panel, formula, &company, period)? {
            companies.push(company);
        }
    }

    // list_companies is sorted; keep the invariant explicit for adapters
    // that forget.
    companies.sort();

    Ok(EligibleSet { period, companies })
}

fn is_eligible(
    panel: &dyn PanelPort,
    formula: &Formula,
    company: &str,
    period: Period,
) -> Result<bool, QuantscreenError> {
    if let Some(gate) = &formula.market_cap_gate {
        let passes = panel
            .latest_ratio(company, MARKET_CAP_RATIO, period)?
            .is_some_and(|obs| gate.comparator.holds(obs.value, gate.threshold));
        if !passes {
            return Ok(false);
        }
    }

    for (ratio, condition) in &formula.filters {
        if !passes_filter(panel, company, ratio, condition, period)? {
            return Ok(false);
        }
    }

    Ok(true)
}

fn passes_filter(
    panel: &dyn PanelPort,
    company: &str,
    ratio: &str,
    condition: &Condition,
    period: Period,
) -> Result<bool, QuantscreenError> {
    let history = panel.ratio_history(company, ratio, period, condition.window_length)?;

    // Insufficient history fails closed.
    if history.len() < condition.window_length as usize {
        return Ok(false);
    }

    let satisfied = history
        .iter()
        .filter(|obs| condition.comparator.holds(obs.value, condition.threshold))
        .count();

    Ok(satisfied >= condition.hold_count as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory_adapter::MemoryPanelAdapter;
    use crate::domain::company::Company;
    use crate::domain::formula::{Comparator, MarketCapGate};
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    fn company(id: &str) -> Company {
        Company {
            id: id.to_string(),
            name: format!("{id} Ltd"),
            sector: "Industrials".to_string(),
            listing_date: NaiveDate::from_ymd_opt(2000, 1, 1).unwrap(),
            delisted_date: None,
        }
    }

    fn formula_one(ratio: &str, comparator: Comparator, threshold: f64, hold: u32, window: u32) -> Formula {
        let mut filters = BTreeMap::new();
        filters.insert(
            ratio.to_string(),
            Condition::new(comparator, threshold, hold, window).unwrap(),
        );
        Formula::new("test", filters).unwrap()
    }

    /// Panel with PE series for two companies:
    /// CHEAP: 12, 13, 11, 14 over 2011-2014 (below 15 in 4 of 4)
    /// DEAR:  20, 14, 22, 25 over 2011-2014 (below 15 in 1 of 4)
    fn pe_panel() -> MemoryPanelAdapter {
        let mut panel = MemoryPanelAdapter::new();
        panel.add_company(company("CHEAP"));
        panel.add_company(company("DEAR"));
        for (i, &pe) in [12.0, 13.0, 11.0, 14.0].iter().enumerate() {
            panel.add_ratio("CHEAP", "PE_ratio", Period(2011 + i as u32), pe);
        }
        for (i, &pe) in [20.0, 14.0, 22.0, 25.0].iter().enumerate() {
            panel.add_ratio("DEAR", "PE_ratio", Period(2011 + i as u32), pe);
        }
        panel
    }

    #[test]
    fn persistent_filter_selects_persistent_company() {
        let panel = pe_panel();
        let formula = formula_one("PE_ratio", Comparator::Lt, 15.0, 3, 4);
        let eligible = evaluate(&panel, &formula, Period(2014)).unwrap();
        assert_eq!(eligible.companies, vec!["CHEAP"]);
    }

    #[test]
    fn hold_count_one_admits_intermittent_company() {
        let panel = pe_panel();
        let formula = formula_one("PE_ratio", Comparator::Lt, 15.0, 1, 4);
        let eligible = evaluate(&panel, &formula, Period(2014)).unwrap();
        assert_eq!(eligible.companies, vec!["CHEAP", "DEAR"]);
    }

    #[test]
    fn insufficient_history_fails_closed() {
        let panel = pe_panel();
        // Window of 4 but only 2 observations exist at or before 2012.
        let formula = formula_one("PE_ratio", Comparator::Lt, 100.0, 1, 4);
        let eligible = evaluate(&panel, &formula, Period(2012)).unwrap();
        assert!(eligible.is_empty());
    }

    #[test]
    fn missing_ratio_fails_closed() {
        let panel = pe_panel();
        let formula = formula_one("DividendYield", Comparator::Gt, 1.0, 1, 1);
        let eligible = evaluate(&panel, &formula, Period(2014)).unwrap();
        assert!(eligible.is_empty());
    }

    #[test]
    fn evaluation_ignores_future_observations() {
        let mut panel = pe_panel();
        let formula = formula_one("PE_ratio", Comparator::Lt, 15.0, 3, 4);
        let before = evaluate(&panel, &formula, Period(2014)).unwrap();

        // Mutating 2015 data must not change the 2014 answer.
        panel.add_ratio("CHEAP", "PE_ratio", Period(2015), 999.0);
        panel.add_ratio("DEAR", "PE_ratio", Period(2015), 1.0);
        let after = evaluate(&panel, &formula, Period(2014)).unwrap();

        assert_eq!(before, after);
    }

    #[test]
    fn all_filters_must_pass() {
        let mut panel = pe_panel();
        for year in 2011..=2014 {
            panel.add_ratio("CHEAP", "ROE", Period(year), 8.0);
            panel.add_ratio("DEAR", "ROE", Period(year), 25.0);
        }
        let mut filters = BTreeMap::new();
        filters.insert(
            "PE_ratio".to_string(),
            Condition::new(Comparator::Lt, 15.0, 1, 4).unwrap(),
        );
        filters.insert(
            "ROE".to_string(),
            Condition::new(Comparator::Gt, 20.0, 4, 4).unwrap(),
        );
        let formula = Formula::new("two filters", filters).unwrap();

        // CHEAP passes PE but not ROE; DEAR passes ROE and (1 of 4) PE.
        let eligible = evaluate(&panel, &formula, Period(2014)).unwrap();
        assert_eq!(eligible.companies, vec!["DEAR"]);
    }

    #[test]
    fn market_cap_gate_excludes_small_companies() {
        let mut panel = pe_panel();
        panel.add_ratio("CHEAP", "market_cap", Period(2014), 120.0);
        panel.add_ratio("DEAR", "market_cap", Period(2014), 900.0);

        let formula = formula_one("PE_ratio", Comparator::Lt, 30.0, 1, 1)
            .with_market_cap_gate(MarketCapGate {
                comparator: Comparator::Ge,
                threshold: 500.0,
            })
            .unwrap();

        let eligible = evaluate(&panel, &formula, Period(2014)).unwrap();
        assert_eq!(eligible.companies, vec!["DEAR"]);
    }

    #[test]
    fn market_cap_gate_missing_observation_fails_closed() {
        let panel = pe_panel();
        let formula = formula_one("PE_ratio", Comparator::Lt, 30.0, 1, 1)
            .with_market_cap_gate(MarketCapGate {
                comparator: Comparator::Ge,
                threshold: 0.0,
            })
            .unwrap();
        let eligible = evaluate(&panel, &formula, Period(2014)).unwrap();
        assert!(eligible.is_empty());
    }

    #[test]
    fn evaluation_is_deterministic() {
        let panel = pe_panel();
        let formula = formula_one("PE_ratio", Comparator::Lt, 15.0, 2, 4);
        let a = evaluate(&panel, &formula, Period(2014)).unwrap();
        let b = evaluate(&panel, &formula, Period(2014)).unwrap();
        assert_eq!(a, b);
    }

    mod subset_property {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// Requiring the threshold to hold in all m periods never admits
            /// a company that a looser hold count rejects.
            #[test]
            fn full_hold_is_subset_of_partial_hold(
                values in proptest::collection::vec(0.0f64..30.0, 4),
                threshold in 5.0f64..25.0,
                hold in 1u32..4,
            ) {
                let mut panel = MemoryPanelAdapter::new();
                panel.add_company(company("X"));
                for (i, &v) in values.iter().enumerate() {
                    panel.add_ratio("X", "PE_ratio", Period(2011 + i as u32), v);
                }

                let strict = formula_one("PE_ratio", Comparator::Lt, threshold, 4, 4);
                let loose = formula_one("PE_ratio", Comparator::Lt, threshold, hold, 4);

                let strict_set = evaluate(&panel, &strict, Period(2014)).unwrap();
                let loose_set = evaluate(&panel, &loose, Period(2014)).unwrap();

                for c in &strict_set.companies {
                    prop_assert!(loose_set.companies.contains(c));
                }
            }
        }
    }
}
