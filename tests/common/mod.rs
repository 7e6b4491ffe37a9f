//! Shared test fixtures: a deterministic five-company panel.
#![allow(dead_code)]

use chrono::NaiveDate;
use quantscreen::adapters::memory_adapter::MemoryPanelAdapter;
use quantscreen::domain::company::Company;
use quantscreen::domain::formula::{Comparator, Condition, Formula};
use quantscreen::domain::panel::Period;
use quantscreen::domain::simulator::BacktestConfig;
use quantscreen::domain::weighting::RankBy;
use std::collections::BTreeMap;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn company(id: &str, listing_year: i32) -> Company {
    Company {
        id: id.to_string(),
        name: format!("{id} Ltd"),
        sector: "Test".to_string(),
        listing_date: date(listing_year, 1, 1),
        delisted_date: None,
    }
}

/// PE filter: below `threshold` in at least `hold` of the last `window`
/// periods.
pub fn pe_formula(threshold: f64, hold: u32, window: u32) -> Formula {
    let mut filters = BTreeMap::new();
    filters.insert(
        "PE_ratio".to_string(),
        Condition::new(Comparator::Lt, threshold, hold, window).unwrap(),
    );
    Formula::new("pe screen", filters).unwrap()
}

/// Rows of the example panel: (id, listing year, PE by period 2000..=2006,
/// yearly price growth factor).
pub fn panel_rows() -> Vec<(&'static str, i32, Vec<f64>, f64)> {
    vec![
        // Always cheap.
        ("ABLE", 1999, vec![10.0; 7], 1.08),
        // Cheap early, expensive later.
        (
            "BAKE",
            1999,
            vec![10.0, 10.0, 10.0, 20.0, 20.0, 20.0, 20.0],
            1.04,
        ),
        // Expensive early, cheap later.
        (
            "CHAR",
            1999,
            vec![20.0, 20.0, 20.0, 10.0, 10.0, 10.0, 10.0],
            1.12,
        ),
        // Alternating: never 3 of 4.
        (
            "DELT",
            1999,
            vec![10.0, 20.0, 10.0, 20.0, 10.0, 20.0, 10.0],
            1.00,
        ),
        // Always cheap but listed 2002: short history fails closed early on.
        ("ECHO", 2002, vec![10.0; 7], 1.06),
    ]
}

/// Five companies with PE ratios over 2000-2006 and prices over 2001-2007.
/// Built so eligibility under `pe_formula(15, 3, 4)` shifts across rebalance
/// dates, and every company's price path is non-negative year over year.
pub fn example_panel() -> MemoryPanelAdapter {
    let mut panel = MemoryPanelAdapter::new();
    for (id, listing_year, pe_series, growth) in panel_rows() {
        panel.add_company(company(id, listing_year));
        for (i, &pe) in pe_series.iter().enumerate() {
            let period = 2000 + i as u32;
            // ECHO's pre-listing observations simply don't exist.
            if (period as i32) >= listing_year {
                panel.add_ratio(id, "PE_ratio", Period(period), pe);
            }
        }
        let mut price: f64 = 100.0;
        for year in 2001..=2007 {
            panel.add_price(id, date(year, 1, 2), price, 0.0);
            price *= growth;
            panel.add_price(id, date(year, 12, 30), price, 0.0);
        }
    }
    panel
}

pub fn equal_weight_config(start: u32, end: u32) -> BacktestConfig {
    let mut config = BacktestConfig::new(Period(start), Period(end));
    config.rank_by = RankBy::Unranked;
    config
}

pub fn held_companies(
    snapshot: &quantscreen::domain::trajectory::PortfolioSnapshot,
) -> Vec<&str> {
    snapshot
        .holdings
        .iter()
        .map(|h| h.company.as_str())
        .collect()
}
