//! In-memory panel adapter.
//!
//! Backs the CSV loader and the test suites. Data is inserted once at build
//! time; all `PanelPort` reads are immutable, so the adapter is `Sync` and
//! safe to share across search worker threads.

use crate::domain::company::Company;
use crate::domain::error::QuantscreenError;
use crate::domain::panel::{Period, PriceObservation, RatioObservation};
use crate::ports::panel_port::PanelPort;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Default, Clone)]
pub struct MemoryPanelAdapter {
    companies: BTreeMap<String, Company>,
    // (company, ratio) → period → value
    ratios: BTreeMap<(String, String), BTreeMap<Period, f64>>,
    // company → date → (close, dividend)
    prices: BTreeMap<String, BTreeMap<NaiveDate, (f64, f64)>>,
}

impl MemoryPanelAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_company(&mut self, company: Company) {
        self.companies.insert(company.id.clone(), company);
    }

    pub fn add_ratio(&mut self, company: &str, ratio: &str, period: Period, value: f64) {
        self.ratios
            .entry((company.to_string(), ratio.to_string()))
            .or_default()
            .insert(period, value);
    }

    pub fn add_price(&mut self, company: &str, date: NaiveDate, close: f64, dividend: f64) {
        self.prices
            .entry(company.to_string())
            .or_default()
            .insert(date, (close, dividend));
    }

    /// Remove a single ratio observation. Exists so tests can verify that
    /// future-dated edits never affect past evaluations.
    pub fn remove_ratio(&mut self, company: &str, ratio: &str, period: Period) {
        if let Some(series) = self
            .ratios
            .get_mut(&(company.to_string(), ratio.to_string()))
        {
            series.remove(&period);
        }
    }

    pub fn company_count(&self) -> usize {
        self.companies.len()
    }
}

impl PanelPort for MemoryPanelAdapter {
    fn ratio_history(
        &self,
        company: &str,
        ratio: &str,
        as_of: Period,
        window: u32,
    ) -> Result<Vec<RatioObservation>, QuantscreenError> {
        let Some(series) = self
            .ratios
            .get(&(company.to_string(), ratio.to_string()))
        else {
            return Ok(Vec::new());
        };

        let mut recent: Vec<RatioObservation> = series
            .range(..=as_of)
            .rev()
            .take(window as usize)
            .map(|(&period, &value)| RatioObservation { period, value })
            .collect();
        recent.reverse();
        Ok(recent)
    }

    fn price_series(
        &self,
        company: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, QuantscreenError> {
        let Some(series) = self.prices.get(company) else {
            return Ok(Vec::new());
        };

        Ok(series
            .range(start..=end)
            .map(|(&date, &(close, dividend))| PriceObservation {
                date,
                close,
                dividend,
            })
            .collect())
    }

    fn list_companies(&self, as_of: Period) -> Result<Vec<String>, QuantscreenError> {
        Ok(self
            .companies
            .values()
            .filter(|c| c.is_listed(as_of))
            .map(|c| c.id.clone())
            .collect())
    }

    fn get_company(&self, id: &str) -> Result<Option<Company>, QuantscreenError> {
        Ok(self.companies.get(id).cloned())
    }
}
