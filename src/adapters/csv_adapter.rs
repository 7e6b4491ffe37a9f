//! CSV panel adapter.
//!
//! Loads a panel directory of three files (`companies.csv`, `ratios.csv`,
//! `prices.csv`) into memory once, then serves reads through the in-memory
//! adapter. Column layouts:
//!
//! ```text
//! companies.csv: id,name,sector,listing_date,delisted_date
//! ratios.csv:    company_id,ratio,period,value
//! prices.csv:    company_id,date,close,dividend
//! ```

use crate::adapters::memory_adapter::MemoryPanelAdapter;
use crate::domain::company::Company;
use crate::domain::error::QuantscreenError;
use crate::domain::panel::{Period, PriceObservation, RatioObservation};
use crate::ports::panel_port::PanelPort;
use chrono::NaiveDate;
use std::path::{Path, PathBuf};

pub struct CsvPanelAdapter {
    panel: MemoryPanelAdapter,
}

impl CsvPanelAdapter {
    pub fn from_dir<P: AsRef<Path>>(base_path: P) -> Result<Self, QuantscreenError> {
        let base = base_path.as_ref();
        let mut panel = MemoryPanelAdapter::new();

        load_companies(&base.join("companies.csv"), &mut panel)?;
        load_ratios(&base.join("ratios.csv"), &mut panel)?;
        load_prices(&base.join("prices.csv"), &mut panel)?;

        Ok(Self { panel })
    }

    pub fn company_count(&self) -> usize {
        self.panel.company_count()
    }
}

impl PanelPort for CsvPanelAdapter {
    fn ratio_history(
        &self,
        company: &str,
        ratio: &str,
        as_of: Period,
        window: u32,
    ) -> Result<Vec<RatioObservation>, QuantscreenError> {
        self.panel.ratio_history(company, ratio, as_of, window)
    }

    fn price_series(
        &self,
        company: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, QuantscreenError> {
        self.panel.price_series(company, start, end)
    }

    fn list_companies(&self, as_of: Period) -> Result<Vec<String>, QuantscreenError> {
        self.panel.list_companies(as_of)
    }

    fn get_company(&self, id: &str) -> Result<Option<Company>, QuantscreenError> {
        self.panel.get_company(id)
    }
}

fn reader(path: &PathBuf) -> Result<csv::Reader<std::fs::File>, QuantscreenError> {
    csv::Reader::from_path(path).map_err(|e| QuantscreenError::Database {
        reason: format!("failed to open {}: {}", path.display(), e),
    })
}

fn field<'r>(
    record: &'r csv::StringRecord,
    index: usize,
    name: &str,
    path: &PathBuf,
) -> Result<&'r str, QuantscreenError> {
    record.get(index).ok_or_else(|| QuantscreenError::Database {
        reason: format!("{}: missing {} column", path.display(), name),
    })
}

fn parse_date(value: &str, path: &PathBuf) -> Result<NaiveDate, QuantscreenError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|e| QuantscreenError::Database {
        reason: format!("{}: invalid date '{}': {}", path.display(), value, e),
    })
}

fn parse_f64(value: &str, name: &str, path: &PathBuf) -> Result<f64, QuantscreenError> {
    value.parse().map_err(|e| QuantscreenError::Database {
        reason: format!("{}: invalid {} '{}': {}", path.display(), name, value, e),
    })
}

fn load_companies(
    path: &PathBuf,
    panel: &mut MemoryPanelAdapter,
) -> Result<(), QuantscreenError> {
    let mut rdr = reader(path)?;
    for result in rdr.records() {
        let record = result.map_err(|e| QuantscreenError::Database {
            reason: format!("{}: CSV parse error: {}", path.display(), e),
        })?;

        let id = field(&record, 0, "id", path)?.to_string();
        let name = field(&record, 1, "name", path)?.to_string();
        let sector = field(&record, 2, "sector", path)?.to_string();
        let listing_date = parse_date(field(&record, 3, "listing_date", path)?, path)?;
        let delisted_date = match record.get(4) {
            Some(s) if !s.trim().is_empty() => Some(parse_date(s, path)?),
            _ => None,
        };

        panel.add_company(Company {
            id,
            name,
            sector,
            listing_date,
            delisted_date,
        });
    }
    Ok(())
}

fn load_ratios(path: &PathBuf, panel: &mut MemoryPanelAdapter) -> Result<(), QuantscreenError> {
    let mut rdr = reader(path)?;
    for result in rdr.records() {
        let record = result.map_err(|e| QuantscreenError::Database {
            reason: format!("{}: CSV parse error: {}", path.display(), e),
        })?;

        let company = field(&record, 0, "company_id", path)?.to_string();
        let ratio = field(&record, 1, "ratio", path)?.to_string();
        let period: u32 = field(&record, 2, "period", path)?.parse().map_err(|e| {
            QuantscreenError::Database {
                reason: format!("{}: invalid period: {}", path.display(), e),
            }
        })?;
        let value = parse_f64(field(&record, 3, "value", path)?, "value", path)?;

        panel.add_ratio(&company, &ratio, Period(period), value);
    }
    Ok(())
}

fn load_prices(path: &PathBuf, panel: &mut MemoryPanelAdapter) -> Result<(), QuantscreenError> {
    let mut rdr = reader(path)?;
    for result in rdr.records() {
        let record = result.map_err(|e| QuantscreenError::Database {
            reason: format!("{}: CSV parse error: {}", path.display(), e),
        })?;

        let company = field(&record, 0, "company_id", path)?.to_string();
        let date = parse_date(field(&record, 1, "date", path)?, path)?;
        let close = parse_f64(field(&record, 2, "close", path)?, "close", path)?;
        let dividend = match record.get(3) {
            Some(s) if !s.trim().is_empty() => parse_f64(s, "dividend", path)?,
            _ => 0.0,
        };

        panel.add_price(&company, date, close, dividend);
    }
    Ok(())
}
