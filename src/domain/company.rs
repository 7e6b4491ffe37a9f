//! Company reference entity.
//!
//! Companies are created at ingestion and never mutated by the engine.

use crate::domain::panel::Period;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: String,
    pub name: String,
    pub sector: String,
    pub listing_date: NaiveDate,
    pub delisted_date: Option<NaiveDate>,
}

impl Company {
    /// Whether the company was tradeable at any point during `period`.
    ///
    /// A company listed mid-period counts as listed; one delisted before the
    /// period starts does not.
    pub fn is_listed(&self, period: Period) -> bool {
        if self.listing_date > period.last_day() {
            return false;
        }
        match self.delisted_date {
            Some(delisted) => delisted >= period.first_day(),
            None => true,
        }
    }
}
