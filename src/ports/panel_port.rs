//! Panel store access port trait.
//!
//! The panel is point-in-time queryable and append-only for the duration of a
//! run: every method takes an as-of bound and must never surface data dated
//! after it. Implementations are read-only and `Sync` so candidate backtests
//! can fan out across threads without locking.

use crate::domain::company::Company;
use crate::domain::error::QuantscreenError;
use crate::domain::panel::{Period, PriceObservation, RatioObservation};
use chrono::NaiveDate;

pub trait PanelPort: Sync {
    /// The most recent `window` observations of `ratio` for `company` with
    /// period ≤ `as_of`, ascending by period. Fewer than `window` rows means
    /// the company's history is short; callers decide what that implies.
    fn ratio_history(
        &self,
        company: &str,
        ratio: &str,
        as_of: Period,
        window: u32,
    ) -> Result<Vec<RatioObservation>, QuantscreenError>;

    /// Daily closes and dividends in `[start, end]`, ascending by date.
    fn price_series(
        &self,
        company: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<PriceObservation>, QuantscreenError>;

    /// Ids of companies listed during `as_of`, sorted ascending. Respects
    /// listing and delisting dates.
    fn list_companies(&self, as_of: Period) -> Result<Vec<String>, QuantscreenError>;

    fn get_company(&self, id: &str) -> Result<Option<Company>, QuantscreenError>;

    /// The single most recent observation of `ratio` at or before `as_of`.
    fn latest_ratio(
        &self,
        company: &str,
        ratio: &str,
        as_of: Period,
    ) -> Result<Option<RatioObservation>, QuantscreenError> {
        Ok(self.ratio_history(company, ratio, as_of, 1)?.pop())
    }
}
