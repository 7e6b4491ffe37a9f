//! Point-in-time panel primitives: periods and observations.
//!
//! A [`Period`] is a discrete fiscal year. Ratios live on the period grid;
//! prices live on a denser daily grid and are sliced by the calendar range of
//! a period when the simulator needs holding-window returns.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Discrete, totally ordered fiscal period (calendar year).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Period(pub u32);

impl Period {
    pub fn next(self) -> Period {
        Period(self.0 + 1)
    }

    /// The completed period immediately before this one.
    pub fn prev(self) -> Period {
        Period(self.0.saturating_sub(1))
    }

    pub fn offset(self, periods: u32) -> Period {
        Period(self.0 + periods)
    }

    /// First calendar day covered by this period.
    pub fn first_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0 as i32, 1, 1).unwrap_or(NaiveDate::MAX)
    }

    /// Last calendar day covered by this period.
    pub fn last_day(self) -> NaiveDate {
        NaiveDate::from_ymd_opt(self.0 as i32, 12, 31).unwrap_or(NaiveDate::MAX)
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One ratio value for one (company, ratio, period) key.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioObservation {
    pub period: Period,
    pub value: f64,
}

/// One close price plus any dividend that went ex on that date.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub date: NaiveDate,
    pub close: f64,
    pub dividend: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_ordering() {
        assert!(Period(2019) < Period(2020));
        assert_eq!(Period(2020).next(), Period(2021));
        assert_eq!(Period(2020).prev(), Period(2019));
        assert_eq!(Period(2020).offset(3), Period(2023));
    }

    #[test]
    fn period_prev_saturates_at_zero() {
        assert_eq!(Period(0).prev(), Period(0));
    }

    #[test]
    fn period_calendar_bounds() {
        let p = Period(2020);
        assert_eq!(p.first_day(), NaiveDate::from_ymd_opt(2020, 1, 1).unwrap());
        assert_eq!(p.last_day(), NaiveDate::from_ymd_opt(2020, 12, 31).unwrap());
    }

    #[test]
    fn period_serde_is_transparent() {
        let json = serde_json::to_string(&Period(2015)).unwrap();
        assert_eq!(json, "2015");
        let back: Period = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Period(2015));
    }

    #[test]
    fn period_display() {
        assert_eq!(Period(1999).to_string(), "1999");
    }
}
