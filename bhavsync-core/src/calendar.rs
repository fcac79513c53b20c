//! Trading calendar and candidate date generation.
//!
//! The calendar is explicit: a set of closed weekdays (Saturday and Sunday by
//! default) plus a set of exchange holidays. Candidate dates are generated by
//! walking backward from a reference date across a bounded lookback window
//! and dropping every day the calendar marks as closed.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Upper bound on the lookback window, in calendar days.
pub const MAX_LOOKBACK_DAYS: u32 = 31;

/// Default lookback window, in calendar days.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 10;

/// A calendar date the fetcher will try, together with its weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TradeDateCandidate {
    pub date: NaiveDate,
    pub weekday: Weekday,
}

impl TradeDateCandidate {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            weekday: date.weekday(),
        }
    }
}

/// Which days the market is closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingCalendar {
    /// Weekdays on which the exchange never trades.
    #[serde(with = "weekday_list")]
    pub weekend: Vec<Weekday>,
    /// Additional closed dates (exchange holidays).
    pub holidays: BTreeSet<NaiveDate>,
}

impl Default for TradingCalendar {
    fn default() -> Self {
        Self {
            weekend: vec![Weekday::Sat, Weekday::Sun],
            holidays: BTreeSet::new(),
        }
    }
}

impl TradingCalendar {
    /// Calendar that only closes on Sunday.
    pub fn sunday_only() -> Self {
        Self {
            weekend: vec![Weekday::Sun],
            holidays: BTreeSet::new(),
        }
    }

    pub fn with_holidays(mut self, holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        self.holidays.extend(holidays);
        self
    }

    /// Whether the exchange is open on `date`.
    pub fn is_open(&self, date: NaiveDate) -> bool {
        !self.weekend.contains(&date.weekday()) && !self.holidays.contains(&date)
    }

    /// Open days in `[reference - (window - 1), reference]`, newest first.
    ///
    /// A window of zero yields no candidates.
    pub fn candidates(&self, reference: NaiveDate, window: u32) -> Vec<TradeDateCandidate> {
        (0..window as i64)
            .filter_map(|offset| reference.checked_sub_signed(Duration::days(offset)))
            .filter(|date| self.is_open(*date))
            .map(TradeDateCandidate::new)
            .collect()
    }
}

/// Where the candidate walk starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceDate {
    /// The caller's current date.
    #[default]
    Today,
    /// One day before the caller's current date.
    Yesterday,
    /// A specific date.
    On(NaiveDate),
}

impl ReferenceDate {
    /// Resolve to a concrete date given the caller's current date.
    pub fn resolve(self, today: NaiveDate) -> NaiveDate {
        match self {
            ReferenceDate::Today => today,
            ReferenceDate::Yesterday => today.pred_opt().unwrap_or(today),
            ReferenceDate::On(date) => date,
        }
    }
}

impl std::str::FromStr for ReferenceDate {
    type Err = String;

    /// Accepts `today`, `yesterday`, `latest` (same as today) or `YYYY-MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "today" | "latest" => Ok(ReferenceDate::Today),
            "yesterday" => Ok(ReferenceDate::Yesterday),
            other => NaiveDate::parse_from_str(other, "%Y-%m-%d")
                .map(ReferenceDate::On)
                .map_err(|e| format!("invalid date '{s}' (expected YYYY-MM-DD, today or yesterday): {e}")),
        }
    }
}

/// Serde adapter for weekday lists written as three-letter names (`"Sat"`).
mod weekday_list {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(days: &[Weekday], s: S) -> Result<S::Ok, S::Error> {
        let names: Vec<String> = days.iter().map(|d| d.to_string()).collect();
        s.collect_seq(names)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Weekday>, D::Error> {
        let names = Vec::<String>::deserialize(d)?;
        names
            .iter()
            .map(|n| {
                n.parse::<Weekday>()
                    .map_err(|_| serde::de::Error::custom(format!("unknown weekday '{n}'")))
            })
            .collect()
    }
}
