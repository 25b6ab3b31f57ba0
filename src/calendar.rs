// =============================================================================
// Market Calendar: business-date assignment per instrument category
// =============================================================================
//
// A bar's market date is not the calendar date of its timestamp. Each
// instrument category has a session cutoff in exchange-local time: bars at or
// after the cutoff belong to the next business date. Categories that close on
// weekends roll Saturday/Sunday forward to Monday.
//
//   local       = ts + utc_offset
//   date        = local.date() (+1 day when local.time() >= cutoff)
//   market_date = next weekday of `date` when skip_weekends
// =============================================================================

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

/// Instrument category, which selects the market calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentCategory {
    Equity,
    Futures,
    Forex,
    Crypto,
}

impl Default for InstrumentCategory {
    fn default() -> Self {
        Self::Equity
    }
}

impl std::fmt::Display for InstrumentCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Equity => write!(f, "Equity"),
            Self::Futures => write!(f, "Futures"),
            Self::Forex => write!(f, "Forex"),
            Self::Crypto => write!(f, "Crypto"),
        }
    }
}

/// Cutoff rule for one instrument category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketCalendar {
    /// Exchange-local offset from UTC in minutes (e.g. -300 for UTC-5).
    pub utc_offset_minutes: i32,
    /// Local session cutoff. `None` means the session ends at midnight.
    pub cutoff: Option<NaiveTime>,
    pub skip_weekends: bool,
}

impl MarketCalendar {
    /// Default calendar for `category`.
    pub fn for_category(category: InstrumentCategory) -> Self {
        let evening = NaiveTime::from_hms_opt(17, 0, 0);
        match category {
            InstrumentCategory::Futures | InstrumentCategory::Forex => Self {
                utc_offset_minutes: -300,
                cutoff: evening,
                skip_weekends: true,
            },
            InstrumentCategory::Equity => Self {
                utc_offset_minutes: -300,
                cutoff: None,
                skip_weekends: true,
            },
            InstrumentCategory::Crypto => Self {
                utc_offset_minutes: 0,
                cutoff: None,
                skip_weekends: false,
            },
        }
    }

    /// Business date that `ts` belongs to.
    pub fn market_date(&self, ts: DateTime<Utc>) -> NaiveDate {
        let local = ts.naive_utc() + Duration::minutes(i64::from(self.utc_offset_minutes));

        let mut date = local.date();
        if let Some(cutoff) = self.cutoff {
            if local.time() >= cutoff {
                date = date.succ_opt().unwrap_or(date);
            }
        }

        if self.skip_weekends {
            date = match date.weekday() {
                Weekday::Sat => date + Duration::days(2),
                Weekday::Sun => date + Duration::days(1),
                _ => date,
            };
        }

        date
    }
}

impl Default for MarketCalendar {
    fn default() -> Self {
        Self::for_category(InstrumentCategory::default())
    }
}
