// =============================================================================
// Tie Points: running high/low/midpoint within the current market date
// =============================================================================
//
// A forward scan keeps the running max(high) and min(low) of the current
// market date. When the market date changes between consecutive bars the
// range restarts from the new bar. A new extreme is visible on the bar that
// sets it.
//
//   tie_point = (market_date_high + market_date_low) / 2
// =============================================================================

use chrono::NaiveDate;

use crate::types::{GroupedBar, IndicatorRecord};

/// Running range of one market date, as of some bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TiePointState {
    pub market_date: NaiveDate,
    pub high: f64,
    pub low: f64,
}

impl TiePointState {
    /// State carried by a stored record, used to seed incremental scans.
    pub fn from_record(record: &IndicatorRecord) -> Self {
        Self {
            market_date: record.bar.market_date,
            high: record.market_date_high,
            low: record.market_date_low,
        }
    }

    pub fn tie_point(&self) -> f64 {
        midpoint(self.high, self.low)
    }

    /// Fold one bar into the running range.
    fn advance(prev: Option<Self>, bar: &GroupedBar) -> Self {
        match prev {
            Some(state) if state.market_date == bar.market_date => Self {
                market_date: state.market_date,
                high: state.high.max(bar.high),
                low: state.low.min(bar.low),
            },
            _ => Self {
                market_date: bar.market_date,
                high: bar.high,
                low: bar.low,
            },
        }
    }
}

#[inline]
pub fn midpoint(high: f64, low: f64) -> f64 {
    (high + low) / 2.0
}

/// Running market-date range for each bar, continuing from `seed` if given.
pub fn tie_points(bars: &[GroupedBar], seed: Option<TiePointState>) -> Vec<TiePointState> {
    let mut state = seed;
    bars.iter()
        .map(|bar| {
            let next = TiePointState::advance(state, bar);
            state = Some(next);
            next
        })
        .collect()
}
