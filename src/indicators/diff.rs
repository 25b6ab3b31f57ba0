// =============================================================================
// Diff: close minus open
// =============================================================================
//
// The only family with no state across bars, so it needs no seed.

use crate::types::GroupedBar;

pub fn diffs(bars: &[GroupedBar]) -> Vec<f64> {
    bars.iter().map(GroupedBar::diff).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn diff_is_signed() {
        let bar = |open: f64, close: f64| GroupedBar {
            symbol: "ES".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 14, 30, 0).unwrap(),
            epoch: 0,
            open,
            high: open.max(close),
            low: open.min(close),
            close,
            volume: 0.0,
            market_date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        };
        assert_eq!(diffs(&[bar(10.0, 12.5), bar(12.5, 11.0)]), vec![2.5, -1.5]);
        assert!(diffs(&[]).is_empty());
    }
}
