// =============================================================================
// Full Computer: every indicator for every bar from a cold start
// =============================================================================
//
// The first bar seeds each EMA with its own close and the signal EMA with its
// own macd value; the tie-point range starts from the first bar's high/low.
// Callers must pass a non-empty series (the orchestrator rejects empty
// histories before getting here); an empty input yields an empty output.
// =============================================================================

use tracing::debug;

use super::{compute_series, IndicatorSettings, SeriesSeed};
use crate::types::{GroupedBar, IndicatorRecord};

/// One record per input bar, in input order.
pub fn compute_full(
    bars: &[GroupedBar],
    period_minutes: u32,
    settings: &IndicatorSettings,
) -> Vec<IndicatorRecord> {
    let records = compute_series(bars, period_minutes, settings, SeriesSeed::ColdStart);
    debug!(
        symbol = bars.first().map(|b| b.symbol.as_str()).unwrap_or(""),
        period = period_minutes,
        records = records.len(),
        "full computation complete"
    );
    records
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fixtures::{hourly_bars, settings, PERIOD};
    use crate::types::CandleDirection;

    #[test]
    fn one_record_per_bar_in_order() {
        let bars = hourly_bars(20);
        let out = compute_full(&bars, PERIOD, &settings());
        assert_eq!(out.len(), bars.len());
        for (rec, bar) in out.iter().zip(&bars) {
            assert_eq!(&rec.bar, bar);
            assert_eq!(rec.period_minutes, PERIOD);
        }
        assert!(out.windows(2).all(|w| w[0].bar.epoch < w[1].bar.epoch));
    }

    #[test]
    fn diff_is_close_minus_open() {
        let bars = hourly_bars(5);
        let out = compute_full(&bars, PERIOD, &settings());
        for rec in &out {
            assert_eq!(rec.diff, rec.bar.close - rec.bar.open);
        }
    }

    #[test]
    fn tie_point_is_midpoint_of_range() {
        let out = compute_full(&hourly_bars(30), PERIOD, &settings());
        for rec in &out {
            assert_eq!(rec.tie_point, (rec.market_date_high + rec.market_date_low) / 2.0);
            assert!(rec.market_date_high >= rec.bar.high);
            assert!(rec.market_date_low <= rec.bar.low);
        }
        // Bar 6 opens a new market date, so its range is its own.
        assert_eq!(out[6].market_date_high, out[6].bar.high);
        assert_eq!(out[6].market_date_low, out[6].bar.low);
    }

    #[test]
    fn ema_seeds_from_first_close_and_never_null() {
        let bars = hourly_bars(10);
        let out = compute_full(&bars, PERIOD, &settings());
        for p in settings().tracked_periods() {
            assert_eq!(out[0].ema_value(p), Some(bars[0].close));
            assert!(out.iter().all(|r| r.ema_value(p).is_some()));
        }
    }

    #[test]
    fn ema_sanity_values() {
        let mut bars = hourly_bars(4);
        for (bar, close) in bars.iter_mut().zip([10.0, 20.0, 30.0, 40.0]) {
            bar.close = close;
        }
        let out = compute_full(&bars, PERIOD, &settings());
        let ema3: Vec<_> = out.iter().map(|r| r.ema_value(3)).collect();
        assert_eq!(ema3, vec![Some(10.0), Some(15.0), Some(22.5), Some(31.25)]);
    }

    #[test]
    fn tracks_configured_and_macd_periods() {
        let out = compute_full(&hourly_bars(3), PERIOD, &settings());
        let keys: Vec<u32> = out[0].ema.keys().copied().collect();
        assert_eq!(keys, vec![3, 5, 6]);
    }

    #[test]
    fn first_bar_direction_is_flat() {
        let out = compute_full(&hourly_bars(3), PERIOD, &settings());
        assert_eq!(out[0].candle_direction, CandleDirection::Flat);
        assert!(out[0].macd_signal.is_some());
    }

    #[test]
    fn steady_rally_points_up() {
        let mut bars = hourly_bars(12);
        for (i, bar) in bars.iter_mut().enumerate() {
            bar.close = 100.0 + i as f64 * i as f64;
        }
        let out = compute_full(&bars, PERIOD, &settings());
        assert_eq!(out[11].candle_direction, CandleDirection::Up);
    }
}
