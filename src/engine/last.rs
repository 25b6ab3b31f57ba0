// =============================================================================
// Last-Bar Updater: patch the newest, still-open record in place
// =============================================================================
//
// Input is the two newest stored records (prev, curr). Only curr changes:
//   diff       = close - open
//   tie point  : new market date  -> range restarts at curr.close
//                same market date -> max/min of prev range, curr range, close
//   ema[p]     = one recurrence step from prev.ema[p]; null stays null
//   signal     = one recurrence step from prev.macd_signal
// =============================================================================

use tracing::debug;

use super::IndicatorSettings;
use crate::error::ComputeError;
use crate::indicators::{direction_step, ema_step, midpoint, smoothing};
use crate::types::IndicatorRecord;

/// Recompute the newest of `records` (ascending) from the one before it.
pub fn update_last_bar(
    records: &[IndicatorRecord],
    settings: &IndicatorSettings,
) -> Result<IndicatorRecord, ComputeError> {
    let [.., prev, curr] = records else {
        return Err(ComputeError::NotEnoughRecords {
            found: records.len(),
        });
    };

    let mut updated = curr.clone();
    patch_last_bar(prev, &mut updated, settings);

    debug!(
        symbol = %updated.bar.symbol,
        period = updated.period_minutes,
        epoch = updated.bar.epoch,
        close = updated.bar.close,
        "last bar patched"
    );
    Ok(updated)
}

/// In-place form of [`update_last_bar`].
pub fn patch_last_bar(prev: &IndicatorRecord, curr: &mut IndicatorRecord, settings: &IndicatorSettings) {
    let close = curr.bar.close;
    curr.diff = close - curr.bar.open;

    if curr.bar.market_date != prev.bar.market_date {
        curr.market_date_high = close;
        curr.market_date_low = close;
        curr.tie_point = close;
    } else {
        curr.market_date_high = prev.market_date_high.max(curr.market_date_high).max(close);
        curr.market_date_low = prev.market_date_low.min(curr.market_date_low).min(close);
        curr.tie_point = midpoint(curr.market_date_high, curr.market_date_low);
    }

    for p in settings.tracked_periods() {
        let value = ema_step(Some(close), prev.ema_value(p), smoothing(p));
        curr.ema.insert(p, value);
    }

    let point = direction_step(
        curr.ema_value(settings.macd.fast),
        curr.ema_value(settings.macd.slow),
        prev.macd_signal,
        settings.macd.signal,
    );
    curr.macd_signal = point.macd_signal;
    curr.candle_direction = point.direction;
}
