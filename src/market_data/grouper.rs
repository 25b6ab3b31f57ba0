// =============================================================================
// Bar Grouper: bucket raw bars into fixed-length periods
// =============================================================================
//
// Buckets are floor-aligned: bucket_epoch = (epoch / period_secs) * period_secs.
// Within a bucket:
//   open   = first raw open       high  = max raw high
//   close  = last raw close       low   = min raw low
//   volume = sum of raw volumes
//   timestamp / market_date = first raw bar's
//
// The grouper is a lazy iterator over an ordered raw stream. A trailing bucket
// with fewer raw bars than the period holds is still emitted; callers decide
// whether a partial bucket is usable.
// =============================================================================

use std::iter::Peekable;

use crate::types::{Granularity, GroupedBar, RawBar};

/// Lazily groups an ascending raw-bar stream into period buckets.
pub struct BarGrouper<I: Iterator<Item = RawBar>> {
    raw: Peekable<I>,
    period_secs: i64,
}

/// Group `raw` bars of `native` granularity into `period_minutes` buckets.
///
/// When the period equals the native granularity every raw bar maps to one
/// grouped bar. An empty input yields an empty sequence.
pub fn group_bars<R>(raw: R, native: Granularity, period_minutes: u32) -> BarGrouper<R::IntoIter>
where
    R: IntoIterator<Item = RawBar>,
{
    BarGrouper {
        raw: raw.into_iter().peekable(),
        period_secs: bucket_secs(native, period_minutes),
    }
}

/// Bucket length in seconds. A period shorter than the native bar cannot
/// split it.
pub fn bucket_secs(native: Granularity, period_minutes: u32) -> i64 {
    i64::from(period_minutes.max(native.minutes())) * 60
}

/// Floor-aligned start of the bucket containing `epoch`.
#[inline]
pub fn bucket_start(epoch: i64, period_secs: i64) -> i64 {
    epoch.div_euclid(period_secs) * period_secs
}

impl<I: Iterator<Item = RawBar>> Iterator for BarGrouper<I> {
    type Item = GroupedBar;

    fn next(&mut self) -> Option<GroupedBar> {
        let period_secs = self.period_secs;
        let first = self.raw.next()?;
        let epoch = bucket_start(first.epoch(), period_secs);

        let mut bar = GroupedBar {
            symbol: first.symbol,
            timestamp: first.timestamp,
            epoch,
            open: first.open,
            high: first.high,
            low: first.low,
            close: first.close,
            volume: first.volume,
            market_date: first.market_date,
        };

        while let Some(next) = self
            .raw
            .next_if(|r| bucket_start(r.epoch(), period_secs) == epoch)
        {
            bar.high = bar.high.max(next.high);
            bar.low = bar.low.min(next.low);
            bar.close = next.close;
            bar.volume += next.volume;
        }

        Some(bar)
    }
}
