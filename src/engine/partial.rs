// =============================================================================
// Partial Computer: extend stored indicators with newly available bars
// =============================================================================
//
// 1. Trim   : keep grouped bars with timestamp >= the earliest stored record.
//             Fewer than two left -> InsufficientHistory.
// 2. Anchor : scanning backward, find the grouped bar whose timestamp equals
//             the last stored record's. None -> AnchorNotFound.
// 3. Match  : walk backward from the anchor, pairing bars[anchor - j] with
//             stored[len - 1 - j], until a pair agrees exactly on
//             (close, high, low, timestamp, open). None -> NoMatchingPoint.
//             Pairs that disagree are bars the upstream has revised since
//             they were stored; they are recomputed.
// 4. Slice  : bars after the matched bar are new; the matched stored record
//             seeds every recurrence.
//
// Given a correct splice point, the output equals what a full recompute would
// produce for the same bars.
// =============================================================================

use tracing::debug;

use super::{compute_series, IndicatorSettings, SeriesSeed};
use crate::error::ComputeError;
use crate::types::{GroupedBar, IndicatorRecord};

/// Splice point between a grouped-bar series and stored records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchIndex {
    /// Position in the grouped bars of the first bar to compute.
    pub first_new_bar: usize,
    /// Position in the stored records of the seed record.
    pub seed_record: usize,
}

#[inline]
fn same_prices(bar: &GroupedBar, record: &IndicatorRecord) -> bool {
    let stored = &record.bar;
    bar.close == stored.close
        && bar.high == stored.high
        && bar.low == stored.low
        && bar.timestamp == stored.timestamp
        && bar.open == stored.open
}

/// Locate the splice point. `bars` and `stored` are ascending.
pub fn find_match_index(
    bars: &[GroupedBar],
    stored: &[IndicatorRecord],
) -> Result<MatchIndex, ComputeError> {
    let last = stored.last().ok_or(ComputeError::NoStoredRecords)?;

    let anchor = bars
        .iter()
        .rposition(|b| b.timestamp == last.bar.timestamp)
        .ok_or(ComputeError::AnchorNotFound {
            timestamp: last.bar.timestamp,
        })?;

    let depth = (anchor + 1).min(stored.len());
    for j in 0..depth {
        let bar_idx = anchor - j;
        let record_idx = stored.len() - 1 - j;
        if same_prices(&bars[bar_idx], &stored[record_idx]) {
            return Ok(MatchIndex {
                first_new_bar: bar_idx + 1,
                seed_record: record_idx,
            });
        }
    }

    Err(ComputeError::NoMatchingPoint { compared: depth })
}

/// Records for the bars after the splice point only, ascending.
///
/// The result may be empty when stored history is already up to date.
pub fn compute_partial(
    bars: &[GroupedBar],
    stored: &[IndicatorRecord],
    period_minutes: u32,
    settings: &IndicatorSettings,
) -> Result<Vec<IndicatorRecord>, ComputeError> {
    let earliest = stored
        .iter()
        .map(|r| r.bar.timestamp)
        .min()
        .ok_or(ComputeError::NoStoredRecords)?;

    let start = bars.partition_point(|b| b.timestamp < earliest);
    let trimmed = &bars[start..];
    if trimmed.len() < 2 {
        return Err(ComputeError::InsufficientHistory {
            available: trimmed.len(),
        });
    }

    let m = find_match_index(trimmed, stored)?;
    let seed = &stored[m.seed_record];
    let new_bars = &trimmed[m.first_new_bar..];

    debug!(
        symbol = %seed.bar.symbol,
        period = period_minutes,
        seed_epoch = seed.bar.epoch,
        new_bars = new_bars.len(),
        "splice point located"
    );

    Ok(compute_series(
        new_bars,
        period_minutes,
        settings,
        SeriesSeed::Record(seed),
    ))
}
