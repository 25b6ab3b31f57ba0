// =============================================================================
// Indicator Computation Engine
// =============================================================================
//
// Three ways to produce indicator records for one (symbol, period) series:
//   - full    : every bar from a cold start
//   - partial : only bars after the splice point, seeded from a stored record
//   - last    : patch the newest stored record in place
//
// Full and partial share one assembly routine that differs only in its seeds,
// which is what makes incremental output identical to a full recompute.
//
// Within one computation the independent families (diff, tie points, each EMA
// period) run concurrently on the rayon pool; candle direction runs after the
// EMAs it depends on. Output order always matches input order.
// =============================================================================

pub mod full;
pub mod last;
pub mod partial;

pub use full::compute_full;
pub use last::update_last_bar;
pub use partial::compute_partial;

use std::collections::BTreeMap;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::indicators::{
    candle_directions, diffs, ema_of_closes, tie_points, EmaSeed, MacdParams, TiePointState,
};
use crate::types::{GroupedBar, IndicatorRecord};

/// Which indicators to compute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorSettings {
    /// EMA period lengths reported to consumers.
    pub ema_periods: Vec<u32>,
    pub macd: MacdParams,
}

impl IndicatorSettings {
    /// Every EMA period stored on a record: the configured ones plus the
    /// candle-direction fast/slow lengths, ascending and unique.
    pub fn tracked_periods(&self) -> Vec<u32> {
        let mut periods = self.ema_periods.clone();
        periods.push(self.macd.fast);
        periods.push(self.macd.slow);
        periods.sort_unstable();
        periods.dedup();
        periods
    }
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self {
            ema_periods: vec![5, 20, 50, 200],
            macd: MacdParams::default(),
        }
    }
}

/// Starting state for every recurrence in a series computation.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SeriesSeed<'a> {
    ColdStart,
    /// Continue from the stored record immediately before the first bar.
    Record(&'a IndicatorRecord),
}

impl SeriesSeed<'_> {
    fn tie_point(&self) -> Option<TiePointState> {
        match self {
            Self::ColdStart => None,
            Self::Record(r) => Some(TiePointState::from_record(r)),
        }
    }

    fn ema(&self, period: u32) -> EmaSeed {
        match self {
            Self::ColdStart => EmaSeed::ColdStart,
            Self::Record(r) => EmaSeed::Prior(r.ema_value(period)),
        }
    }

    fn signal(&self) -> EmaSeed {
        match self {
            Self::ColdStart => EmaSeed::ColdStart,
            Self::Record(r) => EmaSeed::Prior(r.macd_signal),
        }
    }
}

/// Compute records for `bars`, continuing from `seed`.
pub(crate) fn compute_series(
    bars: &[GroupedBar],
    period_minutes: u32,
    settings: &IndicatorSettings,
    seed: SeriesSeed<'_>,
) -> Vec<IndicatorRecord> {
    if bars.is_empty() {
        return Vec::new();
    }

    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let tracked = settings.tracked_periods();

    let ((diff, ties), emas) = rayon::join(
        || rayon::join(|| diffs(bars), || tie_points(bars, seed.tie_point())),
        || {
            tracked
                .par_iter()
                .map(|&p| (p, ema_of_closes(&closes, p, seed.ema(p))))
                .collect::<BTreeMap<u32, Vec<Option<f64>>>>()
        },
    );

    let nulls = vec![None; bars.len()];
    let fast = emas.get(&settings.macd.fast).unwrap_or(&nulls);
    let slow = emas.get(&settings.macd.slow).unwrap_or(&nulls);
    let directions = candle_directions(fast, slow, settings.macd.signal, seed.signal());

    bars.iter()
        .enumerate()
        .map(|(i, bar)| IndicatorRecord {
            period_minutes,
            bar: bar.clone(),
            diff: diff[i],
            market_date_high: ties[i].high,
            market_date_low: ties[i].low,
            tie_point: ties[i].tie_point(),
            ema: emas.iter().map(|(&p, series)| (p, series[i])).collect(),
            macd_signal: directions[i].macd_signal,
            candle_direction: directions[i].direction,
        })
        .collect()
}
