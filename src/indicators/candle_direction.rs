// =============================================================================
// Candle Direction: MACD-style directional bias
// =============================================================================
//
//   macd      = EMA_fast - EMA_slow
//   signal    = EMA_signal(macd), seeded like any other EMA
//   direction = sign(macd - signal)  in {-1, 0, +1}
//
// Direction is 0 whenever macd or signal is undefined.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::ema::{ema_series, ema_step, smoothing, EmaSeed};
use crate::types::CandleDirection;

/// Fast/slow/signal period lengths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MacdParams {
    pub fast: u32,
    pub slow: u32,
    pub signal: u32,
}

impl Default for MacdParams {
    fn default() -> Self {
        Self {
            fast: 12,
            slow: 26,
            signal: 9,
        }
    }
}

/// Signal value and direction for one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DirectionPoint {
    pub macd_signal: Option<f64>,
    pub direction: CandleDirection,
}

#[inline]
fn macd(fast: Option<f64>, slow: Option<f64>) -> Option<f64> {
    Some(fast? - slow?)
}

/// Direction from a macd value and its signal.
pub fn direction(macd: Option<f64>, signal: Option<f64>) -> CandleDirection {
    match (macd, signal) {
        (Some(m), Some(s)) => CandleDirection::from_sign(m - s),
        _ => CandleDirection::Flat,
    }
}

/// Direction series from per-bar fast and slow EMAs.
pub fn candle_directions(
    fast: &[Option<f64>],
    slow: &[Option<f64>],
    signal_period: u32,
    seed: EmaSeed,
) -> Vec<DirectionPoint> {
    let line: Vec<Option<f64>> = fast
        .iter()
        .zip(slow)
        .map(|(&f, &s)| macd(f, s))
        .collect();
    let signal = ema_series(&line, signal_period, seed);

    line.iter()
        .zip(signal)
        .map(|(&m, s)| DirectionPoint {
            macd_signal: s,
            direction: direction(m, s),
        })
        .collect()
}

/// Single-bar update against the previous bar's signal.
pub fn direction_step(
    fast: Option<f64>,
    slow: Option<f64>,
    prior_signal: Option<f64>,
    signal_period: u32,
) -> DirectionPoint {
    let m = macd(fast, slow);
    let s = ema_step(m, prior_signal, smoothing(signal_period));
    DirectionPoint {
        macd_signal: s,
        direction: direction(m, s),
    }
}
