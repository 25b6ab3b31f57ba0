// =============================================================================
// Shared types used across the indicator engine
// =============================================================================
//
// Bars flow through the engine in two shapes: `RawBar` as delivered by the
// upstream source, and `GroupedBar` after bucketing to a period. Indicator
// output is persisted as `IndicatorRecord`, keyed by (symbol, period, epoch).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Minutes in one native daily bar.
pub const MINUTES_PER_DAY: u32 = 1440;

/// Native granularity of the raw bars the upstream source delivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Granularity {
    Minute,
    Daily,
}

impl Granularity {
    /// Length of one native bar in minutes.
    pub fn minutes(self) -> u32 {
        match self {
            Self::Minute => 1,
            Self::Daily => MINUTES_PER_DAY,
        }
    }

    /// Native source that a period of `period_minutes` is built from.
    ///
    /// Whole-day multiples read daily bars; everything else reads minute bars.
    pub fn for_period(period_minutes: u32) -> Self {
        if period_minutes >= MINUTES_PER_DAY && period_minutes % MINUTES_PER_DAY == 0 {
            Self::Daily
        } else {
            Self::Minute
        }
    }

    /// Number of native bars that make up one bucket of `period_minutes`.
    pub fn bars_per_bucket(self, period_minutes: u32) -> usize {
        (period_minutes / self.minutes()).max(1) as usize
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Minute => write!(f, "minute"),
            Self::Daily => write!(f, "daily"),
        }
    }
}

// ---------------------------------------------------------------------------
// Bars
// ---------------------------------------------------------------------------

/// A single bar as delivered by the upstream source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    /// Business-calendar date assigned by the instrument's market calendar.
    pub market_date: NaiveDate,
}

impl RawBar {
    /// Seconds since the Unix epoch.
    pub fn epoch(&self) -> i64 {
        self.timestamp.timestamp()
    }
}

/// One OHLCV bar after bucketing raw bars to a period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedBar {
    pub symbol: String,
    /// Timestamp of the first raw bar in the bucket.
    pub timestamp: DateTime<Utc>,
    /// Bucket start in seconds, floor-aligned to the period length.
    pub epoch: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub market_date: NaiveDate,
}

impl GroupedBar {
    pub fn diff(&self) -> f64 {
        self.close - self.open
    }
}

// ---------------------------------------------------------------------------
// Keys
// ---------------------------------------------------------------------------

/// Identifies one indicator series: a symbol at one aggregation period.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct SeriesKey {
    pub symbol: String,
    pub period_minutes: u32,
}

impl SeriesKey {
    pub fn new(symbol: impl Into<String>, period_minutes: u32) -> Self {
        Self {
            symbol: symbol.into(),
            period_minutes,
        }
    }

    pub fn granularity(&self) -> Granularity {
        Granularity::for_period(self.period_minutes)
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}m", self.symbol, self.period_minutes)
    }
}

/// Unique key of a persisted indicator record.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct RecordKey {
    pub series: SeriesKey,
    pub epoch: i64,
}

// ---------------------------------------------------------------------------
// Indicator output
// ---------------------------------------------------------------------------

/// Sign of (fast EMA - slow EMA - signal).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i8", try_from = "i8")]
pub enum CandleDirection {
    Down,
    Flat,
    Up,
}

impl CandleDirection {
    /// `Flat` for zero or non-finite values.
    pub fn from_sign(value: f64) -> Self {
        if value > 0.0 {
            Self::Up
        } else if value < 0.0 {
            Self::Down
        } else {
            Self::Flat
        }
    }
}

impl From<CandleDirection> for i8 {
    fn from(d: CandleDirection) -> i8 {
        match d {
            CandleDirection::Down => -1,
            CandleDirection::Flat => 0,
            CandleDirection::Up => 1,
        }
    }
}

impl TryFrom<i8> for CandleDirection {
    type Error = String;

    fn try_from(v: i8) -> Result<Self, Self::Error> {
        match v {
            -1 => Ok(Self::Down),
            0 => Ok(Self::Flat),
            1 => Ok(Self::Up),
            other => Err(format!("candle direction must be -1, 0 or 1, got {other}")),
        }
    }
}

/// A grouped bar plus every indicator derived for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorRecord {
    pub period_minutes: u32,
    #[serde(flatten)]
    pub bar: GroupedBar,
    pub diff: f64,
    pub market_date_high: f64,
    pub market_date_low: f64,
    pub tie_point: f64,
    /// EMA period length -> value. `None` until enough history exists.
    pub ema: BTreeMap<u32, Option<f64>>,
    pub macd_signal: Option<f64>,
    pub candle_direction: CandleDirection,
}

impl IndicatorRecord {
    pub fn series_key(&self) -> SeriesKey {
        SeriesKey::new(self.bar.symbol.clone(), self.period_minutes)
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            series: self.series_key(),
            epoch: self.bar.epoch,
        }
    }

    /// EMA for `period`, flattening "not tracked" and "not yet computable".
    pub fn ema_value(&self, period: u32) -> Option<f64> {
        self.ema.get(&period).copied().flatten()
    }

    /// Assign a new close and widen high/low so that
    /// `high >= close >= low` keeps holding.
    pub fn apply_close(&mut self, close: f64) {
        self.bar.close = close;
        if close > self.bar.high {
            self.bar.high = close;
        }
        if close < self.bar.low {
            self.bar.low = close;
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_record(close: f64) -> IndicatorRecord {
        let ts = Utc.with_ymd_and_hms(2024, 3, 4, 14, 30, 0).unwrap();
        IndicatorRecord {
            period_minutes: 5,
            bar: GroupedBar {
                symbol: "ES".into(),
                timestamp: ts,
                epoch: ts.timestamp(),
                open: close,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 10.0,
                market_date: NaiveDate::from_ymd_opt(2024, 3, 4).unwrap(),
            },
            diff: 0.0,
            market_date_high: close + 1.0,
            market_date_low: close - 1.0,
            tie_point: close,
            ema: BTreeMap::from([(5, Some(close)), (20, None)]),
            macd_signal: None,
            candle_direction: CandleDirection::Flat,
        }
    }

    #[test]
    fn granularity_for_period() {
        assert_eq!(Granularity::for_period(1), Granularity::Minute);
        assert_eq!(Granularity::for_period(60), Granularity::Minute);
        assert_eq!(Granularity::for_period(1440), Granularity::Daily);
        assert_eq!(Granularity::for_period(2880), Granularity::Daily);
        assert_eq!(Granularity::for_period(2000), Granularity::Minute);
        assert_eq!(Granularity::Minute.bars_per_bucket(15), 15);
        assert_eq!(Granularity::Daily.bars_per_bucket(1440), 1);
    }

    #[test]
    fn apply_close_widens_high() {
        let mut r = sample_record(100.0);
        r.apply_close(105.0);
        assert_eq!(r.bar.close, 105.0);
        assert_eq!(r.bar.high, 105.0);
        assert_eq!(r.bar.low, 99.0);
    }

    #[test]
    fn apply_close_widens_low() {
        let mut r = sample_record(100.0);
        r.apply_close(90.0);
        assert_eq!(r.bar.low, 90.0);
        assert_eq!(r.bar.high, 101.0);
    }

    #[test]
    fn apply_close_inside_range_keeps_extremes() {
        let mut r = sample_record(100.0);
        r.apply_close(100.5);
        assert_eq!(r.bar.high, 101.0);
        assert_eq!(r.bar.low, 99.0);
    }

    #[test]
    fn ema_value_flattens_missing_and_null() {
        let r = sample_record(100.0);
        assert_eq!(r.ema_value(5), Some(100.0));
        assert_eq!(r.ema_value(20), None);
        assert_eq!(r.ema_value(200), None);
    }

    #[test]
    fn candle_direction_serialises_as_integer() {
        assert_eq!(serde_json::to_string(&CandleDirection::Down).unwrap(), "-1");
        let d: CandleDirection = serde_json::from_str("1").unwrap();
        assert_eq!(d, CandleDirection::Up);
        assert!(serde_json::from_str::<CandleDirection>("2").is_err());
    }

    #[test]
    fn record_json_keeps_null_ema() {
        let r = sample_record(100.0);
        let json = serde_json::to_string(&r).unwrap();
        let back: IndicatorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
        assert_eq!(back.ema.get(&20), Some(&None));
    }

    #[test]
    fn series_key_display() {
        assert_eq!(SeriesKey::new("ES", 15).to_string(), "ES@15m");
    }
}
