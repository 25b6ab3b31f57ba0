// =============================================================================
// Orchestrator: fan computation out across (symbol, period) pairs
// =============================================================================
//
// Every entry point runs its pairs concurrently and joins them all:
//
//   compute_all     : full history -> Full Computer -> one atomic replace
//   compute_partial : last N bars + last N records -> Partial Computer -> upsert
//                     (levels recalculated alongside, joined at the end)
//   compute_last    : two newest records (+ newest raw bar) -> Last-Bar Updater
//                     -> upsert
//
// A pair that cannot be computed (ComputeError) is reported and its siblings
// carry on. Source/store failures and cancellation end the whole request.
// Cancellation is observed at every fetch and store call, never inside a
// recurrence.
// =============================================================================

use std::future::Future;
use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::engine::{compute_full, compute_partial, update_last_bar, IndicatorSettings};
use crate::error::{ComputeError, EngineError, FailureKind};
use crate::levels::LevelCalculator;
use crate::market_data::{bucket_secs, bucket_start, group_bars, BarSource};
use crate::storage::IndicatorStore;
use crate::types::{GroupedBar, IndicatorRecord, SeriesKey};

type PairResult = Result<Vec<IndicatorRecord>, ComputeError>;

// =============================================================================
// Reports
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct PairSuccess {
    pub symbol: String,
    pub period_minutes: u32,
    pub records_written: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PairFailure {
    pub symbol: String,
    pub period_minutes: u32,
    pub kind: FailureKind,
    pub reason: String,
}

/// Per-pair outcome of one orchestrator call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CalcReport {
    pub succeeded: Vec<PairSuccess>,
    pub failed: Vec<PairFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels_error: Option<String>,
}

impl CalcReport {
    /// True when at least one pair was requested and none succeeded.
    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }

    fn success(&mut self, key: &SeriesKey, records_written: usize) {
        self.succeeded.push(PairSuccess {
            symbol: key.symbol.clone(),
            period_minutes: key.period_minutes,
            records_written,
        });
    }

    fn failure(&mut self, key: &SeriesKey, err: &ComputeError) {
        warn!(series = %key, kind = ?err.kind(), reason = %err, "pair failed");
        self.failed.push(PairFailure {
            symbol: key.symbol.clone(),
            period_minutes: key.period_minutes,
            kind: err.kind(),
            reason: err.to_string(),
        });
    }
}

// =============================================================================
// Helpers
// =============================================================================

/// Await a collaborator call unless `cancel` fires first.
async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(EngineError::Cancelled),
        res = fut => res.map_err(|e| {
            let reason = format!("{e:#}");
            error!(error = %reason, "storage call failed");
            EngineError::Storage(e)
        }),
    }
}

/// Fail the request on the first fatal pair error.
fn settle(
    outcomes: Vec<(SeriesKey, Result<PairResult, EngineError>)>,
) -> Result<Vec<(SeriesKey, PairResult)>, EngineError> {
    outcomes
        .into_iter()
        .map(|(key, outcome)| outcome.map(|r| (key, r)))
        .collect()
}

// =============================================================================
// Orchestrator
// =============================================================================

pub struct Orchestrator {
    source: Arc<dyn BarSource>,
    store: Arc<dyn IndicatorStore>,
    levels: Arc<dyn LevelCalculator>,
    settings: IndicatorSettings,
    periods: Vec<u32>,
}

impl Orchestrator {
    pub fn new(
        source: Arc<dyn BarSource>,
        store: Arc<dyn IndicatorStore>,
        levels: Arc<dyn LevelCalculator>,
        settings: IndicatorSettings,
        periods: Vec<u32>,
    ) -> Self {
        Self {
            source,
            store,
            levels,
            settings,
            periods,
        }
    }

    pub fn periods(&self) -> &[u32] {
        &self.periods
    }

    fn pairs(&self, symbols: &[String]) -> Vec<SeriesKey> {
        symbols
            .iter()
            .flat_map(|s| self.periods.iter().map(move |&p| SeriesKey::new(s.clone(), p)))
            .collect()
    }

    // -------------------------------------------------------------------------
    // Full
    // -------------------------------------------------------------------------

    /// Recompute every pair from its entire history and replace what is stored.
    pub async fn compute_all(
        &self,
        symbols: &[String],
        cancel: &CancellationToken,
    ) -> Result<CalcReport, EngineError> {
        let pairs = self.pairs(symbols);
        info!(symbols = symbols.len(), pairs = pairs.len(), "full computation started");

        let outcomes = join_all(pairs.into_iter().map(|key| async move {
            let outcome = self.full_pair(&key, cancel).await;
            (key, outcome)
        }))
        .await;

        let mut report = CalcReport::default();
        let mut keys = Vec::new();
        let mut records = Vec::new();
        for (key, outcome) in settle(outcomes)? {
            match outcome {
                Ok(computed) => {
                    report.success(&key, computed.len());
                    keys.push(key);
                    records.extend(computed);
                }
                Err(e) => report.failure(&key, &e),
            }
        }

        if !keys.is_empty() {
            guarded(cancel, self.store.replace(&keys, records)).await?;
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "full computation complete"
        );
        Ok(report)
    }

    async fn full_pair(
        &self,
        key: &SeriesKey,
        cancel: &CancellationToken,
    ) -> Result<PairResult, EngineError> {
        let native = key.granularity();
        let raw = guarded(cancel, self.source.fetch_all(&key.symbol, native)).await?;
        let bars: Vec<GroupedBar> = group_bars(raw, native, key.period_minutes).collect();
        if bars.is_empty() {
            return Ok(Err(ComputeError::EmptyHistory));
        }

        let period = key.period_minutes;
        let settings = self.settings.clone();
        let records =
            tokio::task::spawn_blocking(move || compute_full(&bars, period, &settings)).await?;
        Ok(Ok(records))
    }

    // -------------------------------------------------------------------------
    // Partial
    // -------------------------------------------------------------------------

    /// Extend every pair with the bars after its stored history, looking back
    /// at most `lookback` buckets.
    pub async fn compute_partial(
        &self,
        symbols: &[String],
        lookback: usize,
        cancel: &CancellationToken,
    ) -> Result<CalcReport, EngineError> {
        let pairs = self.pairs(symbols);
        info!(
            symbols = symbols.len(),
            pairs = pairs.len(),
            lookback,
            "partial computation started"
        );

        let pair_work = join_all(pairs.into_iter().map(|key| async move {
            let outcome = self.partial_pair(&key, lookback, cancel).await;
            (key, outcome)
        }));
        let (outcomes, levels) = tokio::join!(pair_work, self.levels.recalculate(symbols));

        let mut report = CalcReport::default();
        for (key, outcome) in settle(outcomes)? {
            match outcome {
                Ok(written) => report.success(&key, written.len()),
                Err(e) => report.failure(&key, &e),
            }
        }

        if let Err(e) = levels {
            let reason = format!("{e:#}");
            warn!(error = %reason, "levels recalculation failed");
            report.levels_error = Some(reason);
        }

        info!(
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "partial computation complete"
        );
        Ok(report)
    }

    async fn partial_pair(
        &self,
        key: &SeriesKey,
        lookback: usize,
        cancel: &CancellationToken,
    ) -> Result<PairResult, EngineError> {
        let native = key.granularity();
        let per_bucket = native.bars_per_bucket(key.period_minutes);
        let wanted = (lookback + 1) * per_bucket;

        let (raw, stored) = tokio::try_join!(
            guarded(cancel, self.source.fetch_last_n(&key.symbol, native, wanted)),
            guarded(cancel, self.store.read(key, lookback)),
        )?;

        // A full window may have cut the oldest bucket short.
        let window_full = raw.len() >= wanted;
        let mut bars: Vec<GroupedBar> = group_bars(raw, native, key.period_minutes).collect();
        if window_full && per_bucket > 1 && !bars.is_empty() {
            bars.remove(0);
        }

        let period = key.period_minutes;
        let settings = self.settings.clone();
        let computed = tokio::task::spawn_blocking(move || {
            compute_partial(&bars, &stored, period, &settings)
        })
        .await?;

        match computed {
            Ok(records) => {
                if !records.is_empty() {
                    guarded(cancel, self.store.upsert(records.clone())).await?;
                }
                Ok(Ok(records))
            }
            Err(e) => Ok(Err(e)),
        }
    }

    // -------------------------------------------------------------------------
    // Last
    // -------------------------------------------------------------------------

    /// Patch the newest stored record of every period of `symbol`.
    pub async fn compute_last(
        &self,
        symbol: &str,
        cancel: &CancellationToken,
    ) -> Result<CalcReport, EngineError> {
        let pairs = self.pairs(&[symbol.to_string()]);
        info!(symbol, pairs = pairs.len(), "last-bar update started");

        let outcomes = join_all(pairs.into_iter().map(|key| async move {
            let outcome = self.last_pair(&key, cancel).await;
            (key, outcome)
        }))
        .await;

        let mut report = CalcReport::default();
        for (key, outcome) in settle(outcomes)? {
            match outcome {
                Ok(written) => report.success(&key, written.len()),
                Err(e) => report.failure(&key, &e),
            }
        }

        info!(
            symbol,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "last-bar update complete"
        );
        Ok(report)
    }

    async fn last_pair(
        &self,
        key: &SeriesKey,
        cancel: &CancellationToken,
    ) -> Result<PairResult, EngineError> {
        let native = key.granularity();
        let (mut stored, newest) = tokio::try_join!(
            guarded(cancel, self.store.read(key, 2)),
            guarded(cancel, self.source.fetch_last_n(&key.symbol, native, 1)),
        )?;

        let period_secs = bucket_secs(native, key.period_minutes);
        if let (Some(curr), Some(tick)) = (stored.last_mut(), newest.last()) {
            if bucket_start(tick.epoch(), period_secs) == curr.bar.epoch {
                curr.bar.high = curr.bar.high.max(tick.high);
                curr.bar.low = curr.bar.low.min(tick.low);
                curr.apply_close(tick.close);
            }
        }

        let updated = match update_last_bar(&stored, &self.settings) {
            Ok(record) => record,
            Err(e) => return Ok(Err(e)),
        };
        guarded(cancel, self.store.upsert(vec![updated.clone()])).await?;
        Ok(Ok(vec![updated]))
    }
}
