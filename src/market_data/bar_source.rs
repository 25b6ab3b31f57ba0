// =============================================================================
// Bar Source: upstream raw bars per (symbol, granularity)
// =============================================================================
//
// The orchestrator only sees the `BarSource` trait. `MemoryBarSource` keeps
// each series sorted by timestamp, replaces a bar that arrives again with the
// same timestamp (live updates) and trims the oldest bars past its retention.
// =============================================================================

use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::debug;

use crate::types::{Granularity, RawBar};

// ---------------------------------------------------------------------------
// Collaborator interface
// ---------------------------------------------------------------------------

/// Upstream source of raw bars, one ordered series per (symbol, granularity).
#[async_trait]
pub trait BarSource: Send + Sync {
    /// Every raw bar for `symbol`, oldest first.
    async fn fetch_all(&self, symbol: &str, granularity: Granularity) -> Result<Vec<RawBar>>;

    /// The most recent `n` raw bars for `symbol`, oldest first.
    async fn fetch_last_n(
        &self,
        symbol: &str,
        granularity: Granularity,
        n: usize,
    ) -> Result<Vec<RawBar>>;
}

// ---------------------------------------------------------------------------
// MemoryBarSource -- thread-safe raw series per (symbol, granularity)
// ---------------------------------------------------------------------------

/// Composite key that identifies one raw series.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct SourceKey {
    symbol: String,
    granularity: Granularity,
}

/// In-process bar source. Bars are kept sorted by timestamp; ingesting a bar
/// with an existing timestamp replaces it (the live bar being revised).
pub struct MemoryBarSource {
    series: RwLock<HashMap<SourceKey, Vec<RawBar>>>,
    max_bars: usize,
}

impl MemoryBarSource {
    /// Create a source that retains at most `max_bars` bars per series.
    pub fn new(max_bars: usize) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            max_bars,
        }
    }

    /// Insert or replace bars. Returns the series length afterwards.
    pub fn ingest(&self, granularity: Granularity, bars: Vec<RawBar>) -> usize {
        let mut map = self.series.write();
        let mut len = 0;

        for bar in bars {
            let key = SourceKey {
                symbol: bar.symbol.clone(),
                granularity,
            };
            let series = map.entry(key).or_default();

            let in_order = series
                .last()
                .map_or(true, |last| last.timestamp < bar.timestamp);

            if in_order {
                series.push(bar);
            } else {
                match series.binary_search_by(|b| b.timestamp.cmp(&bar.timestamp)) {
                    Ok(pos) => series[pos] = bar,
                    Err(pos) => series.insert(pos, bar),
                }
            }

            if series.len() > self.max_bars {
                let excess = series.len() - self.max_bars;
                series.drain(..excess);
            }
            len = series.len();
        }

        len
    }

    /// Number of bars stored for a series.
    pub fn count(&self, symbol: &str, granularity: Granularity) -> usize {
        let key = SourceKey {
            symbol: symbol.to_string(),
            granularity,
        };
        self.series.read().get(&key).map_or(0, Vec::len)
    }

    fn snapshot(&self, symbol: &str, granularity: Granularity, n: Option<usize>) -> Vec<RawBar> {
        let key = SourceKey {
            symbol: symbol.to_string(),
            granularity,
        };
        let map = self.series.read();
        match map.get(&key) {
            Some(series) => {
                let start = n.map_or(0, |n| series.len().saturating_sub(n));
                series[start..].to_vec()
            }
            None => Vec::new(),
        }
    }
}

#[async_trait]
impl BarSource for MemoryBarSource {
    async fn fetch_all(&self, symbol: &str, granularity: Granularity) -> Result<Vec<RawBar>> {
        let bars = self.snapshot(symbol, granularity, None);
        debug!(symbol, %granularity, bars = bars.len(), "fetched full raw history");
        Ok(bars)
    }

    async fn fetch_last_n(
        &self,
        symbol: &str,
        granularity: Granularity,
        n: usize,
    ) -> Result<Vec<RawBar>> {
        let bars = self.snapshot(symbol, granularity, Some(n));
        debug!(symbol, %granularity, requested = n, bars = bars.len(), "fetched recent raw bars");
        Ok(bars)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
