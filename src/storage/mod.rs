// =============================================================================
// Indicator Store
// =============================================================================
//
// Persisted indicator records keyed by (symbol, period, bucket epoch).
//
// `replace` is the only bulk-destructive write: it deletes every record of the
// given series and inserts the new ones as one unit, so a reader sees either
// the old series or the new one, never an empty gap in between.
// =============================================================================

pub mod memory;

pub use memory::MemoryIndicatorStore;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{IndicatorRecord, SeriesKey};

#[async_trait]
pub trait IndicatorStore: Send + Sync {
    /// The most recent `limit` records of a series, oldest first.
    async fn read(&self, key: &SeriesKey, limit: usize) -> Result<Vec<IndicatorRecord>>;

    /// Delete every record of `keys`, then insert `records`, atomically.
    async fn replace(&self, keys: &[SeriesKey], records: Vec<IndicatorRecord>) -> Result<()>;

    /// Insert or overwrite records by key.
    async fn upsert(&self, records: Vec<IndicatorRecord>) -> Result<()>;
}
