// =============================================================================
// MemoryIndicatorStore: in-process store with JSON snapshots
// =============================================================================
//
// One ordered map per series, keyed by bucket epoch. A single RwLock guards
// the whole store so `replace` can hold one write guard across its delete and
// insert.
//
// Snapshots are a flat JSON array of records written with the tmp + rename
// pattern, so a crash mid-save leaves the previous snapshot intact.
// =============================================================================

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::IndicatorStore;
use crate::types::{IndicatorRecord, RecordKey, SeriesKey};

type Series = BTreeMap<i64, IndicatorRecord>;

#[derive(Default)]
pub struct MemoryIndicatorStore {
    series: RwLock<HashMap<SeriesKey, Series>>,
}

impl MemoryIndicatorStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of series with at least one record.
    pub fn series_count(&self) -> usize {
        self.series.read().values().filter(|s| !s.is_empty()).count()
    }

    /// Total number of stored records.
    pub fn record_count(&self) -> usize {
        self.series.read().values().map(BTreeMap::len).sum()
    }

    fn insert_all(map: &mut HashMap<SeriesKey, Series>, records: Vec<IndicatorRecord>) {
        for record in records {
            let RecordKey { series, epoch } = record.key();
            map.entry(series).or_default().insert(epoch, record);
        }
    }

    // -------------------------------------------------------------------------
    // Snapshots
    // -------------------------------------------------------------------------

    /// Write every record to `path` atomically.
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();

        let records: Vec<IndicatorRecord> = {
            let map = self.series.read();
            let mut keys: Vec<&SeriesKey> = map.keys().collect();
            keys.sort();
            keys.into_iter()
                .flat_map(|k| map[k].values().cloned())
                .collect()
        };

        let content =
            serde_json::to_string(&records).context("failed to serialise indicator snapshot")?;

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp snapshot to {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp snapshot to {}", path.display()))?;

        info!(path = %path.display(), records = records.len(), "indicator snapshot saved (atomic)");
        Ok(records.len())
    }

    /// Replace the store's contents with the snapshot at `path`.
    pub fn load_snapshot(&self, path: impl AsRef<Path>) -> Result<usize> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read indicator snapshot from {}", path.display()))?;
        let records: Vec<IndicatorRecord> = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse indicator snapshot from {}", path.display()))?;

        let count = records.len();
        let mut map = self.series.write();
        map.clear();
        Self::insert_all(&mut map, records);

        info!(path = %path.display(), records = count, series = map.len(), "indicator snapshot loaded");
        Ok(count)
    }
}

#[async_trait]
impl IndicatorStore for MemoryIndicatorStore {
    async fn read(&self, key: &SeriesKey, limit: usize) -> Result<Vec<IndicatorRecord>> {
        let map = self.series.read();
        let Some(series) = map.get(key) else {
            return Ok(Vec::new());
        };

        let skip = series.len().saturating_sub(limit);
        Ok(series.values().skip(skip).cloned().collect())
    }

    async fn replace(&self, keys: &[SeriesKey], records: Vec<IndicatorRecord>) -> Result<()> {
        let count = records.len();
        let mut map = self.series.write();
        for key in keys {
            map.remove(key);
        }
        Self::insert_all(&mut map, records);
        debug!(series = keys.len(), records = count, "series replaced");
        Ok(())
    }

    async fn upsert(&self, records: Vec<IndicatorRecord>) -> Result<()> {
        let count = records.len();
        Self::insert_all(&mut self.series.write(), records);
        debug!(records = count, "records upserted");
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{compute_full, compute_partial};
    use crate::engine::fixtures::{hourly_bars, settings, PERIOD};

    fn records(n: usize) -> Vec<IndicatorRecord> {
        compute_full(&hourly_bars(n), PERIOD, &settings())
    }

    #[tokio::test]
    async fn read_returns_most_recent_ascending() {
        let store = MemoryIndicatorStore::new();
        let all = records(10);
        store.upsert(all.clone()).await.unwrap();

        let key = SeriesKey::new("ES", PERIOD);
        let last3 = store.read(&key, 3).await.unwrap();
        assert_eq!(last3, all[7..].to_vec());

        let everything = store.read(&key, 100).await.unwrap();
        assert_eq!(everything.len(), 10);
    }

    #[tokio::test]
    async fn read_unknown_series_is_empty() {
        let store = MemoryIndicatorStore::new();
        let out = store.read(&SeriesKey::new("NQ", 5), 10).await.unwrap();
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn replace_drops_stale_records() {
        let store = MemoryIndicatorStore::new();
        store.upsert(records(10)).await.unwrap();

        let key = SeriesKey::new("ES", PERIOD);
        let fresh = records(4);
        store.replace(&[key.clone()], fresh.clone()).await.unwrap();

        assert_eq!(store.read(&key, 100).await.unwrap(), fresh);
    }

    #[tokio::test]
    async fn replace_leaves_other_series_alone() {
        let store = MemoryIndicatorStore::new();
        let mut other = records(3);
        for r in &mut other {
            r.period_minutes = 15;
        }
        store.upsert(other).await.unwrap();
        store.upsert(records(5)).await.unwrap();

        store
            .replace(&[SeriesKey::new("ES", PERIOD)], records(2))
            .await
            .unwrap();

        assert_eq!(store.read(&SeriesKey::new("ES", 15), 10).await.unwrap().len(), 3);
        assert_eq!(store.series_count(), 2);
        assert_eq!(store.record_count(), 5);
    }

    #[tokio::test]
    async fn upsert_overwrites_same_key() {
        let store = MemoryIndicatorStore::new();
        let mut all = records(3);
        store.upsert(all.clone()).await.unwrap();

        all[2].apply_close(1_000.0);
        store.upsert(vec![all[2].clone()]).await.unwrap();

        let out = store.read(&SeriesKey::new("ES", PERIOD), 10).await.unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].bar.close, 1_000.0);
    }

    #[tokio::test]
    async fn readers_never_see_half_replaced_series() {
        use std::sync::Arc;

        let store = Arc::new(MemoryIndicatorStore::new());
        let key = SeriesKey::new("ES", PERIOD);
        store.upsert(records(8)).await.unwrap();

        let writer = {
            let store = store.clone();
            let key = key.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    store.replace(&[key.clone()], records(8)).await.unwrap();
                }
            })
        };

        for _ in 0..200 {
            let seen = store.read(&key, 100).await.unwrap();
            assert_eq!(seen.len(), 8);
            tokio::task::yield_now().await;
        }
        writer.await.unwrap();
    }

    #[test]
    fn snapshot_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indicators.json");

        let store = MemoryIndicatorStore::new();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(store.upsert(records(6))).unwrap();

        assert_eq!(store.save_snapshot(&path).unwrap(), 6);
        assert!(!path.with_extension("json.tmp").exists());

        let restored = MemoryIndicatorStore::new();
        assert_eq!(restored.load_snapshot(&path).unwrap(), 6);
        let out = rt
            .block_on(restored.read(&SeriesKey::new("ES", PERIOD), 10))
            .unwrap();
        assert_eq!(out, records(6));
    }

    #[test]
    fn partial_after_restore_matches_full() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("indicators.json");
        let bars = hourly_bars(200);
        let full = compute_full(&bars, PERIOD, &settings());

        let store = MemoryIndicatorStore::new();
        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        rt.block_on(store.upsert(full[..150].to_vec())).unwrap();
        store.save_snapshot(&path).unwrap();

        let restored = MemoryIndicatorStore::new();
        restored.load_snapshot(&path).unwrap();
        let stored = rt
            .block_on(restored.read(&SeriesKey::new("ES", PERIOD), 150))
            .unwrap();
        assert_eq!(stored, full[..150].to_vec());

        let out = compute_partial(&bars, &stored, PERIOD, &settings()).unwrap();
        assert_eq!(out, full[150..].to_vec());
    }

    #[test]
    fn load_missing_snapshot_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = MemoryIndicatorStore::new();
        assert!(store.load_snapshot(dir.path().join("absent.json")).is_err());
    }
}
