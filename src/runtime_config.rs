// =============================================================================
// Runtime Configuration: engine settings with atomic save
// =============================================================================
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry `#[serde(default)]` so that adding new fields never
// breaks loading an older config file.
//
// Environment overrides (applied after loading):
//   ENGINE_SYMBOLS    comma-separated symbol list
//   ENGINE_BIND_ADDR  HTTP listen address
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::calendar::{InstrumentCategory, MarketCalendar};
use crate::engine::IndicatorSettings;
use crate::indicators::MacdParams;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_symbols() -> Vec<String> {
    vec!["ES".to_string(), "NQ".to_string(), "CL".to_string()]
}

fn default_periods() -> Vec<u32> {
    vec![1, 5, 15, 60, 1440]
}

fn default_ema_periods() -> Vec<u32> {
    vec![5, 20, 50, 200]
}

fn default_partial_lookback() -> usize {
    300
}

fn default_max_raw_bars() -> usize {
    200_000
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_calendars() -> HashMap<InstrumentCategory, MarketCalendar> {
    [
        InstrumentCategory::Equity,
        InstrumentCategory::Futures,
        InstrumentCategory::Forex,
        InstrumentCategory::Crypto,
    ]
    .into_iter()
    .map(|c| (c, MarketCalendar::for_category(c)))
    .collect()
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the indicator engine.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // --- Series ---------------------------------------------------------------

    /// Symbols computed when a request does not name any.
    #[serde(default = "default_symbols")]
    pub symbols: Vec<String>,

    /// Aggregation periods in minutes.
    #[serde(default = "default_periods")]
    pub periods: Vec<u32>,

    // --- Indicators -----------------------------------------------------------

    #[serde(default = "default_ema_periods")]
    pub ema_periods: Vec<u32>,

    /// Candle-direction fast/slow/signal lengths.
    #[serde(default)]
    pub candle: MacdParams,

    /// Buckets of history a partial refresh looks back over.
    #[serde(default = "default_partial_lookback")]
    pub partial_lookback: usize,

    // --- Market data ----------------------------------------------------------

    /// Raw bars retained per (symbol, granularity).
    #[serde(default = "default_max_raw_bars")]
    pub max_raw_bars: usize,

    /// Symbol -> category. Unlisted symbols are treated as Equity.
    #[serde(default)]
    pub categories: HashMap<String, InstrumentCategory>,

    /// Category -> market-date cutoff rule.
    #[serde(default = "default_calendars")]
    pub calendars: HashMap<InstrumentCategory, MarketCalendar>,

    // --- Service --------------------------------------------------------------

    /// Indicator store snapshot, loaded at startup and written at shutdown.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            periods: default_periods(),
            ema_periods: default_ema_periods(),
            candle: MacdParams::default(),
            partial_lookback: default_partial_lookback(),
            max_raw_bars: default_max_raw_bars(),
            categories: HashMap::new(),
            calendars: default_calendars(),
            snapshot_path: None,
            bind_addr: default_bind_addr(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            symbols = ?config.symbols,
            periods = ?config.periods,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Apply `ENGINE_SYMBOLS` / `ENGINE_BIND_ADDR` from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("ENGINE_SYMBOLS") {
            let symbols: Vec<String> = raw
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
            if !symbols.is_empty() {
                info!(symbols = ?symbols, "symbols overridden from environment");
                self.symbols = symbols;
            }
        }
        if let Some(addr) = lookup("ENGINE_BIND_ADDR") {
            info!(bind_addr = %addr, "bind address overridden from environment");
            self.bind_addr = addr;
        }
    }

    pub fn indicator_settings(&self) -> IndicatorSettings {
        IndicatorSettings {
            ema_periods: self.ema_periods.clone(),
            macd: self.candle,
        }
    }

    pub fn category(&self, symbol: &str) -> InstrumentCategory {
        self.categories.get(symbol).copied().unwrap_or_default()
    }

    /// Calendar for `symbol`, falling back to its category's built-in rule.
    pub fn calendar_for(&self, symbol: &str) -> MarketCalendar {
        let category = self.category(symbol);
        self.calendars
            .get(&category)
            .copied()
            .unwrap_or_else(|| MarketCalendar::for_category(category))
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.periods, vec![1, 5, 15, 60, 1440]);
        assert_eq!(cfg.ema_periods, vec![5, 20, 50, 200]);
        assert_eq!(cfg.candle, MacdParams { fast: 12, slow: 26, signal: 9 });
        assert_eq!(cfg.partial_lookback, 300);
        assert_eq!(cfg.calendars.len(), 4);
        assert!(cfg.snapshot_path.is_none());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.symbols, default_symbols());
        assert_eq!(cfg.periods, default_periods());
        assert_eq!(cfg.bind_addr, "0.0.0.0:3001");
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{
            "symbols": ["CL"],
            "candle": { "fast": 8, "slow": 21, "signal": 5 },
            "categories": { "CL": "Futures" }
        }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["CL"]);
        assert_eq!(cfg.candle.slow, 21);
        assert_eq!(cfg.category("CL"), InstrumentCategory::Futures);
        assert_eq!(cfg.category("AAPL"), InstrumentCategory::Equity);
        assert_eq!(cfg.partial_lookback, 300);
    }

    #[test]
    fn settings_track_candle_lengths() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.indicator_settings().tracked_periods(), vec![5, 12, 20, 26, 50, 200]);
    }

    #[test]
    fn env_overrides_replace_symbols_and_addr() {
        let mut cfg = EngineConfig::default();
        cfg.apply_overrides(|key| match key {
            "ENGINE_SYMBOLS" => Some(" ES, ,RTY ".to_string()),
            "ENGINE_BIND_ADDR" => Some("127.0.0.1:9000".to_string()),
            _ => None,
        });
        assert_eq!(cfg.symbols, vec!["ES", "RTY"]);
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
    }

    #[test]
    fn blank_symbol_override_is_ignored() {
        let mut cfg = EngineConfig::default();
        cfg.apply_overrides(|key| (key == "ENGINE_SYMBOLS").then(|| " , ".to_string()));
        assert_eq!(cfg.symbols, default_symbols());
    }

    #[test]
    fn save_then_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine_config.json");

        let mut cfg = EngineConfig::default();
        cfg.symbols = vec!["6E".to_string()];
        cfg.categories.insert("6E".to_string(), InstrumentCategory::Forex);
        cfg.save(&path).unwrap();
        assert!(!path.with_extension("json.tmp").exists());

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.symbols, cfg.symbols);
        assert_eq!(loaded.calendar_for("6E"), MarketCalendar::for_category(InstrumentCategory::Forex));
    }

    #[test]
    fn load_missing_file_errors() {
        assert!(EngineConfig::load("/nonexistent/engine_config.json").is_err());
    }
}
