// =============================================================================
// Central Application State: Indicator Engine
// =============================================================================
//
// Ties the configuration, the bar source, the indicator store and the
// orchestrator together for the REST layer. Every handler receives it as
// `Arc<AppState>`.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for mutable shared collections.
//   - Arc wrappers for collaborators that manage their own interior
//     mutability.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::levels::{LevelCalculator, LoggingLevelCalculator};
use crate::market_data::MemoryBarSource;
use crate::orchestrator::Orchestrator;
use crate::runtime_config::EngineConfig;
use crate::storage::MemoryIndicatorStore;

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// A recorded request failure for the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Payload of `GET /api/v1/health`.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub uptime_secs: u64,
    pub state_version: u64,
    pub symbols: Vec<String>,
    pub periods: Vec<u32>,
    pub series: usize,
    pub records: usize,
    pub recent_errors: Vec<ErrorRecord>,
}

pub struct AppState {
    /// Incremented after every write to the indicator store.
    pub state_version: AtomicU64,

    pub config: Arc<RwLock<EngineConfig>>,
    pub source: Arc<MemoryBarSource>,
    pub store: Arc<MemoryIndicatorStore>,
    pub orchestrator: Arc<Orchestrator>,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    /// Cancelled on shutdown; every request computes under a child token.
    pub shutdown: CancellationToken,

    pub start_time: std::time::Instant,
}

impl AppState {
    /// Construct a new `AppState` with the in-memory collaborators and the
    /// logging level calculator.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_levels(config, Arc::new(LoggingLevelCalculator))
    }

    pub fn with_levels(config: EngineConfig, levels: Arc<dyn LevelCalculator>) -> Self {
        let source = Arc::new(MemoryBarSource::new(config.max_raw_bars));
        let store = Arc::new(MemoryIndicatorStore::new());
        let orchestrator = Arc::new(Orchestrator::new(
            source.clone(),
            store.clone(),
            levels,
            config.indicator_settings(),
            config.periods.clone(),
        ));

        Self {
            state_version: AtomicU64::new(1),
            config: Arc::new(RwLock::new(config)),
            source,
            store,
            orchestrator,
            recent_errors: RwLock::new(Vec::new()),
            shutdown: CancellationToken::new(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    /// Record an error message, evicting the oldest beyond
    /// [`MAX_RECENT_ERRORS`].
    pub fn push_error(&self, msg: String) {
        let mut errors = self.recent_errors.write();
        errors.push(ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        });
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    /// Symbols from a request, or the configured ones when it names none.
    pub fn resolve_symbols(&self, requested: Option<Vec<String>>) -> Vec<String> {
        match requested {
            Some(symbols) if !symbols.is_empty() => symbols,
            _ => self.config.read().symbols.clone(),
        }
    }

    pub fn build_health(&self) -> HealthSnapshot {
        let config = self.config.read();
        HealthSnapshot {
            status: "ok",
            uptime_secs: self.start_time.elapsed().as_secs(),
            state_version: self.current_state_version(),
            symbols: config.symbols.clone(),
            periods: self.orchestrator.periods().to_vec(),
            series: self.store.series_count(),
            records: self.store.record_count(),
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_state_reflects_config() {
        let state = AppState::new(EngineConfig::default());
        let health = state.build_health();
        assert_eq!(health.status, "ok");
        assert_eq!(health.periods, vec![1, 5, 15, 60, 1440]);
        assert_eq!(health.records, 0);
        assert_eq!(health.state_version, 1);
    }

    #[test]
    fn version_increments() {
        let state = AppState::new(EngineConfig::default());
        let before = state.current_state_version();
        state.increment_version();
        assert_eq!(state.current_state_version(), before + 1);
    }

    #[test]
    fn error_log_is_capped() {
        let state = AppState::new(EngineConfig::default());
        for i in 0..(MAX_RECENT_ERRORS + 5) {
            state.push_error(format!("error {i}"));
        }
        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors[0].message, "error 5");
    }

    #[test]
    fn empty_request_falls_back_to_configured_symbols() {
        let state = AppState::new(EngineConfig::default());
        assert_eq!(state.resolve_symbols(None), EngineConfig::default().symbols);
        assert_eq!(state.resolve_symbols(Some(vec![])), EngineConfig::default().symbols);
        assert_eq!(state.resolve_symbols(Some(vec!["RTY".into()])), vec!["RTY"]);
    }
}
