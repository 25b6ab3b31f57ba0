// =============================================================================
// REST API Endpoints: Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.
//
//   GET  /api/v1/health
//   POST /api/v1/bars                      ingest raw bars
//   POST /api/v1/indicators/all            full recompute
//   POST /api/v1/indicators/partial        extend stored history
//   POST /api/v1/indicators/last           patch the newest bar of one symbol
//   GET  /api/v1/indicators/:symbol/:period?limit=N
//
// Compute endpoints answer 200 with the per-pair report unless every pair
// failed (404) or the request itself failed (500 / 408).
//
// CORS is configured permissively for development; tighten `allowed_origins`
// in production.
// =============================================================================

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::error::{ApiError, EngineError};
use crate::orchestrator::CalcReport;
use crate::storage::IndicatorStore;
use crate::types::{Granularity, RawBar, SeriesKey};

const DEFAULT_READ_LIMIT: usize = 500;

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/bars", post(ingest_bars))
        .route("/api/v1/indicators/all", post(compute_all))
        .route("/api/v1/indicators/partial", post(compute_partial))
        .route("/api/v1/indicators/last", post(compute_last))
        .route("/api/v1/indicators/:symbol/:period", get(read_indicators))
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_health())
}

// =============================================================================
// Bar ingestion
// =============================================================================

#[derive(Debug, Deserialize)]
struct BarInput {
    symbol: String,
    timestamp: DateTime<Utc>,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct IngestRequest {
    #[serde(default = "default_granularity")]
    granularity: Granularity,
    bars: Vec<BarInput>,
}

fn default_granularity() -> Granularity {
    Granularity::Minute
}

fn validate_bar(bar: &BarInput) -> Result<(), String> {
    if bar.symbol.trim().is_empty() {
        return Err("bar symbol must not be empty".to_string());
    }
    let prices = [bar.open, bar.high, bar.low, bar.close];
    if prices.iter().any(|p| !p.is_finite()) {
        return Err(format!("{} @ {}: prices must be finite", bar.symbol, bar.timestamp));
    }
    if bar.high < bar.low || bar.close > bar.high || bar.close < bar.low {
        return Err(format!(
            "{} @ {}: expected high >= close >= low",
            bar.symbol, bar.timestamp
        ));
    }
    Ok(())
}

async fn ingest_bars(
    State(state): State<Arc<AppState>>,
    Json(req): Json<IngestRequest>,
) -> Result<impl IntoResponse, ApiError> {
    for bar in &req.bars {
        validate_bar(bar).map_err(ApiError::BadRequest)?;
    }

    let raw: Vec<RawBar> = {
        let config = state.config.read();
        req.bars
            .into_iter()
            .map(|b| {
                let market_date = config.calendar_for(&b.symbol).market_date(b.timestamp);
                RawBar {
                    symbol: b.symbol,
                    timestamp: b.timestamp,
                    open: b.open,
                    high: b.high,
                    low: b.low,
                    close: b.close,
                    volume: b.volume,
                    market_date,
                }
            })
            .collect()
    };

    let count = raw.len();
    let symbols: BTreeSet<String> = raw.iter().map(|b| b.symbol.clone()).collect();
    state.source.ingest(req.granularity, raw);
    info!(bars = count, granularity = %req.granularity, "raw bars ingested");

    let retained: BTreeMap<String, usize> = symbols
        .into_iter()
        .map(|s| {
            let n = state.source.count(&s, req.granularity);
            (s, n)
        })
        .collect();

    Ok(Json(json!({ "ok": true, "ingested": count, "retained": retained })))
}

// =============================================================================
// Computation
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct ComputeRequest {
    #[serde(default)]
    symbols: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct PartialRequest {
    #[serde(default)]
    symbols: Option<Vec<String>>,
    #[serde(default)]
    lookback: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct LastRequest {
    symbol: String,
}

/// Translate an orchestrator result into an HTTP answer.
fn finish(
    state: &AppState,
    result: Result<CalcReport, EngineError>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            warn!(error = %e, "compute request failed");
            state.push_error(e.to_string());
            return Err(e.into());
        }
    };

    if report.all_failed() {
        return Err(ApiError::NotFound(report));
    }
    if !report.succeeded.is_empty() {
        state.increment_version();
    }
    Ok(Json(json!({ "ok": true, "report": report })))
}

async fn compute_all(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ComputeRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let symbols = state.resolve_symbols(req.symbols);
    let cancel = state.shutdown.child_token();
    let result = state.orchestrator.compute_all(&symbols, &cancel).await;
    finish(&state, result)
}

async fn compute_partial(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PartialRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let lookback = req
        .lookback
        .unwrap_or_else(|| state.config.read().partial_lookback);
    if lookback == 0 {
        return Err(ApiError::BadRequest("lookback must be at least 1".to_string()));
    }

    let symbols = state.resolve_symbols(req.symbols);
    let cancel = state.shutdown.child_token();
    let result = state
        .orchestrator
        .compute_partial(&symbols, lookback, &cancel)
        .await;
    finish(&state, result)
}

async fn compute_last(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LastRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.symbol.trim().is_empty() {
        return Err(ApiError::BadRequest("symbol must not be empty".to_string()));
    }
    let cancel = state.shutdown.child_token();
    let result = state.orchestrator.compute_last(&req.symbol, &cancel).await;
    finish(&state, result)
}

// =============================================================================
// Reads
// =============================================================================

#[derive(Debug, Deserialize)]
struct ReadQuery {
    limit: Option<usize>,
}

async fn read_indicators(
    State(state): State<Arc<AppState>>,
    Path((symbol, period)): Path<(String, u32)>,
    Query(query): Query<ReadQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let key = SeriesKey::new(symbol, period);
    let limit = query.limit.unwrap_or(DEFAULT_READ_LIMIT);
    let records = state
        .store
        .read(&key, limit)
        .await
        .map_err(|e| ApiError::Engine(EngineError::Storage(e)))?;

    Ok(Json(json!({
        "series": key.to_string(),
        "count": records.len(),
        "records": records,
    })))
}
