// =============================================================================
// Error Taxonomy: per-pair, fatal and HTTP-facing errors
// =============================================================================
//
// ComputeError   recoverable per-(symbol, period) condition; the orchestrator
//                reports it for the offending pair and keeps going
// EngineError    fatal to the enclosing request: storage failure,
//                cancellation or a compute task that died
// ApiError       either of the above rendered as a JSON HTTP response
// =============================================================================

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::orchestrator::CalcReport;

/// Broad class of a per-pair failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureKind {
    InsufficientData,
    UnreconcilableHistory,
    PreconditionViolation,
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ComputeError {
    /// The grouped history for the pair is empty.
    #[error("no grouped history available")]
    EmptyHistory,

    /// Partial computation has no stored records to seed from.
    #[error("no stored indicator records to seed from")]
    NoStoredRecords,

    /// Fewer than two grouped bars overlap the stored window.
    #[error("insufficient history: {available} grouped bar(s) after trimming, need at least 2")]
    InsufficientHistory { available: usize },

    /// No grouped bar carries the last stored record's timestamp.
    #[error("anchor not found: no grouped bar at {timestamp}")]
    AnchorNotFound { timestamp: DateTime<Utc> },

    /// Backward comparison found no bar that agrees with stored history.
    #[error("no matching point after comparing {compared} bar(s); feed more stored history")]
    NoMatchingPoint { compared: usize },

    /// The last-bar update needs the two newest stored records.
    #[error("need 2 stored records to update the last bar, found {found}")]
    NotEnoughRecords { found: usize },
}

impl ComputeError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::EmptyHistory | Self::NoStoredRecords | Self::InsufficientHistory { .. } => {
                FailureKind::InsufficientData
            }
            Self::AnchorNotFound { .. } | Self::NoMatchingPoint { .. } => {
                FailureKind::UnreconcilableHistory
            }
            Self::NotEnoughRecords { .. } => FailureKind::PreconditionViolation,
        }
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    /// Source or store failure; not retried.
    #[error("storage failure: {0:#}")]
    Storage(anyhow::Error),

    #[error("request cancelled")]
    Cancelled,

    #[error("compute task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// ---------------------------------------------------------------------------
// HTTP mapping
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Every requested pair failed with a per-pair condition.
    #[error("Not found: no pair could be computed")]
    NotFound(CalcReport),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "ok": false, "error": msg }),
            ),
            ApiError::NotFound(report) => (
                StatusCode::NOT_FOUND,
                json!({ "ok": false, "error": self.to_string(), "report": report }),
            ),
            ApiError::Engine(EngineError::Cancelled) => (
                StatusCode::REQUEST_TIMEOUT,
                json!({ "ok": false, "error": self.to_string() }),
            ),
            ApiError::Engine(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "ok": false, "error": format!("Internal error: {err}") }),
            ),
        };

        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_follow_taxonomy() {
        assert_eq!(ComputeError::EmptyHistory.kind(), FailureKind::InsufficientData);
        assert_eq!(
            ComputeError::InsufficientHistory { available: 1 }.kind(),
            FailureKind::InsufficientData
        );
        assert_eq!(
            ComputeError::NoMatchingPoint { compared: 3 }.kind(),
            FailureKind::UnreconcilableHistory
        );
        assert_eq!(
            ComputeError::NotEnoughRecords { found: 1 }.kind(),
            FailureKind::PreconditionViolation
        );
    }

    #[test]
    fn messages_are_caller_readable() {
        let e = ComputeError::NoMatchingPoint { compared: 4 };
        assert!(e.to_string().contains("feed more stored history"));
        assert!(ComputeError::AnchorNotFound {
            timestamp: DateTime::<Utc>::default()
        }
        .to_string()
        .starts_with("anchor not found"));
    }

    #[test]
    fn not_found_maps_to_404() {
        let resp = ApiError::NotFound(CalcReport::default()).into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn storage_maps_to_500() {
        let err = EngineError::Storage(anyhow::anyhow!("connection reset"));
        let resp = ApiError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
