//! API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<Settler>`.

use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use crate::engine::Settler;
use crate::types::{SettleError, SettlementView, SlotKey};

pub type AppState = Arc<Settler>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettleRequest {
    #[serde(default)]
    pub operator_id: String,
    #[serde(default)]
    pub draw_date: String,
    #[serde(default)]
    pub draw_time: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    #[serde(default)]
    pub operator_id: String,
    #[serde(default)]
    pub draw_date: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub retryable: bool,
}

/// `SettleError` rendered as an HTTP response.
pub struct ApiError(pub SettleError);

impl From<SettleError> for ApiError {
    fn from(err: SettleError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0 {
            SettleError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            SettleError::OperatorNotFound(_) => StatusCode::NOT_FOUND,
            SettleError::SeriesExhausted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            SettleError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            SettleError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, status = status.as_u16(), "Request failed");
        }
        let body = ErrorBody {
            error: self.0.to_string(),
            retryable: self.0.is_retryable(),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// POST /api/settlements
pub async fn settle(
    State(settler): State<AppState>,
    payload: Result<Json<SettleRequest>, JsonRejection>,
) -> Result<Json<SettlementView>, ApiError> {
    let Json(req) = payload.map_err(|e| SettleError::InvalidInput(e.body_text()))?;
    let slot = SlotKey::new(&req.operator_id, &req.draw_date, &req.draw_time)?;
    let record = settler.settle(&slot).await?;
    Ok(Json(SettlementView::from(&record)))
}

/// GET /api/settlements?operatorId=&drawDate=
pub async fn list_settlements(
    State(settler): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> Result<Json<Vec<SettlementView>>, ApiError> {
    let Query(query) = query.map_err(|e| SettleError::InvalidInput(e.body_text()))?;
    let records = settler.list(&query.operator_id, &query.draw_date).await?;
    Ok(Json(records.iter().map(SettlementView::from).collect()))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}
