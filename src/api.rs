//! Operator actions over HTTP. Each route maps 1:1 onto a `RaidScout` operation.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tower_http::cors::CorsLayer;

use crate::error::ScoutError;
use crate::recorder::RaidReceipt;
use crate::scout::{RaidScout, Snapshot};

pub type AppState = Arc<RaidScout>;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/suggestion", get(suggestion))
        .route("/refresh", post(refresh))
        .route("/override", post(set_override).delete(clear_override))
        .route("/raided", post(mark_raided))
        .route("/admin/reload-config", post(reload_config))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Deserialize)]
struct TargetReq {
    login: String,
}

/// `ScoutError` as an HTTP response.
pub struct ApiError(ScoutError);

impl From<ScoutError> for ApiError {
    fn from(e: ScoutError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ScoutError::InvalidTarget(_) => StatusCode::CONFLICT,
            ScoutError::Config(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ScoutError::Auth(_) | ScoutError::Telemetry(_) => StatusCode::BAD_GATEWAY,
            ScoutError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({ "error": self.0.kind(), "message": self.0.to_string() });
        (status, Json(body)).into_response()
    }
}

async fn suggestion(State(scout): State<AppState>) -> Json<Snapshot> {
    Json(scout.snapshot())
}

async fn refresh(State(scout): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    Ok(Json(scout.refresh(Utc::now()).await?))
}

async fn set_override(
    State(scout): State<AppState>,
    Json(body): Json<TargetReq>,
) -> Result<Json<Snapshot>, ApiError> {
    Ok(Json(scout.set_override(&body.login)?))
}

async fn clear_override(State(scout): State<AppState>) -> Json<Snapshot> {
    Json(scout.clear_override())
}

async fn mark_raided(
    State(scout): State<AppState>,
    Json(body): Json<TargetReq>,
) -> Result<Json<RaidReceipt>, ApiError> {
    Ok(Json(scout.mark_raided(&body.login, Utc::now())?))
}

async fn reload_config(State(scout): State<AppState>) -> Result<Json<Snapshot>, ApiError> {
    Ok(Json(scout.reload_config(Utc::now())?))
}
