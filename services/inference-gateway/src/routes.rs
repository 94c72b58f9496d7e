//! Request handlers.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use predictor_core::{FeaturePayload, ModelSchema, PredictError, PredictionOutcome};
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, info};

use crate::error::ApiError;
use crate::AppState;

pub async fn root(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "available_diseases": state.service.registry().identifiers() }))
}

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "models_loaded": state.service.registry().identifiers() }))
}

pub async fn schema(State(state): State<AppState>, Path(disease): Path<String>) -> Result<Json<ModelSchema>, ApiError> {
    Ok(Json(state.service.schema(&disease)?))
}

pub async fn predict(State(state): State<AppState>, Path(disease): Path<String>, body: Bytes) -> Result<Json<PredictionOutcome>, ApiError> {
    let result = run_prediction(&state, &disease, &body).await;
    match &result {
        Ok(out) => {
            state.metrics.record(&disease, "ok");
            info!(disease=%disease, prediction=out.prediction, probability=?out.probability, "prediction served");
        }
        // unknown identifiers stay out of the label set
        Err(e) if state.service.registry().contains(&disease) => state.metrics.record(&disease, e.outcome()),
        Err(_) => state.metrics.record("unknown", "not_found"),
    }
    result.map(Json)
}

async fn run_prediction(state: &AppState, disease: &str, body: &[u8]) -> Result<PredictionOutcome, ApiError> {
    if !state.service.registry().contains(disease) { return Err(PredictError::NotFound(disease.to_string()).into()); }
    let payload = FeaturePayload::from_slice(body)?;
    debug!(disease, fields=payload.len(), "payload accepted");

    let service = state.service.clone();
    let id = disease.to_string();
    let started = Instant::now();
    let outcome = tokio::task::spawn_blocking(move || service.predict(&id, &payload))
        .await
        .map_err(|e| ApiError::Internal(format!("inference task failed: {e}")))??;
    state.metrics.inference_latency_ms.with_label_values(&[disease]).observe(started.elapsed().as_secs_f64() * 1000.0);
    Ok(outcome)
}

pub async fn metrics(State(state): State<AppState>) -> Response { state.metrics.response() }

pub async fn not_found() -> ApiError { ApiError::RouteNotFound }
