use std::sync::Arc;

use axum::{
    Json,
    extract::{
        Query, State,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
};
use common::{IngestPayload, PREDICTION_EVENT, PredictedReading, TrafficReading};
use serde::Deserialize;
use tracing::{error, info};

use crate::{
    error::AppError,
    state::AppState,
    utils::{parse_limit, parse_location, validate_payload},
};

#[derive(Debug, Default, Deserialize)]
pub struct ReadingsQuery {
    pub location: Option<String>,
    pub limit: Option<String>,
}

/// Predicts, stores, broadcasts. The prediction runs first so a failure
/// there leaves nothing stored.
pub async fn ingest_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<IngestPayload>, JsonRejection>,
) -> Result<(StatusCode, Json<PredictedReading>), AppError> {
    let Json(payload) = payload.map_err(|e| AppError::MalformedPayload(e.body_text()))?;
    let reading = validate_payload(payload)?;

    let prediction = state
        .predictor
        .predict(reading.vehicles)
        .await
        .inspect_err(|e| error!("Prediction failed for {}: {e}", reading.location))?;

    let reading = state
        .store
        .insert(reading)
        .await
        .inspect_err(|e| error!("Failed to store reading: {e}"))?;

    info!(
        "Stored reading {} at {}: {} vehicles, predicted {prediction}",
        reading.id, reading.location, reading.vehicles
    );

    let predicted = PredictedReading {
        reading,
        prediction,
    };
    state.publisher.publish(PREDICTION_EVENT, &predicted);

    Ok((StatusCode::CREATED, Json(predicted)))
}

pub async fn readings_handler(
    State(state): State<Arc<AppState>>,
    query: Result<Query<ReadingsQuery>, QueryRejection>,
) -> Result<Json<Vec<TrafficReading>>, AppError> {
    let Query(query) = query.map_err(|e| AppError::MalformedPayload(e.body_text()))?;

    let location = parse_location(query.location.as_deref());
    let limit = parse_limit(query.limit.as_deref())?;

    let readings = state
        .store
        .recent(location, limit)
        .await
        .inspect_err(|e| error!("Failed to fetch readings: {e}"))?;

    if readings.is_empty() {
        return Err(AppError::NotFound);
    }

    Ok(Json(readings))
}
