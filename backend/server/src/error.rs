use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{database::StoreError, predict::PredictionError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("No traffic data found")]
    NotFound,

    #[error("Failed to access traffic data")]
    Store(#[from] StoreError),

    #[error("Failed to predict congestion")]
    Prediction(#[from] PredictionError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            AppError::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Store { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Prediction(PredictionError::InvalidInput(_)) => StatusCode::BAD_REQUEST,
            AppError::Prediction { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = match &self {
            AppError::Prediction(e @ PredictionError::InvalidInput(_)) => {
                json!({ "error": e.to_string() })
            }
            AppError::Store(e) => json!({ "error": self.to_string(), "details": e.to_string() }),
            AppError::Prediction(e) => {
                json!({ "error": self.to_string(), "details": e.to_string() })
            }
            _ => json!({ "error": self.to_string() }),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use serde_json::Value;

    use super::*;

    async fn render(error: AppError) -> (StatusCode, Value) {
        let response = error.into_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_client_errors() {
        let (status, body) = render(AppError::InvalidInput("Location is required".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Location is required");
        assert!(body.get("details").is_none());

        let (status, _) = render(AppError::MalformedPayload("expected value".into())).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = render(AppError::NotFound).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No traffic data found");
    }

    #[tokio::test]
    async fn test_rejected_prediction_input_is_a_client_error() {
        let (status, body) =
            render(AppError::Prediction(PredictionError::InvalidInput(-5.0))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(
            body["error"],
            "Vehicle count must be a non-negative finite number, got -5"
        );
        assert!(body.get("details").is_none());
    }

    #[tokio::test]
    async fn test_server_errors_carry_details() {
        let (status, body) = render(AppError::Store(StoreError::Unavailable)).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to access traffic data");
        assert_eq!(body["details"], "Database connection not established");

        let (status, body) = render(AppError::Prediction(PredictionError::TrainingFailure(
            "loss diverged".into(),
        )))
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["details"], "Model training failed: loss diverged");
    }
}
