use common::IngestPayload;

use crate::{database::NewReading, error::AppError};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 1000;

pub fn validate_payload(payload: IngestPayload) -> Result<NewReading, AppError> {
    let location = payload
        .location
        .as_deref()
        .map(str::trim)
        .filter(|location| !location.is_empty())
        .ok_or_else(|| AppError::InvalidInput("Location is required".to_string()))?;

    let vehicles = payload
        .vehicles
        .filter(|vehicles| vehicles.is_finite() && *vehicles >= 0.0)
        .ok_or_else(|| {
            AppError::InvalidInput("Vehicles must be a non-negative number".to_string())
        })?;

    Ok(NewReading::now(location.to_string(), vehicles))
}

/// An empty location means no filter.
pub fn parse_location(location: Option<&str>) -> Option<&str> {
    location.map(str::trim).filter(|location| !location.is_empty())
}

pub fn parse_limit(limit: Option<&str>) -> Result<usize, AppError> {
    let Some(limit) = limit.map(str::trim).filter(|limit| !limit.is_empty()) else {
        return Ok(DEFAULT_LIMIT);
    };

    match limit.parse::<usize>() {
        Ok(0) | Err(_) => Err(AppError::InvalidInput(format!(
            "Limit must be a positive integer, got {limit:?}"
        ))),
        Ok(limit) => Ok(limit.min(MAX_LIMIT)),
    }
}
