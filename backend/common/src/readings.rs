use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const API_PATH: &str = "/api/traffic-data";
pub const EVENTS_PATH: &str = "/ws";
pub const PREDICTION_EVENT: &str = "prediction";

/// One persisted traffic observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficReading {
    pub id: u64,
    pub location: String,
    pub vehicles: f64,
    pub timestamp: DateTime<Utc>,
}

/// A stored reading with the congestion estimate attached. Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictedReading {
    #[serde(flatten)]
    pub reading: TrafficReading,
    pub prediction: f64,
}

/// Ingest request body.
///
/// Both fields are optional at the serde level so that a missing field is
/// reported as a validation failure instead of a deserialization one.
/// Unknown fields sent by sensors (coordinates, congestion level, ...) are
/// ignored.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct IngestPayload {
    pub location: Option<String>,
    pub vehicles: Option<f64>,
}

/// Push channel frame: `{"event": ..., "data": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame<T> {
    pub event: String,
    pub data: T,
}

impl<T> EventFrame<T> {
    pub fn new(event: &str, data: T) -> Self {
        Self {
            event: event.to_string(),
            data,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn reading() -> TrafficReading {
        TrafficReading {
            id: 7,
            location: "Yaba".to_string(),
            vehicles: 42.0,
            timestamp: Utc.with_ymd_and_hms(2025, 3, 1, 8, 30, 0).unwrap(),
        }
    }

    #[test]
    fn test_prediction_is_flattened() {
        let predicted = PredictedReading {
            reading: reading(),
            prediction: 47.25,
        };
        let value = serde_json::to_value(&predicted).unwrap();

        assert_eq!(value["location"], "Yaba");
        assert_eq!(value["vehicles"], 42.0);
        assert_eq!(value["prediction"], 47.25);
        assert_eq!(value["timestamp"], "2025-03-01T08:30:00Z");
        assert!(value.get("reading").is_none());

        let back: PredictedReading = serde_json::from_value(value).unwrap();
        assert_eq!(back, predicted);
    }

    #[test]
    fn test_payload_ignores_sensor_extras() {
        let payload: IngestPayload = serde_json::from_value(json!({
            "location": "Lekki",
            "vehicles": 88,
            "latitude": 6.4654,
            "congestionLevel": "Medium"
        }))
        .unwrap();

        assert_eq!(payload.location.as_deref(), Some("Lekki"));
        assert_eq!(payload.vehicles, Some(88.0));
    }

    #[test]
    fn test_payload_missing_fields() {
        let payload: IngestPayload = serde_json::from_value(json!({ "vehicles": -5 })).unwrap();

        assert!(payload.location.is_none());
        assert_eq!(payload.vehicles, Some(-5.0));
    }

    #[test]
    fn test_event_frame_shape() {
        let frame = EventFrame::new(PREDICTION_EVENT, reading());
        let value = serde_json::to_value(&frame).unwrap();

        assert_eq!(value["event"], "prediction");
        assert_eq!(value["data"]["id"], 7);
    }
}
