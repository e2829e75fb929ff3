use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub const DEFAULT_ENDPOINT: &str = "http://localhost:5000/api/traffic-data";

pub const INTERVAL_SECS: u64 = 30;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);
pub const MAX_ATTEMPTS: u32 = 3;
pub const RETRY_BACKOFF: u32 = 2;
pub const STATS_EVERY: u64 = 5;

pub const USER_AGENT: &str = "Traffic-IoT-Simulator/1.0";
pub const SIMULATOR_ID_HEADER: &str = "x-simulator-id";
pub const SIMULATOR_ID: &str = "iot-traffic-simulator";

/// Hours are West Africa Time (UTC+1).
pub const WAT_OFFSET_HOURS: u32 = 1;

pub struct Location {
    pub name: &'static str,
    pub latitude: f64,
    pub longitude: f64,
    /// Scales the time-of-day vehicle range.
    pub factor: f64,
}

pub const LOCATIONS: [Location; 8] = [
    Location {
        name: "Ikeja",
        latitude: 6.5998,
        longitude: 3.3460,
        factor: 1.2,
    },
    Location {
        name: "Victoria Island",
        latitude: 6.4295,
        longitude: 3.4236,
        factor: 1.3,
    },
    Location {
        name: "Surulere",
        latitude: 6.5537,
        longitude: 3.3660,
        factor: 1.0,
    },
    Location {
        name: "Lekki",
        latitude: 6.4654,
        longitude: 3.5660,
        factor: 1.1,
    },
    Location {
        name: "Apapa",
        latitude: 6.4489,
        longitude: 3.3590,
        factor: 1.4,
    },
    Location {
        name: "Marina",
        latitude: 6.4434,
        longitude: 3.4000,
        factor: 0.9,
    },
    Location {
        name: "Yaba",
        latitude: 6.5095,
        longitude: 3.3711,
        factor: 1.1,
    },
    Location {
        name: "Ikoyi",
        latitude: 6.4522,
        longitude: 3.4358,
        factor: 0.8,
    },
];

/// Vehicle range for hours in `[start_hour, end_hour)`, wrapping past midnight
/// when `start_hour > end_hour`.
pub struct TrafficPattern {
    pub name: &'static str,
    pub start_hour: u32,
    pub end_hour: u32,
    pub vehicles: (u32, u32),
}

pub const NIGHT: TrafficPattern = TrafficPattern {
    name: "night",
    start_hour: 19,
    end_hour: 5,
    vehicles: (10, 50),
};

pub const TRAFFIC_PATTERNS: [TrafficPattern; 6] = [
    TrafficPattern {
        name: "early_morning",
        start_hour: 5,
        end_hour: 7,
        vehicles: (20, 60),
    },
    TrafficPattern {
        name: "morning_peak",
        start_hour: 7,
        end_hour: 10,
        vehicles: (80, 200),
    },
    TrafficPattern {
        name: "midday",
        start_hour: 10,
        end_hour: 13,
        vehicles: (40, 120),
    },
    TrafficPattern {
        name: "afternoon_peak",
        start_hour: 13,
        end_hour: 16,
        vehicles: (70, 180),
    },
    TrafficPattern {
        name: "evening",
        start_hour: 16,
        end_hour: 19,
        vehicles: (50, 140),
    },
    NIGHT,
];

pub struct SpecialEvent {
    pub name: &'static str,
    pub probability: f64,
    pub multiplier: (f64, f64),
}

pub const SPECIAL_EVENTS: [SpecialEvent; 4] = [
    SpecialEvent {
        name: "accident",
        probability: 0.05,
        multiplier: (2.0, 3.0),
    },
    SpecialEvent {
        name: "road_work",
        probability: 0.03,
        multiplier: (1.5, 2.0),
    },
    SpecialEvent {
        name: "event",
        probability: 0.02,
        multiplier: (1.8, 2.5),
    },
    SpecialEvent {
        name: "rain",
        probability: 0.08,
        multiplier: (1.3, 1.8),
    },
];

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CongestionLevel {
    Low,
    Medium,
    High,
}

/// Body posted to the ingest route. The server reads `location` and
/// `vehicles`; the rest is sensor metadata.
#[derive(Serialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SimulatedReading {
    pub location: String,
    pub vehicles: u32,
    pub prediction: u32,
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: DateTime<Utc>,
    pub congestion_level: CongestionLevel,
}
