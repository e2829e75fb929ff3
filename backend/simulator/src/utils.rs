use chrono::{DateTime, Timelike, Utc};
use rand::Rng;
use tracing::info;

use crate::models::{
    CongestionLevel, LOCATIONS, Location, NIGHT, SPECIAL_EVENTS, SimulatedReading,
    TRAFFIC_PATTERNS, WAT_OFFSET_HOURS,
};

pub fn wat_hour(now: DateTime<Utc>) -> u32 {
    (now.hour() + WAT_OFFSET_HOURS) % 24
}

pub fn vehicle_range(hour: u32) -> (u32, u32) {
    TRAFFIC_PATTERNS
        .iter()
        .find(|pattern| {
            if pattern.start_hour < pattern.end_hour {
                (pattern.start_hour..pattern.end_hour).contains(&hour)
            } else {
                hour >= pattern.start_hour || hour < pattern.end_hour
            }
        })
        .map_or(NIGHT.vehicles, |pattern| pattern.vehicles)
}

/// Product of the multipliers of every special event that fires.
pub fn event_multiplier<R: Rng>(rng: &mut R) -> f64 {
    let mut multiplier = 1.0;

    for event in &SPECIAL_EVENTS {
        if rng.gen_bool(event.probability) {
            let (low, high) = event.multiplier;
            let event_multiplier = rng.gen_range(low..=high);
            multiplier *= event_multiplier;

            info!(
                "Special event detected: {} (multiplier: {event_multiplier:.2})",
                event.name
            );
        }
    }

    multiplier
}

/// Sensor-side estimate for the next 5 minutes, never below 10.
pub fn forecast<R: Rng>(rng: &mut R, current: u32, hour: u32) -> u32 {
    let trend: i64 = match hour {
        6..9 => rng.gen_range(5..=20),
        16..19 => rng.gen_range(5..=15),
        _ => rng.gen_range(-10..=10),
    };

    let prediction = (i64::from(current) + trend).max(10);
    let variation: i64 = rng.gen_range(-15..=15);

    (prediction + variation).max(10) as u32
}

/// Current vehicle count and forecast for `location` at `hour`.
pub fn vehicle_count<R: Rng>(rng: &mut R, hour: u32, location: &Location) -> (u32, u32) {
    let (min_vehicles, max_vehicles) = vehicle_range(hour);

    let adjusted_min = (f64::from(min_vehicles) * location.factor) as u32;
    let adjusted_max = (f64::from(max_vehicles) * location.factor) as u32;

    let multiplier = event_multiplier(rng);
    let final_min = (f64::from(adjusted_min) * multiplier) as u32;
    let final_max = (f64::from(adjusted_max) * multiplier) as u32;

    let current = rng.gen_range(final_min..=final_max);

    (current, forecast(rng, current, hour))
}

pub fn congestion_level(vehicles: u32) -> CongestionLevel {
    match vehicles {
        101.. => CongestionLevel::High,
        51..=100 => CongestionLevel::Medium,
        _ => CongestionLevel::Low,
    }
}

/// One reading per location, all stamped `now`.
pub fn generate_batch<R: Rng>(rng: &mut R, now: DateTime<Utc>) -> Vec<SimulatedReading> {
    let hour = wat_hour(now);

    LOCATIONS
        .iter()
        .map(|location| {
            let (vehicles, prediction) = vehicle_count(rng, hour, location);

            SimulatedReading {
                location: location.name.to_string(),
                vehicles,
                prediction,
                latitude: location.latitude,
                longitude: location.longitude,
                timestamp: now,
                congestion_level: congestion_level(vehicles),
            }
        })
        .collect()
}
