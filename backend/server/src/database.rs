//! # Redis
//!
//! Document store for traffic readings.
//!
//! Readings are append-only: written once at ingest, never updated or
//! deleted, read back newest first with an optional location filter.
//!
//! ## Layout
//!
//! - `traffic:readings:next_id`: counter, `INCR` hands out reading ids
//! - `traffic:readings`: sorted set of JSON documents scored by timestamp (ms)
//! - `traffic:readings:location:{location}`: same set restricted to one location
//!
//! Both sorted sets are written in a single `MULTI`/`EXEC` pipeline so a
//! reading is visible either globally and per location, or not at all.
//! Queries are one `ZREVRANGE` on whichever set matches the filter.
//!
//! ## Connection
//!
//! The [`ConnectionManager`] is created by a background task under a
//! [`RetryPolicy`]. Until it exists every store call fails with
//! [`StoreError::Unavailable`].
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, SubsecRound, Utc};
use common::{RetryPolicy, TrafficReading, retry};
use redis::{
    AsyncCommands, Client, RedisError,
    aio::{ConnectionManager, ConnectionManagerConfig},
};
use thiserror::Error;
use tokio::sync::{OnceCell, RwLock};
use tracing::info;

const NEXT_ID_KEY: &str = "traffic:readings:next_id";
const READINGS_KEY: &str = "traffic:readings";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database connection not established")]
    Unavailable,

    #[error("Redis error: {0}")]
    Redis(#[from] RedisError),

    #[error("Corrupt reading document: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A validated reading that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading {
    pub location: String,
    pub vehicles: f64,
    pub timestamp: DateTime<Utc>,
}

impl NewReading {
    pub fn now(location: String, vehicles: f64) -> Self {
        Self {
            location,
            vehicles,
            timestamp: Utc::now(),
        }
    }

    /// Timestamps are stored at millisecond precision, the resolution of the sorted-set score.
    fn into_reading(self, id: u64) -> TrafficReading {
        TrafficReading {
            id,
            location: self.location,
            vehicles: self.vehicles,
            timestamp: self.timestamp.trunc_subsecs(3),
        }
    }
}

#[async_trait]
pub trait ReadingStore: Send + Sync {
    async fn insert(&self, reading: NewReading) -> Result<TrafficReading, StoreError>;

    /// Newest first, at most `limit` readings.
    async fn recent(
        &self,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TrafficReading>, StoreError>;
}

pub struct RedisStore {
    client: Client,
    connection: OnceCell<ConnectionManager>,
}

impl RedisStore {
    pub fn new(redis_url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(redis_url)?,
            connection: OnceCell::new(),
        })
    }

    /// Connects under `policy`. Returns once connected or once the policy gives up.
    pub async fn connect(&self, policy: &dyn RetryPolicy) -> Result<(), StoreError> {
        if self.connection.initialized() {
            return Ok(());
        }

        let config = ConnectionManagerConfig::new()
            .set_number_of_retries(1)
            .set_connection_timeout(Duration::from_secs(5));

        let client = &self.client;
        let connection_manager = retry(policy, "Redis connection", move || {
            client.get_connection_manager_with_config(config.clone())
        })
        .await?;

        // Only the bootstrap task connects, so a concurrent set is not expected.
        let _ = self.connection.set(connection_manager);
        info!("Connected to Redis");

        Ok(())
    }

    fn connection(&self) -> Result<ConnectionManager, StoreError> {
        self.connection.get().cloned().ok_or(StoreError::Unavailable)
    }
}

fn location_key(location: &str) -> String {
    format!("{READINGS_KEY}:location:{location}")
}

/// Sorted set holding the readings for `location`, or every reading.
fn readings_key(location: Option<&str>) -> String {
    location.map_or_else(|| READINGS_KEY.to_string(), location_key)
}

/// Sorted-set member and score for `reading`.
fn encode(reading: &TrafficReading) -> Result<(String, i64), StoreError> {
    Ok((
        serde_json::to_string(reading)?,
        reading.timestamp.timestamp_millis(),
    ))
}

fn decode(documents: &[String]) -> Result<Vec<TrafficReading>, StoreError> {
    documents
        .iter()
        .map(|document| serde_json::from_str(document).map_err(StoreError::from))
        .collect()
}

/// Inclusive `ZREVRANGE` bounds for the newest `limit` members. `limit` must be non-zero.
fn newest_range(limit: usize) -> (isize, isize) {
    (0, isize::try_from(limit).unwrap_or(isize::MAX) - 1)
}

#[async_trait]
impl ReadingStore for RedisStore {
    async fn insert(&self, reading: NewReading) -> Result<TrafficReading, StoreError> {
        let mut connection = self.connection()?;

        let id: u64 = connection.incr(NEXT_ID_KEY, 1).await?;
        let reading = reading.into_reading(id);

        let (document, score) = encode(&reading)?;

        redis::pipe()
            .atomic()
            .zadd(READINGS_KEY, &document, score)
            .zadd(location_key(&reading.location), &document, score)
            .query_async::<()>(&mut connection)
            .await?;

        Ok(reading)
    }

    async fn recent(
        &self,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TrafficReading>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let mut connection = self.connection()?;
        let (start, stop) = newest_range(limit);

        let documents: Vec<String> = connection
            .zrevrange(readings_key(location), start, stop)
            .await?;

        decode(&documents)
    }
}

/// Process-local store, newest first like [`RedisStore`].
#[derive(Default)]
pub struct MemoryStore {
    next_id: AtomicU64,
    readings: RwLock<Vec<TrafficReading>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.readings.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn insert(&self, reading: NewReading) -> Result<TrafficReading, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let reading = reading.into_reading(id);

        self.readings.write().await.push(reading.clone());

        Ok(reading)
    }

    async fn recent(
        &self,
        location: Option<&str>,
        limit: usize,
    ) -> Result<Vec<TrafficReading>, StoreError> {
        let readings = self.readings.read().await;

        let mut matching: Vec<TrafficReading> = readings
            .iter()
            .filter(|reading| location.is_none_or(|location| reading.location == location))
            .cloned()
            .collect();

        // Equal timestamps: later ids first.
        matching.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        matching.truncate(limit);

        Ok(matching)
    }
}
