//! # Traffic Simulator
//!
//! Stands in for the roadside sensors.
//!
//! ## Loop
//!
//! - Every interval, one reading per location is generated and posted concurrently
//! - Vehicle counts follow a time-of-day pattern (West Africa Time), scaled per location
//! - Special events (accident, road work, event, rain) randomly multiply the count
//! - Each reading carries a sensor-side forecast and a congestion level
//!
//! ## Delivery
//!
//! - 15 second timeout per request
//! - Up to 3 attempts per reading, waiting 2s then 4s
//! - `200` and `201` count as success; anything else is retried
//!
//! Statistics are logged every 5 batches and on exit.
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::{Result, bail};
use chrono::{DateTime, Utc};
use common::{ExponentialBackoff, PredictedReading, retry};
use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderValue},
};
use tokio::{signal::ctrl_c, task::JoinSet, time::sleep};
use tracing::{error, info};

pub mod models;
pub mod utils;

use models::{
    LOCATIONS, MAX_ATTEMPTS, REQUEST_TIMEOUT, RETRY_BACKOFF, SIMULATOR_ID, SIMULATOR_ID_HEADER,
    STATS_EVERY, SimulatedReading, USER_AGENT,
};
use utils::generate_batch;

pub struct Settings {
    pub endpoint: String,
    pub interval: Duration,
    /// Stop after this many batches; run until Ctrl+C otherwise.
    pub batches: Option<u64>,
}

#[derive(Debug, Default, Clone)]
pub struct Stats {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub last_success: Option<DateTime<Utc>>,
    pub locations_sent: usize,
}

impl Stats {
    /// Share of HTTP attempts that succeeded, in percent.
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            return 0.0;
        }

        self.successful_requests as f64 / self.total_requests as f64 * 100.0
    }
}

pub struct Simulator {
    client: Client,
    endpoint: String,
    policy: ExponentialBackoff,
    stats: Mutex<Stats>,
}

impl Simulator {
    pub fn new(endpoint: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(SIMULATOR_ID_HEADER, HeaderValue::from_static(SIMULATOR_ID));

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
            policy: ExponentialBackoff {
                base: Duration::from_secs(1),
                factor: RETRY_BACKOFF,
                max_delay: Duration::from_secs(60),
                max_attempts: Some(MAX_ATTEMPTS),
            },
            stats: Mutex::new(Stats::default()),
        })
    }

    pub fn stats(&self) -> Stats {
        self.stats
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, update: impl FnOnce(&mut Stats)) {
        update(&mut self.stats.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// One HTTP attempt. Returns the server's prediction when the response carries one.
    async fn post(&self, reading: &SimulatedReading) -> Result<Option<f64>> {
        self.record(|stats| stats.total_requests += 1);

        let response = match self.client.post(&self.endpoint).json(reading).send().await {
            Ok(response) => response,
            Err(e) if e.is_timeout() => bail!("timeout"),
            Err(e) if e.is_connect() => bail!("connection error: {e}"),
            Err(e) => bail!("request error: {e}"),
        };

        let status = response.status();
        if status != StatusCode::OK && status != StatusCode::CREATED {
            let body = response.text().await.unwrap_or_default();
            bail!("HTTP {status} - {body}");
        }

        Ok(response
            .json::<PredictedReading>()
            .await
            .ok()
            .map(|predicted| predicted.prediction))
    }

    async fn send_reading(self: Arc<Self>, reading: SimulatedReading) -> bool {
        let simulator = &*self;
        let reading = &reading;

        let result = retry(&self.policy, &reading.location, move || {
            simulator.post(reading)
        })
        .await;

        match result {
            Ok(prediction) => {
                self.record(|stats| {
                    stats.successful_requests += 1;
                    stats.last_success = Some(Utc::now());
                });

                match prediction {
                    Some(prediction) => info!(
                        "{}: {} vehicles (server prediction: {prediction})",
                        reading.location, reading.vehicles
                    ),
                    None => info!("{}: {} vehicles", reading.location, reading.vehicles),
                }

                true
            }
            Err(e) => {
                self.record(|stats| stats.failed_requests += 1);
                error!(
                    "{}: failed after {MAX_ATTEMPTS} attempts: {e}",
                    reading.location
                );

                false
            }
        }
    }

    /// Posts one reading per location concurrently. Returns how many were accepted.
    pub async fn send_batch(self: &Arc<Self>) -> usize {
        let now = Utc::now();
        let batch = generate_batch(&mut rand::thread_rng(), now);

        info!(
            "Sending data for all {} locations at {}...",
            batch.len(),
            now.format("%H:%M:%S")
        );

        let mut tasks = JoinSet::new();
        for reading in batch {
            tasks.spawn(Arc::clone(self).send_reading(reading));
        }

        let mut accepted = 0;
        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(true) => accepted += 1,
                Ok(false) => {}
                Err(e) => error!("Send task failed: {e}"),
            }
        }

        self.record(|stats| stats.locations_sent = LOCATIONS.len());
        info!(
            "Batch completed: {accepted}/{} locations accepted",
            LOCATIONS.len()
        );

        accepted
    }

    pub fn log_stats(&self) {
        let stats = self.stats();

        info!("Simulation statistics:");
        info!("  Total requests: {}", stats.total_requests);
        info!(
            "  Successful: {} ({:.1}%)",
            stats.successful_requests,
            stats.success_rate()
        );
        info!("  Failed: {}", stats.failed_requests);
        info!("  Locations: {}", stats.locations_sent);

        if let Some(last_success) = stats.last_success {
            info!("  Last success: {}", last_success.format("%H:%M:%S"));
        }
    }
}

pub async fn run(settings: Settings) -> Result<()> {
    let simulator = Arc::new(Simulator::new(&settings.endpoint)?);

    info!("Starting traffic simulation...");
    info!("Monitoring {} locations", LOCATIONS.len());
    info!("Update interval: {:?}", settings.interval);
    info!("Backend URL: {}", settings.endpoint);

    let progress = match settings.batches {
        Some(batches) => {
            let pb = ProgressBar::new(batches);
            pb.set_style(
                ProgressStyle::with_template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
                )?
                .progress_chars("=> "),
            );
            Some(pb)
        }
        None => None,
    };

    let mut completed = 0;

    loop {
        tokio::select! {
            _ = simulator.send_batch() => {}
            _ = ctrl_c() => {
                info!("Simulation stopped by user");
                break;
            }
        }

        completed += 1;
        if let Some(pb) = &progress {
            pb.set_message(format!("Batch {completed}"));
            pb.inc(1);
        }

        if completed % STATS_EVERY == 0 {
            simulator.log_stats();
        }

        if settings.batches.is_some_and(|batches| completed >= batches) {
            break;
        }

        info!("Waiting {:?} until next update...", settings.interval);
        tokio::select! {
            _ = sleep(settings.interval) => {}
            _ = ctrl_c() => {
                info!("Simulation stopped by user");
                break;
            }
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message("Done");
    }
    simulator.log_stats();

    Ok(())
}
