//! Documentation of a traffic congestion backend.
//!
//! Sensors post vehicle counts for a location, the server estimates
//! congestion with a small regression network, stores the reading and
//! pushes the enriched reading to every connected dashboard.
//!
//!
//!
//! # Routes
//!
//! - `POST /api/traffic-data`: `{location, vehicles}` → `201` with `{id, location, vehicles, timestamp, prediction}`
//! - `GET /api/traffic-data?location=&limit=`: newest readings first, default limit 10
//! - `GET /ws`: WebSocket, one `prediction` event per successful ingest
//!
//! Client errors answer `{error}`, server errors `{error, details}`.
//!
//!
//!
//! # Ingest
//!
//! 1. Validate: non-empty location, finite non-negative vehicle count
//! 2. Predict: trains the model on first use, then reuses it
//! 3. Store: Redis, server-assigned id and timestamp
//! 4. Broadcast the stored reading with its prediction attached
//! 5. Respond `201` with the same payload
//!
//! Prediction runs before the write so a failed prediction never leaves a
//! stored reading behind an error response.
//!
//!
//!
//! # Startup
//!
//! - Redis connection happens in the background, retried every `DB_RETRY_SECS` forever
//! - Requests before the connection exists answer `500`
//! - A failed bind is logged and the process idles until Ctrl+C / SIGTERM
//!
//!
//!
//! # Environment
//!
//! | Variable        | Default                  |
//! |-----------------|--------------------------|
//! | `PORT`          | `5000`                   |
//! | `REDIS_URL`     | `redis://127.0.0.1:6379` |
//! | `DB_RETRY_SECS` | `5`                      |
//! | `RUST_LOG`      | unset (errors only)      |
//!
//!
//!
//! # Commands
//!
//! Run locally.
//! ```sh
//! RUST_LOG=info cargo run -p traffic
//! ```
//!
//! Send a reading.
//! ```sh
//! curl -X POST localhost:5000/api/traffic-data -H 'Content-Type: application/json' -d '{"location":"Yaba","vehicles":42}'
//! ```
//!
//! Drive it with simulated sensors.
//! ```sh
//! cargo run -p simulator -- --interval 10
//! ```
use std::{sync::Arc, time::Duration};

use axum::{
    Router,
    http::{Method, header::CONTENT_TYPE},
    routing::get,
};
use common::{API_PATH, EVENTS_PATH, FixedInterval};
use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt};

pub mod broadcast;
pub mod config;
pub mod database;
pub mod error;
pub mod predict;
pub mod routes;
pub mod state;
pub mod utils;

use broadcast::events_handler;
use config::Config;
use database::RedisStore;
use predict::Predictor;
use routes::{ingest_handler, readings_handler};
use state::AppState;

pub async fn start_server() {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return;
        }
    };

    let store = match RedisStore::new(&config.redis_url) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            error!("Invalid REDIS_URL: {e}");
            return;
        }
    };

    info!("Connecting to Redis in the background...");
    let policy = FixedInterval::forever(config.db_retry_interval);
    let connecting = store.clone();
    tokio::spawn(async move {
        if let Err(e) = connecting.connect(&policy).await {
            error!("Redis connection abandoned: {e}");
        }
    });

    info!("Initializing state...");
    let state = AppState::new(config, store, Predictor::default());

    info!("Starting server...");
    let app = router(state.clone());

    let address = format!("0.0.0.0:{}", state.config.port);
    info!("Binding to {address}");

    let listener = match TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {address}: {e}");
            shutdown_signal().await;
            return;
        }
    };
    info!("Server running on {address}");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        error!("Server error: {e}");
    }

    info!("Server shutting down...");
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    Router::new()
        .route(API_PATH, get(readings_handler).post(ingest_handler))
        .route(EVENTS_PATH, get(events_handler))
        .layer(cors)
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                terminate.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }

        info!("Received terminate signal, shutting down");
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
