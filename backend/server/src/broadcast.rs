//! # Push Channel
//!
//! Every successful ingest is pushed to all connected WebSocket clients as
//! a text frame:
//!
//! ```json
//! {"event": "prediction", "data": {"id": 1, "location": "Yaba", "vehicles": 42.0, "timestamp": "...", "prediction": 47.3}}
//! ```
//!
//! Fire-and-forget: no acknowledgement, no per-client filtering, no replay
//! for clients that connect later. A client that falls more than
//! [`CHANNEL_CAPACITY`] frames behind skips the frames it missed.
use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use common::{EventFrame, PredictedReading};
use tokio::sync::broadcast::{self, Receiver, Sender, error::RecvError};
use tracing::{debug, info, warn};

use crate::state::AppState;

pub const CHANNEL_CAPACITY: usize = 100;

/// Capability the API layer uses to announce enriched readings.
pub trait Publisher: Send + Sync {
    fn publish(&self, event: &str, reading: &PredictedReading);
}

#[derive(Clone)]
pub struct Broadcaster {
    sender: Sender<String>,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new(CHANNEL_CAPACITY)
    }
}

impl Broadcaster {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);

        Self { sender }
    }

    pub fn subscribe(&self) -> Receiver<String> {
        self.sender.subscribe()
    }
}

impl Publisher for Broadcaster {
    fn publish(&self, event: &str, reading: &PredictedReading) {
        let frame = match serde_json::to_string(&EventFrame::new(event, reading)) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode {event} event: {e}");
                return;
            }
        };

        // An error only means nobody is listening.
        match self.sender.send(frame) {
            Ok(receivers) => debug!("Published {event} to {receivers} subscribers"),
            Err(_) => debug!("Published {event} with no subscribers"),
        }
    }
}

pub async fn events_handler(
    State(state): State<Arc<AppState>>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let events = state.broadcaster.subscribe();

    upgrade.on_upgrade(move |socket| stream_events(socket, events))
}

async fn stream_events(mut socket: WebSocket, mut events: Receiver<String>) {
    info!("Push client connected");

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(frame) => {
                    if socket.send(Message::Text(frame.into())).await.is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Push client lagged, skipped {skipped} events");
                }
                Err(RecvError::Closed) => break,
            },
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    info!("Push client disconnected");
}
