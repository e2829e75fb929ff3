//! # Common
//!
//! Types shared by the server and the simulator.
//!
//! - [`readings`]: wire format of traffic readings, predictions and push events
//! - [`retry`]: retry policies used for the database bootstrap and simulator requests
pub mod readings;
pub mod retry;

pub use readings::{
    API_PATH, EVENTS_PATH, EventFrame, IngestPayload, PREDICTION_EVENT, PredictedReading,
    TrafficReading,
};
pub use retry::{ExponentialBackoff, FixedInterval, RetryPolicy, retry};
