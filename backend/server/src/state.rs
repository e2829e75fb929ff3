use std::sync::Arc;

use crate::{
    broadcast::{Broadcaster, Publisher},
    config::Config,
    database::ReadingStore,
    predict::Predictor,
};

pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn ReadingStore>,
    pub predictor: Predictor,
    pub broadcaster: Broadcaster,
    pub publisher: Arc<dyn Publisher>,
}

impl AppState {
    /// Ingest events go to `broadcaster`, which also feeds the WebSocket route.
    pub fn new(config: Config, store: Arc<dyn ReadingStore>, predictor: Predictor) -> Arc<Self> {
        let broadcaster = Broadcaster::default();

        Arc::new(Self {
            config,
            store,
            predictor,
            publisher: Arc::new(broadcaster.clone()),
            broadcaster,
        })
    }

    /// Same as [`AppState::new`] but ingest events go to `publisher` instead.
    pub fn with_publisher(
        config: Config,
        store: Arc<dyn ReadingStore>,
        predictor: Predictor,
        publisher: Arc<dyn Publisher>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            store,
            predictor,
            broadcaster: Broadcaster::default(),
            publisher,
        })
    }
}
