use std::sync::Arc;

use critic_core::CriticConfig;

use crate::queue::{ReviewQueue, ReviewRunner};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<CriticConfig>,
    pub queue: ReviewQueue,
}

impl AppState {
    /// Build the state and spawn the review workers described by
    /// `config.server`.
    pub fn new(config: Arc<CriticConfig>, runner: Arc<dyn ReviewRunner>) -> Self {
        let (queue, _workers) = ReviewQueue::start(
            runner,
            config.server.workers,
            config.server.queue_capacity,
            config.server.retain_finished,
        );
        Self { config, queue }
    }
}
