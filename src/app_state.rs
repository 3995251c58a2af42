use std::sync::Arc;

use crate::services::queue::JobQueue;

/// Shared application state passed to all route handlers.
///
/// The API process holds only the queue handle: submission enqueues work and
/// status queries read the queue's result backend. Object storage and the
/// model backends are owned by worker processes.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
}

impl AppState {
    pub fn new(queue: JobQueue) -> Self {
        Self {
            queue: Arc::new(queue),
        }
    }
}
