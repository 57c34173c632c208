use std::sync::Arc;
use tokio::sync::Semaphore;

use crate::errors::{ServiceError, ServiceResult};

/// Bounded pool for filesystem and CPU heavy work (ZIP reading/writing,
/// manifest parsing). Keeps large uploads from starving the async workers.
#[derive(Clone)]
pub struct BlockingPool {
    semaphore: Arc<Semaphore>,
    size: usize,
}

impl BlockingPool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `work` on the blocking thread pool once a permit is free.
    pub async fn run<F, T>(&self, work: F) -> ServiceResult<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ServiceError::BackgroundTask("blocking pool closed".to_string()))?;

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            work()
        })
        .await
        .map_err(|e| ServiceError::BackgroundTask(format!("blocking task failed: {}", e)))
    }
}
