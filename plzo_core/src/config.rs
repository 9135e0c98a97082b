use crate::error::{invalid_config, Result};
use crate::format::{DEFAULT_WORKERS, MAX_WORKERS};
use crate::pool::Backend;

/// Settings fixed for the whole of a compression run.
///
/// Passed explicitly to the engine; nothing here is process-global, so runs
/// with different worker counts can proceed side by side. Decompression
/// ignores `workers` and uses the count recorded in the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub workers: usize,
    pub backend: Backend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            backend: Backend::default(),
        }
    }
}

impl EngineConfig {
    pub fn new(workers: usize, backend: Backend) -> Self {
        Self { workers, backend }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 || self.workers > MAX_WORKERS {
            return Err(invalid_config(format!(
                "worker count must be in 1..={}, got {}",
                MAX_WORKERS, self.workers
            )));
        }
        Ok(())
    }
}
