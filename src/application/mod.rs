pub mod file_store;

use std::time::Duration;

use crate::application::file_store::DirectoryStore;

/// Bounds of the request read loop.
#[derive(Copy, Clone, Debug)]
pub struct ReadLimits {
    pub timeout: Duration,
    pub max_head_bytes: usize,
    pub max_body_bytes: usize,
}

impl Default for ReadLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_head_bytes: 8 * 1024,
            max_body_bytes: 10 * 1024 * 1024,
        }
    }
}

/// Everything a connection task needs, built once by the launcher and cloned into every task.
///
/// `store` is `None` when no directory was configured; `/files/*` then answers 404.
#[derive(Clone, Debug)]
pub struct ServerData<S = DirectoryStore> {
    pub store: Option<S>,
    pub limits: ReadLimits,
}

impl<S> ServerData<S> {
    pub fn new(store: Option<S>) -> Self {
        Self {
            store,
            limits: ReadLimits::default(),
        }
    }

    pub fn with_limits(mut self, limits: ReadLimits) -> Self {
        self.limits = limits;
        self
    }
}
