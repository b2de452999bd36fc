use std::collections::HashMap;

use super::worker::Worker;
use crate::error::{BridgeError, Result};

/// Live workers keyed by the url they were created for.
#[derive(Debug, Default)]
pub struct WorkerRegistry {
    workers: HashMap<String, Worker>,
}

impl WorkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a worker, returning the one previously held for the same url.
    pub fn insert(&mut self, worker: Worker) -> Option<Worker> {
        self.workers.insert(worker.url().to_string(), worker)
    }

    pub fn get(&self, url: &str) -> Result<&Worker> {
        self.workers
            .get(url)
            .ok_or_else(|| BridgeError::WorkerNotFound(url.to_string()))
    }

    pub fn remove(&mut self, url: &str) -> Result<Worker> {
        self.workers
            .remove(url)
            .ok_or_else(|| BridgeError::WorkerNotFound(url.to_string()))
    }

    pub fn len(&self) -> usize {
        self.workers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.workers.is_empty()
    }

    pub fn urls(&self) -> Vec<String> {
        let mut urls: Vec<String> = self.workers.keys().cloned().collect();
        urls.sort();
        urls
    }

    /// Terminate and forget every worker.
    pub fn terminate_all(&mut self) {
        if self.is_empty() {
            return;
        }
        tracing::info!("Terminating {} worker(s)", self.len());
        for (url, worker) in self.workers.drain() {
            tracing::debug!("Terminating worker '{}'", url);
            worker.terminate();
        }
    }
}
