use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::instrument;

use crate::{error::StoreError, types::QueueFlags};

/// Read access to the fast store holding enqueued job pointers.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Names of every queue the backend has seen.
    async fn known_queues(&self) -> Result<Vec<String>, StoreError>;

    async fn size(&self, queue: &str) -> Result<u64, StoreError>;

    /// Up to `limit` entries in dequeue order.
    async fn list_job_ids(&self, queue: &str, limit: usize) -> Result<Vec<String>, StoreError>;

    /// Scores of a sorted queue's entries falling in `[min, max]`.
    async fn scores(&self, queue: &str, min: f64, max: f64) -> Result<Vec<f64>, StoreError>;

    async fn enqueue(&self, queue: &str, entry: &str, score: Option<f64>) -> Result<(), StoreError>;

    fn flags(&self, queue: &str) -> QueueFlags {
        QueueFlags::from_name(queue)
    }
}

#[derive(Debug, Clone)]
struct QueueEntry {
    value: String,
    score: f64,
}

pub struct MemoryQueueBackend {
    queues: Arc<RwLock<HashMap<String, Vec<QueueEntry>>>>,
}

impl MemoryQueueBackend {
    pub fn new() -> Self {
        Self {
            queues: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryQueueBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QueueBackend for MemoryQueueBackend {
    async fn known_queues(&self) -> Result<Vec<String>, StoreError> {
        let queues = self.queues.read().await;
        let mut names: Vec<String> = queues.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    #[instrument(skip(self), err)]
    async fn size(&self, queue: &str) -> Result<u64, StoreError> {
        let queues = self.queues.read().await;
        Ok(queues.get(queue).map_or(0, |entries| entries.len() as u64))
    }

    #[instrument(skip(self), err)]
    async fn list_job_ids(&self, queue: &str, limit: usize) -> Result<Vec<String>, StoreError> {
        let queues = self.queues.read().await;
        Ok(queues
            .get(queue)
            .map(|entries| entries.iter().take(limit).map(|e| e.value.clone()).collect())
            .unwrap_or_default())
    }

    #[instrument(skip(self), err)]
    async fn scores(&self, queue: &str, min: f64, max: f64) -> Result<Vec<f64>, StoreError> {
        let queues = self.queues.read().await;
        Ok(queues
            .get(queue)
            .map(|entries| {
                entries
                    .iter()
                    .map(|e| e.score)
                    .filter(|score| *score >= min && *score <= max)
                    .collect()
            })
            .unwrap_or_default())
    }

    #[instrument(skip(self, entry), err)]
    async fn enqueue(&self, queue: &str, entry: &str, score: Option<f64>) -> Result<(), StoreError> {
        let flags = self.flags(queue);
        let mut queues = self.queues.write().await;
        let entries = queues.entry(queue.to_string()).or_default();

        if flags.is_set {
            entries.retain(|e| e.value != entry);
        }

        let score = score.unwrap_or(0.0);
        let entry = QueueEntry {
            value: entry.to_string(),
            score,
        };

        if flags.is_sorted {
            // after existing entries of equal score, so ties keep arrival order
            let at = entries.partition_point(|e| e.score <= score);
            entries.insert(at, entry);
        } else {
            entries.push(entry);
        }

        Ok(())
    }
}
