//! Seeding the in-memory backends from a JSON dump of a cluster's state.
//!
//! ```json
//! {
//!   "jobs": [{"_id": "...", "status": "queued", "queue": "default", "path": "tasks.Crawl"}],
//!   "workers": [], "scheduled_jobs": [], "logs": [],
//!   "queues": {"default": [{"id": "..."}], "retry_timed_set": [{"id": "...", "score": 1700000000}]}
//! }
//! ```

use std::{collections::HashMap, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::{
    error::StoreError,
    queue::QueueBackend,
    store::{Collection, DocumentStore},
    types::Document,
};

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read snapshot {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed snapshot {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueEntrySnapshot {
    pub id: String,
    pub score: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Snapshot {
    pub jobs: Vec<Document>,
    pub workers: Vec<Document>,
    pub scheduled_jobs: Vec<Document>,
    pub logs: Vec<Document>,
    pub queues: HashMap<String, Vec<QueueEntrySnapshot>>,
}

impl Snapshot {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let contents = tokio::fs::read(path)
            .await
            .map_err(|source| SnapshotError::Read {
                path: display.clone(),
                source,
            })?;
        serde_json::from_slice(&contents).map_err(|source| SnapshotError::Parse {
            path: display,
            source,
        })
    }

    pub async fn seed(
        self,
        store: &dyn DocumentStore,
        queues: &dyn QueueBackend,
    ) -> Result<(), SnapshotError> {
        let collections = [
            (Collection::Jobs, self.jobs),
            (Collection::Workers, self.workers),
            (Collection::ScheduledJobs, self.scheduled_jobs),
            (Collection::Logs, self.logs),
        ];
        for (collection, docs) in collections {
            let count = docs.len();
            for doc in docs {
                store.insert(collection, doc).await?;
            }
            info!(%collection, count, "seeded collection");
        }

        for (queue, entries) in self.queues {
            for entry in &entries {
                queues.enqueue(&queue, &entry.id, entry.score).await?;
            }
            info!(queue = %queue, count = entries.len(), "seeded queue");
        }

        Ok(())
    }
}
