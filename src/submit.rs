use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bson::oid::ObjectId;
use serde_json::Value;
use tracing::instrument;

use crate::{
    error::StoreError,
    queue::QueueBackend,
    store::{Collection, DocumentStore},
    types::Document,
};

/// Task run by workers to apply a dashboard job action.
pub const JOB_ACTION_TASK: &str = "mrq.basetasks.utils.JobAction";

/// Queues new jobs for workers to pick up.
#[async_trait]
pub trait JobSubmitter: Send + Sync {
    async fn queue_job(
        &self,
        task: &str,
        params: Document,
        queue: &str,
    ) -> Result<ObjectId, StoreError>;
}

/// Turns a job action form into task parameters. A `status` holding several
/// statuses joined by `-` becomes a list.
pub fn job_action_params(form: HashMap<String, String>) -> Document {
    form.into_iter()
        .map(|(key, value)| {
            let value = if key == "status" && value.contains('-') {
                Value::Array(value.split('-').map(Value::from).collect())
            } else {
                Value::String(value)
            };
            (key, value)
        })
        .collect()
}

/// Writes the job record to the document store, then pushes its id onto the queue.
pub struct MemoryJobSubmitter {
    store: Arc<dyn DocumentStore>,
    queues: Arc<dyn QueueBackend>,
}

impl MemoryJobSubmitter {
    pub fn new(store: Arc<dyn DocumentStore>, queues: Arc<dyn QueueBackend>) -> Self {
        Self { store, queues }
    }
}

#[async_trait]
impl JobSubmitter for MemoryJobSubmitter {
    #[instrument(skip(self, params), err, fields(params_size = params.len()))]
    async fn queue_job(
        &self,
        task: &str,
        params: Document,
        queue: &str,
    ) -> Result<ObjectId, StoreError> {
        let mut job = Document::new();
        job.insert("path".to_string(), Value::from(task));
        job.insert("params".to_string(), Value::Object(params));
        job.insert("queue".to_string(), Value::from(queue));
        job.insert("status".to_string(), Value::from("queued"));
        job.insert(
            "datequeued".to_string(),
            Value::from(chrono::Utc::now().to_rfc3339()),
        );

        let id = self.store.insert(Collection::Jobs, job).await?;
        self.queues.enqueue(queue, &id.to_hex(), None).await?;

        Ok(id)
    }
}
