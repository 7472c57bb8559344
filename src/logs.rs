//! Cursor-based log tailing for one job or one worker.

use bson::oid::ObjectId;
use serde::Deserialize;
use serde_json::Value;
use tracing::instrument;

use crate::{
    error::DashboardError,
    filter::{Condition, Filter},
    store::{Collection, DocumentStore, FindOptions},
    types::{parse_object_id, LogBatch},
};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogParams {
    pub job: Option<String>,
    pub worker: Option<String>,
    pub last_log_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogScope {
    Job(ObjectId),
    Worker(ObjectId),
}

impl LogScope {
    fn field(&self) -> &'static str {
        match self {
            LogScope::Job(_) => "job",
            LogScope::Worker(_) => "worker",
        }
    }

    fn id(&self) -> ObjectId {
        match self {
            LogScope::Job(id) | LogScope::Worker(id) => *id,
        }
    }
}

impl LogParams {
    /// `job` is used when both are given.
    pub fn scope(&self) -> Result<LogScope, DashboardError> {
        let present = |v: &Option<String>| v.clone().filter(|v| !v.is_empty());

        if let Some(job) = present(&self.job) {
            return Ok(LogScope::Job(parse_object_id("job", &job)?));
        }
        if let Some(worker) = present(&self.worker) {
            return Ok(LogScope::Worker(parse_object_id("worker", &worker)?));
        }
        Err(DashboardError::MissingScope)
    }

    pub fn cursor(&self) -> Result<Option<ObjectId>, DashboardError> {
        match self.last_log_id.as_deref().filter(|v| !v.is_empty()) {
            Some(raw) => parse_object_id("last_log_id", raw).map(Some),
            None => Ok(None),
        }
    }
}

/// Log lines of `scope` stored after `last_seen`, in storage order.
///
/// With nothing new the cursor advances to a freshly generated identifier that
/// is never below `last_seen`. It names no stored line.
#[instrument(skip(store), err)]
pub async fn fetch(
    store: &dyn DocumentStore,
    scope: LogScope,
    last_seen: Option<ObjectId>,
) -> Result<LogBatch, DashboardError> {
    let mut filter = Filter::new().and(
        scope.field(),
        Condition::Equals(Value::String(scope.id().to_hex())),
    );
    if let Some(last_seen) = last_seen {
        filter.push("_id", Condition::GreaterThan(Value::String(last_seen.to_hex())));
    }

    let lines = store
        .find(
            Collection::Logs,
            FindOptions {
                filter,
                projection: Some(vec!["logs".to_string()]),
                ..FindOptions::default()
            },
        )
        .await?;

    let last_stored = lines
        .last()
        .and_then(|line| line.get("_id"))
        .and_then(Value::as_str)
        .and_then(|id| ObjectId::parse_str(id).ok());

    let last_log_id = match last_stored {
        Some(id) => id,
        None => {
            let fresh = ObjectId::new();
            last_seen.map_or(fresh, |seen| seen.max(fresh))
        }
    };

    let logs = lines
        .iter()
        .map(|line| line.get("logs").and_then(Value::as_str).unwrap_or_default())
        .collect::<Vec<_>>()
        .join("\n");

    Ok(LogBatch { logs, last_log_id })
}
