use serde_json::{json, Value};
use tracing::instrument;

use crate::{
    error::DashboardError,
    filter::{Condition, Filter},
    store::{Collection, DocumentStore, FindOptions},
    types::{parse_object_id, Document},
};

const NO_TRACEBACK: &str = "No exception raised";

async fn job_field(
    store: &dyn DocumentStore,
    job_id: &str,
    field: &str,
) -> Result<Option<Document>, DashboardError> {
    let id = parse_object_id("job", job_id)?;
    let filter = Filter::new().and("_id", Condition::Equals(Value::String(id.to_hex())));
    Ok(store
        .find_one(Collection::Jobs, filter, Some(vec![field.to_string()]))
        .await?)
}

/// `{"result": ..}` for a known job, `{}` otherwise.
#[instrument(skip(store), err)]
pub async fn job_result(store: &dyn DocumentStore, job_id: &str) -> Result<Value, DashboardError> {
    Ok(match job_field(store, job_id, "result").await? {
        Some(job) => json!({ "result": job.get("result").cloned().unwrap_or(Value::Null) }),
        None => json!({}),
    })
}

#[instrument(skip(store), err)]
pub async fn job_traceback(store: &dyn DocumentStore, job_id: &str) -> Result<Value, DashboardError> {
    let traceback = job_field(store, job_id, "traceback")
        .await?
        .and_then(|job| job.get("traceback").cloned())
        .unwrap_or_else(|| Value::from(NO_TRACEBACK));
    Ok(json!({ "traceback": traceback }))
}

/// Every worker that has not stopped, in storage order.
#[instrument(skip_all, err)]
pub async fn active_workers(store: &dyn DocumentStore) -> Result<Vec<Document>, DashboardError> {
    let filter = Filter::new().and("status", Condition::NotIn(vec![Value::from("stop")]));
    Ok(store
        .find(
            Collection::Workers,
            FindOptions {
                filter,
                ..FindOptions::default()
            },
        )
        .await?)
}
