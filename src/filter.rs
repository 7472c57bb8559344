//! Structured filters over stored documents, and the translation of job-table
//! request parameters into one.

use std::cmp::Ordering;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::{
    error::DashboardError,
    queue::QueueBackend,
    types::{parse_object_id, Document},
};

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    GreaterThan(Value),
}

impl Condition {
    fn matches(&self, value: Option<&Value>) -> bool {
        let value = value.unwrap_or(&Value::Null);
        match self {
            Condition::Equals(expected) => equals(value, expected),
            Condition::In(set) => set.iter().any(|expected| equals(value, expected)),
            Condition::NotIn(set) => !set.iter().any(|expected| equals(value, expected)),
            Condition::GreaterThan(bound) => {
                same_kind(value, bound) && compare_values(value, bound) == Ordering::Greater
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Clause {
    /// Dotted path into the document, e.g. `params.url`.
    pub field: String,
    pub condition: Condition,
}

/// Conjunction of clauses. The empty filter matches every document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    clauses: Vec<Clause>,
}

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn and(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.push(field, condition);
        self
    }

    pub fn push(&mut self, field: impl Into<String>, condition: Condition) {
        self.clauses.push(Clause {
            field: field.into(),
            condition,
        });
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses
            .iter()
            .all(|clause| clause.condition.matches(lookup(doc, &clause.field)))
    }
}

/// Resolves a dotted path against a document.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Total order over JSON values: null, numbers, strings, objects, arrays, booleans.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(value: &Value) -> u8 {
        match value {
            Value::Null => 0,
            Value::Number(_) => 1,
            Value::String(_) => 2,
            Value::Object(_) => 3,
            Value::Array(_) => 4,
            Value::Bool(_) => 5,
        }
    }

    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            let (x, y) = (x.as_f64().unwrap_or(0.0), y.as_f64().unwrap_or(0.0));
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(x, y)| compare_values(x, y))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x
            .iter()
            .zip(y)
            .map(|((kx, vx), (ky, vy))| kx.cmp(ky).then_with(|| compare_values(vx, vy)))
            .find(|ord| ord.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn equals(value: &Value, expected: &Value) -> bool {
    if let (Value::Number(x), Value::Number(y)) = (value, expected) {
        return x.as_f64() == y.as_f64();
    }
    value == expected
        || matches!(value, Value::Array(items) if items.iter().any(|item| item == expected))
}

fn same_kind(a: &Value, b: &Value) -> bool {
    std::mem::discriminant(a) == std::mem::discriminant(b)
}

/// Filter parameters accepted by the jobs table. Keys outside this set are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobQuery {
    pub redisqueue: Option<String>,
    pub queue: Option<String>,
    pub path: Option<String>,
    pub exceptiontype: Option<String>,
    pub status: Option<String>,
    pub id: Option<String>,
    pub worker: Option<String>,
    pub params: Option<String>,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

/// Decodes the `params` parameter into one equality clause per key.
pub fn params_clauses(raw: &str) -> Result<Vec<Clause>, DashboardError> {
    let params: Map<String, Value> =
        serde_json::from_str(raw).map_err(DashboardError::MalformedParamsFilter)?;

    Ok(params
        .into_iter()
        .map(|(key, value)| Clause {
            field: format!("params.{key}"),
            condition: Condition::Equals(value),
        })
        .collect())
}

/// Builds the job collection filter for a request.
///
/// `redisqueue` wins over every other parameter: the filter becomes membership
/// in the identifiers currently enqueued there, capped at `listing_limit`.
pub async fn build_job_filter(
    query: &JobQuery,
    queues: &dyn QueueBackend,
    listing_limit: usize,
) -> Result<Filter, DashboardError> {
    if let Some(queue) = present(&query.redisqueue) {
        let ids = queues
            .list_job_ids(queue, listing_limit)
            .await?
            .into_iter()
            .filter_map(|raw| match bson::oid::ObjectId::parse_str(&raw) {
                Ok(oid) => Some(Value::String(oid.to_hex())),
                Err(_) => {
                    debug!(queue, entry = %raw, "skipping queue entry that is not a job id");
                    None
                }
            })
            .collect();
        return Ok(Filter::new().and("_id", Condition::In(ids)));
    }

    let mut filter = Filter::new();

    for (field, value) in [
        ("queue", &query.queue),
        ("path", &query.path),
        ("exceptiontype", &query.exceptiontype),
    ] {
        if let Some(value) = present(value) {
            filter.push(field, Condition::Equals(Value::String(value.to_string())));
        }
    }

    if let Some(status) = present(&query.status) {
        let mut statuses: Vec<Value> = status
            .split('-')
            .map(|s| Value::String(s.to_string()))
            .collect();
        let condition = if statuses.len() == 1 {
            Condition::Equals(statuses.remove(0))
        } else {
            Condition::In(statuses)
        };
        filter.push("status", condition);
    }

    if let Some(id) = present(&query.id) {
        let oid = parse_object_id("id", id)?;
        filter.push("_id", Condition::Equals(Value::String(oid.to_hex())));
    }

    if let Some(worker) = present(&query.worker) {
        let oid = parse_object_id("worker", worker)?;
        filter.push("worker", Condition::Equals(Value::String(oid.to_hex())));
    }

    if let Some(raw) = present(&query.params) {
        match params_clauses(raw) {
            Ok(clauses) => filter.clauses.extend(clauses),
            Err(err) => warn!(params = raw, error = %err, "ignoring params filter"),
        }
    }

    Ok(filter)
}
