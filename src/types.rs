use bson::oid::ObjectId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::DashboardError;

/// A stored record, keyed by field name. Identifiers live under `_id` as
/// 24-character hex strings.
pub type Document = Map<String, Value>;

/// Parses a document identifier supplied in request parameter `field`.
pub fn parse_object_id(field: &'static str, value: &str) -> Result<ObjectId, DashboardError> {
    ObjectId::parse_str(value).map_err(|_| DashboardError::InvalidIdentifier {
        field,
        value: value.to_string(),
    })
}

/// Ordering modes of a queue in the queue backend.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueFlags {
    pub is_sorted: bool,
    pub is_timed: bool,
    pub is_raw: bool,
    pub is_set: bool,
}

impl QueueFlags {
    pub fn from_name(name: &str) -> Self {
        let ends_with_any = |suffixes: &[&str]| suffixes.iter().any(|s| name.ends_with(s));

        Self {
            is_raw: ends_with_any(&["_raw", "_set", "_sorted_set", "_timed_set"]),
            is_set: ends_with_any(&["_set", "_sorted_set", "_timed_set"]),
            is_sorted: ends_with_any(&["_sorted_set", "_timed_set"]),
            is_timed: name.ends_with("_timed_set"),
        }
    }
}

/// Score range and bucket count a queue histogram is drawn over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GraphWindow {
    pub start: f64,
    pub stop: f64,
    pub slices: usize,
}

/// One row of the `queues` table. Synthesized per request, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueueDescriptor {
    pub name: String,
    /// Queued jobs in the document store.
    pub jobs: u64,
    /// Entries in the queue backend.
    pub size: u64,
    #[serde(flatten)]
    pub flags: QueueFlags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph_config: Option<GraphWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<Vec<u64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jobs_to_dequeue: Option<u64>,
}

impl QueueDescriptor {
    pub fn activity(&self) -> u64 {
        self.jobs + self.size
    }
}

/// Result row of a group-by-count over a collection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupCount {
    #[serde(rename = "_id")]
    pub key: Value,
    pub jobs: u64,
}

/// Log lines newer than a client's cursor, plus the cursor to send next time.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogBatch {
    pub logs: String,
    #[serde(serialize_with = "bson::serde_helpers::serialize_object_id_as_hex_string")]
    pub last_log_id: ObjectId,
}
