use std::{collections::HashMap, fmt, sync::Arc};

use async_trait::async_trait;
use bson::oid::ObjectId;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::instrument;

use crate::{
    error::StoreError,
    filter::{compare_values, lookup, Filter},
    types::{Document, GroupCount},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Jobs,
    Workers,
    ScheduledJobs,
    Logs,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Jobs => "mrq_jobs",
            Collection::Workers => "mrq_workers",
            Collection::ScheduledJobs => "mrq_scheduled_jobs",
            Collection::Logs => "mrq_logs",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub direction: Direction,
}

impl SortKey {
    pub fn ascending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Ascending,
        }
    }

    pub fn descending(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Descending,
        }
    }
}

/// A filtered, sorted and windowed read.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub skip: u64,
    /// `None` reads to the end of the result set.
    pub limit: Option<u64>,
    /// Top-level fields to return; `_id` is always kept.
    pub projection: Option<Vec<String>>,
}

/// Read access to the persistent database of jobs, workers, scheduled jobs and logs.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(
        &self,
        collection: Collection,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError>;

    /// Counts matching documents grouped by the values of `keys`. A single key
    /// groups by its value, several keys by an object of them. Groups come
    /// back in order of first appearance.
    async fn group_count(
        &self,
        collection: Collection,
        filter: &Filter,
        keys: &[&str],
    ) -> Result<Vec<GroupCount>, StoreError>;

    /// Stores a document, assigning `_id` when it has none.
    async fn insert(&self, collection: Collection, doc: Document) -> Result<ObjectId, StoreError>;

    async fn find_one(
        &self,
        collection: Collection,
        filter: Filter,
        projection: Option<Vec<String>>,
    ) -> Result<Option<Document>, StoreError> {
        let options = FindOptions {
            filter,
            limit: Some(1),
            projection,
            ..FindOptions::default()
        };
        Ok(self.find(collection, options).await?.into_iter().next())
    }
}

fn project(doc: &Document, fields: &[String]) -> Document {
    doc.iter()
        .filter(|(key, _)| key.as_str() == "_id" || fields.iter().any(|f| f == *key))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn group_key(doc: &Document, keys: &[&str]) -> Value {
    match keys {
        [key] => lookup(doc, key).cloned().unwrap_or(Value::Null),
        _ => Value::Object(
            keys.iter()
                .map(|key| {
                    let value = lookup(doc, key).cloned().unwrap_or(Value::Null);
                    (key.to_string(), value)
                })
                .collect::<Map<String, Value>>(),
        ),
    }
}

/// Documents kept in insertion order per collection.
pub struct MemoryDocumentStore {
    collections: Arc<RwLock<HashMap<Collection, Vec<Document>>>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            collections: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    #[instrument(skip_all, err, fields(%collection, skip = options.skip, limit = options.limit))]
    async fn find(
        &self,
        collection: Collection,
        options: FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        let collections = self.collections.read().await;
        let Some(docs) = collections.get(&collection) else {
            return Ok(Vec::new());
        };

        let mut matched: Vec<&Document> = docs.iter().filter(|d| options.filter.matches(d)).collect();

        if !options.sort.is_empty() {
            matched.sort_by(|a, b| {
                options
                    .sort
                    .iter()
                    .map(|key| {
                        let null = Value::Null;
                        let x = lookup(a, &key.field).unwrap_or(&null);
                        let y = lookup(b, &key.field).unwrap_or(&null);
                        match key.direction {
                            Direction::Ascending => compare_values(x, y),
                            Direction::Descending => compare_values(y, x),
                        }
                    })
                    .find(|ord| ord.is_ne())
                    .unwrap_or(std::cmp::Ordering::Equal)
            });
        }

        let window = matched
            .into_iter()
            .skip(usize::try_from(options.skip).unwrap_or(usize::MAX))
            .take(options.limit.map_or(usize::MAX, |l| usize::try_from(l).unwrap_or(usize::MAX)));

        Ok(match &options.projection {
            Some(fields) => window.map(|d| project(d, fields)).collect(),
            None => window.cloned().collect(),
        })
    }

    #[instrument(skip_all, err, fields(%collection))]
    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(&collection)
            .map_or(0, |docs| docs.iter().filter(|d| filter.matches(d)).count() as u64))
    }

    #[instrument(skip_all, err, fields(%collection, ?keys))]
    async fn group_count(
        &self,
        collection: Collection,
        filter: &Filter,
        keys: &[&str],
    ) -> Result<Vec<GroupCount>, StoreError> {
        let collections = self.collections.read().await;
        let mut groups: Vec<GroupCount> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();

        for doc in collections.get(&collection).into_iter().flatten() {
            if !filter.matches(doc) {
                continue;
            }
            let key = group_key(doc, keys);
            let slot = *index.entry(key.to_string()).or_insert_with(|| {
                groups.push(GroupCount {
                    key: key.clone(),
                    jobs: 0,
                });
                groups.len() - 1
            });
            groups[slot].jobs += 1;
        }

        Ok(groups)
    }

    #[instrument(skip_all, err, fields(%collection))]
    async fn insert(&self, collection: Collection, mut doc: Document) -> Result<ObjectId, StoreError> {
        let id = match doc.get("_id").and_then(Value::as_str).map(ObjectId::parse_str) {
            Some(Ok(id)) => id,
            _ => ObjectId::new(),
        };
        doc.insert("_id".to_string(), Value::String(id.to_hex()));

        let mut collections = self.collections.write().await;
        collections.entry(collection).or_default().push(doc);

        Ok(id)
    }
}
