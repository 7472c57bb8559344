//! Per-unit data sources behind `/api/datatables/<unit>`.
//!
//! Queues are synthesized in memory from both backends; every other unit
//! resolves to a descriptor the pagination layer runs against the document
//! store.

use std::{collections::BTreeMap, str::FromStr};

use serde_json::Value;
use tracing::{debug, instrument};

use crate::{
    config::DashboardConfig,
    error::{DashboardError, StoreError},
    filter::{build_job_filter, Condition, Filter, JobQuery},
    histogram,
    queue::QueueBackend,
    store::{Collection, DocumentStore, SortKey},
    types::QueueDescriptor,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityUnit {
    Queues,
    Workers,
    ScheduledJobs,
    Jobs,
}

impl FromStr for EntityUnit {
    type Err = DashboardError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queues" => Ok(EntityUnit::Queues),
            "workers" => Ok(EntityUnit::Workers),
            "scheduled_jobs" => Ok(EntityUnit::ScheduledJobs),
            "jobs" => Ok(EntityUnit::Jobs),
            other => Err(DashboardError::UnknownEntityUnit(other.to_string())),
        }
    }
}

/// A read to run against one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDescriptor {
    pub collection: Collection,
    pub filter: Filter,
    pub sort: Vec<SortKey>,
    pub projection: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedSource {
    /// Already materialized and sorted.
    Synthesized(Vec<Value>),
    Descriptor(SourceDescriptor),
}

/// Backends and settings a unit resolves against.
pub struct SourceContext<'a> {
    pub store: &'a dyn DocumentStore,
    pub queues: &'a dyn QueueBackend,
    pub config: &'a DashboardConfig,
    /// Unix seconds, used for timed queue windows.
    pub now: f64,
}

impl EntityUnit {
    pub async fn resolve(
        self,
        query: &JobQuery,
        show_stopped: bool,
        ctx: &SourceContext<'_>,
    ) -> Result<ResolvedSource, DashboardError> {
        match self {
            EntityUnit::Queues => {
                let rows = queue_descriptors(ctx)
                    .await?
                    .iter()
                    .map(serde_json::to_value)
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(ResolvedSource::Synthesized(rows))
            }
            EntityUnit::Workers => {
                let filter = if show_stopped {
                    Filter::new()
                } else {
                    Filter::new().and("status", Condition::NotIn(vec![Value::from("stop")]))
                };
                Ok(ResolvedSource::Descriptor(SourceDescriptor {
                    collection: Collection::Workers,
                    filter,
                    sort: vec![SortKey::descending("datestarted")],
                    projection: None,
                }))
            }
            EntityUnit::ScheduledJobs => Ok(ResolvedSource::Descriptor(SourceDescriptor {
                collection: Collection::ScheduledJobs,
                filter: Filter::new(),
                sort: Vec::new(),
                projection: None,
            })),
            EntityUnit::Jobs => {
                let filter =
                    build_job_filter(query, ctx.queues, ctx.config.redisqueue_listing_limit)
                        .await?;
                Ok(ResolvedSource::Descriptor(SourceDescriptor {
                    collection: Collection::Jobs,
                    filter,
                    sort: vec![SortKey::ascending("_id")],
                    projection: None,
                }))
            }
        }
    }
}

/// Every known queue with its count of queued jobs in the document store.
///
/// Queues named in the config or known to the queue backend are listed even
/// with nothing queued.
pub async fn all_queues(
    store: &dyn DocumentStore,
    queues: &dyn QueueBackend,
    config: &DashboardConfig,
) -> Result<BTreeMap<String, u64>, StoreError> {
    let mut all: BTreeMap<String, u64> = config
        .raw_queues
        .keys()
        .map(|name| (name.clone(), 0))
        .collect();

    for name in queues.known_queues().await? {
        all.entry(name).or_insert(0);
    }

    let queued = Filter::new().and("status", Condition::Equals(Value::from("queued")));
    for group in store.group_count(Collection::Jobs, &queued, &["queue"]).await? {
        if let Value::String(name) = group.key {
            all.insert(name, group.jobs);
        }
    }

    Ok(all)
}

/// Builds the descriptor for one queue. `graph` and `jobs_to_dequeue` are
/// recomputed from backend state on every call.
pub async fn describe_queue(
    name: String,
    jobs: u64,
    ctx: &SourceContext<'_>,
) -> Result<QueueDescriptor, StoreError> {
    let flags = ctx.queues.flags(&name);
    let size = ctx.queues.size(&name).await?;

    let mut graph_config = None;
    let mut graph = None;
    if flags.is_sorted {
        let window = histogram::resolve_window(
            ctx.config.graph_override(&name),
            flags,
            &ctx.config.graph_defaults,
            ctx.now,
        );
        if let Some(window) = window {
            let scores = ctx.queues.scores(&name, window.start, window.stop).await?;
            graph = Some(histogram::generate(scores, &window));
            graph_config = Some(window);
        }
    }

    let jobs_to_dequeue = if flags.is_timed {
        let due = ctx.queues.scores(&name, f64::NEG_INFINITY, ctx.now).await?;
        Some(due.len() as u64)
    } else {
        None
    };

    Ok(QueueDescriptor {
        name,
        jobs,
        size,
        flags,
        graph_config,
        graph,
        jobs_to_dequeue,
    })
}

/// All queues, busiest (`jobs + size`) first.
#[instrument(skip_all, err)]
pub async fn queue_descriptors(ctx: &SourceContext<'_>) -> Result<Vec<QueueDescriptor>, StoreError> {
    let mut descriptors = Vec::new();
    for (name, jobs) in all_queues(ctx.store, ctx.queues, ctx.config).await? {
        descriptors.push(describe_queue(name, jobs, ctx).await?);
    }

    descriptors.sort_by(|a, b| b.activity().cmp(&a.activity()));
    debug!(count = descriptors.len(), "synthesized queue list");
    Ok(descriptors)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        config::{GraphOverride, RawQueueConfig},
        queue::MemoryQueueBackend,
        store::MemoryDocumentStore,
        types::Document,
    };

    fn doc(value: Value) -> Document {
        value.as_object().cloned().unwrap()
    }

    async fn queued_job(store: &MemoryDocumentStore, queue: &str, status: &str) {
        store
            .insert(Collection::Jobs, doc(json!({"queue": queue, "status": status})))
            .await
            .unwrap();
    }

    #[test]
    fn units_parse_from_path_segments() {
        assert_eq!("queues".parse::<EntityUnit>().unwrap(), EntityUnit::Queues);
        assert_eq!(
            "scheduled_jobs".parse::<EntityUnit>().unwrap(),
            EntityUnit::ScheduledJobs
        );
        assert!(matches!(
            "taskpaths".parse::<EntityUnit>(),
            Err(DashboardError::UnknownEntityUnit(unit)) if unit == "taskpaths"
        ));
    }

    #[tokio::test]
    async fn workers_hide_stopped_unless_asked() {
        let store = MemoryDocumentStore::new();
        let queues = MemoryQueueBackend::new();
        let config = DashboardConfig::default();
        let ctx = SourceContext {
            store: &store,
            queues: &queues,
            config: &config,
            now: 0.0,
        };

        let hidden = EntityUnit::Workers
            .resolve(&JobQuery::default(), false, &ctx)
            .await
            .unwrap();
        let ResolvedSource::Descriptor(hidden) = hidden else {
            panic!("workers should resolve to a descriptor");
        };
        assert!(!hidden.filter.matches(&doc(json!({"status": "stop"}))));
        assert!(hidden.filter.matches(&doc(json!({"status": "wait"}))));
        assert_eq!(hidden.sort, vec![SortKey::descending("datestarted")]);

        let shown = EntityUnit::Workers
            .resolve(&JobQuery::default(), true, &ctx)
            .await
            .unwrap();
        let ResolvedSource::Descriptor(shown) = shown else {
            panic!("workers should resolve to a descriptor");
        };
        assert!(shown.filter.is_empty());
    }

    #[tokio::test]
    async fn jobs_and_scheduled_jobs_resolve_to_their_collections() {
        let store = MemoryDocumentStore::new();
        let queues = MemoryQueueBackend::new();
        let config = DashboardConfig::default();
        let ctx = SourceContext {
            store: &store,
            queues: &queues,
            config: &config,
            now: 0.0,
        };

        let query = JobQuery {
            path: Some("tasks.crawl".into()),
            ..JobQuery::default()
        };
        let ResolvedSource::Descriptor(jobs) =
            EntityUnit::Jobs.resolve(&query, false, &ctx).await.unwrap()
        else {
            panic!("jobs should resolve to a descriptor");
        };
        assert_eq!(jobs.collection, Collection::Jobs);
        assert_eq!(jobs.sort, vec![SortKey::ascending("_id")]);
        assert_eq!(jobs.filter.clauses().len(), 1);

        let ResolvedSource::Descriptor(scheduled) = EntityUnit::ScheduledJobs
            .resolve(&query, false, &ctx)
            .await
            .unwrap()
        else {
            panic!("scheduled jobs should resolve to a descriptor");
        };
        assert_eq!(scheduled.collection, Collection::ScheduledJobs);
        assert!(scheduled.filter.is_empty());
        assert!(scheduled.sort.is_empty());
    }

    #[tokio::test]
    async fn queues_are_listed_busiest_first() {
        let store = MemoryDocumentStore::new();
        let queues = MemoryQueueBackend::new();
        let mut config = DashboardConfig::default();
        config
            .raw_queues
            .insert("idle_raw".to_string(), RawQueueConfig::default());

        for _ in 0..2 {
            queued_job(&store, "default", "queued").await;
        }
        queued_job(&store, "default", "success").await;
        queued_job(&store, "bulk", "queued").await;
        for i in 0..4 {
            queues.enqueue("bulk", &format!("{i}"), None).await.unwrap();
        }

        let ctx = SourceContext {
            store: &store,
            queues: &queues,
            config: &config,
            now: 0.0,
        };
        let descriptors = queue_descriptors(&ctx).await.unwrap();
        let summary: Vec<_> = descriptors
            .iter()
            .map(|d| (d.name.as_str(), d.jobs, d.size))
            .collect();
        assert_eq!(
            summary,
            vec![("bulk", 1, 4), ("default", 2, 0), ("idle_raw", 0, 0)]
        );
        assert!(descriptors[2].flags.is_raw);
    }

    #[tokio::test]
    async fn sorted_and_timed_queues_carry_derived_fields() {
        let store = MemoryDocumentStore::new();
        let queues = MemoryQueueBackend::new();
        let now = 1_700_000_000.0;

        for (i, score) in [now - 10.0, now - 1.0, now + 3600.0].into_iter().enumerate() {
            queues
                .enqueue("retry_timed_set", &format!("t{i}"), Some(score))
                .await
                .unwrap();
        }
        for score in [5.0, 15.0, 15.0] {
            queues
                .enqueue("prio_sorted_set", &format!("p{score}"), Some(score))
                .await
                .unwrap();
        }

        let mut config = DashboardConfig::default();
        config.raw_queues.insert(
            "prio_sorted_set".to_string(),
            RawQueueConfig {
                dashboard_graph: Some(GraphOverride {
                    start: Some(0.0),
                    stop: Some(20.0),
                    slices: Some(2),
                }),
            },
        );

        let ctx = SourceContext {
            store: &store,
            queues: &queues,
            config: &config,
            now,
        };

        let timed = describe_queue("retry_timed_set".to_string(), 0, &ctx)
            .await
            .unwrap();
        assert_eq!(timed.jobs_to_dequeue, Some(2));
        let graph = timed.graph.unwrap();
        assert_eq!(graph.len(), 30);
        assert_eq!(graph.iter().sum::<u64>(), 3);

        // a set dedups entries, so one of the 15.0 entries replaced the other
        let sorted = describe_queue("prio_sorted_set".to_string(), 0, &ctx)
            .await
            .unwrap();
        assert_eq!(sorted.jobs_to_dequeue, None);
        assert_eq!(sorted.graph, Some(vec![1, 1]));
        assert_eq!(sorted.size, 2);

        let plain = describe_queue("default".to_string(), 0, &ctx).await.unwrap();
        assert!(plain.graph_config.is_none() && plain.graph.is_none());
    }

    #[tokio::test]
    async fn empty_graph_override_disables_the_graph() {
        let store = MemoryDocumentStore::new();
        let queues = MemoryQueueBackend::new();
        let mut config = DashboardConfig::default();
        config.raw_queues.insert(
            "prio_sorted_set".to_string(),
            RawQueueConfig {
                dashboard_graph: Some(GraphOverride::default()),
            },
        );
        let ctx = SourceContext {
            store: &store,
            queues: &queues,
            config: &config,
            now: 0.0,
        };

        let descriptor = describe_queue("prio_sorted_set".to_string(), 0, &ctx)
            .await
            .unwrap();
        assert!(descriptor.flags.is_sorted);
        assert!(descriptor.graph_config.is_none());
        assert!(descriptor.graph.is_none());
    }
}
