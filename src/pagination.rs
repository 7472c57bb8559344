//! Windowing and the DataTables response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::instrument;

use crate::{
    error::DashboardError,
    source::ResolvedSource,
    store::{DocumentStore, FindOptions},
};

/// DataTables paging parameters, kept as strings so a bad number can be reported by name.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TableParams {
    #[serde(rename = "iDisplayStart")]
    pub display_start: Option<String>,
    #[serde(rename = "iDisplayLength")]
    pub display_length: Option<String>,
    #[serde(rename = "sEcho")]
    pub echo: Option<String>,
    pub showstopped: Option<String>,
}

impl TableParams {
    pub fn echo(&self) -> Result<String, DashboardError> {
        self.echo
            .clone()
            .ok_or(DashboardError::MissingParameter("sEcho"))
    }

    pub fn window(&self, default_limit: u64) -> Result<Window, DashboardError> {
        fn parse(name: &'static str, raw: Option<&str>, default: u64) -> Result<u64, DashboardError> {
            match raw.filter(|r| !r.is_empty()) {
                None => Ok(default),
                Some(raw) => raw.parse().map_err(|_| DashboardError::InvalidParameter {
                    name,
                    value: raw.to_string(),
                }),
            }
        }

        Ok(Window {
            skip: parse("iDisplayStart", self.display_start.as_deref(), 0)?,
            limit: parse("iDisplayLength", self.display_length.as_deref(), default_limit)?,
        })
    }

    pub fn show_stopped(&self) -> bool {
        self.showstopped.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    pub skip: u64,
    pub limit: u64,
}

impl Default for Window {
    fn default() -> Self {
        Self { skip: 0, limit: 20 }
    }
}

/// `totalCount` is the size of the filtered set before windowing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    #[serde(rename = "aaData")]
    pub rows: Vec<Value>,
    #[serde(rename = "iTotalDisplayRecords")]
    pub total_count: u64,
    #[serde(rename = "sEcho")]
    pub echo: String,
}

impl Page {
    /// Wraps a complete, unwindowed result.
    pub fn complete(rows: Vec<Value>, echo: String) -> Self {
        let total_count = rows.len() as u64;
        Self {
            rows,
            total_count,
            echo,
        }
    }
}

/// Runs `source` and windows it into a page.
///
/// Descriptors issue a windowed read and a separate count of the same filter;
/// either failing fails the page.
#[instrument(skip_all, err, fields(skip = window.skip, limit = window.limit))]
pub async fn paginate(
    source: ResolvedSource,
    window: Window,
    echo: String,
    store: &dyn DocumentStore,
) -> Result<Page, DashboardError> {
    match source {
        ResolvedSource::Synthesized(rows) => {
            let total_count = rows.len() as u64;
            let skip = usize::try_from(window.skip).unwrap_or(usize::MAX);
            let limit = usize::try_from(window.limit).unwrap_or(usize::MAX);
            let rows = rows.into_iter().skip(skip).take(limit).collect();
            Ok(Page {
                rows,
                total_count,
                echo,
            })
        }
        ResolvedSource::Descriptor(descriptor) => {
            let options = FindOptions {
                filter: descriptor.filter.clone(),
                sort: descriptor.sort,
                skip: window.skip,
                limit: Some(window.limit),
                projection: descriptor.projection,
            };
            let (docs, total_count) = tokio::try_join!(
                store.find(descriptor.collection, options),
                store.count(descriptor.collection, &descriptor.filter),
            )?;

            Ok(Page {
                rows: docs.into_iter().map(Value::Object).collect(),
                total_count,
                echo,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use bson::oid::ObjectId;
    use serde_json::json;

    use super::*;
    use crate::{
        error::StoreError,
        filter::{Condition, Filter},
        source::SourceDescriptor,
        store::{Collection, MemoryDocumentStore, SortKey},
        types::{Document, GroupCount},
    };

    fn params(start: Option<&str>, length: Option<&str>) -> TableParams {
        TableParams {
            display_start: start.map(String::from),
            display_length: length.map(String::from),
            echo: Some("1".to_string()),
            showstopped: None,
        }
    }

    async fn store_with_jobs(n: usize) -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        for i in 0..n {
            let status = if i % 2 == 0 { "queued" } else { "failed" };
            let doc = json!({"status": status, "n": i});
            store
                .insert(Collection::Jobs, doc.as_object().cloned().unwrap())
                .await
                .unwrap();
        }
        store
    }

    fn jobs_where(status: &str) -> ResolvedSource {
        ResolvedSource::Descriptor(SourceDescriptor {
            collection: Collection::Jobs,
            filter: Filter::new().and("status", Condition::Equals(json!(status))),
            sort: vec![SortKey::ascending("_id")],
            projection: None,
        })
    }

    #[test]
    fn window_defaults_and_validation() {
        assert_eq!(params(None, None).window(20).unwrap(), Window { skip: 0, limit: 20 });
        assert_eq!(
            params(Some("40"), Some("10")).window(20).unwrap(),
            Window { skip: 40, limit: 10 }
        );
        assert!(matches!(
            params(Some("-1"), None).window(20),
            Err(DashboardError::InvalidParameter { name: "iDisplayStart", .. })
        ));

        let mut missing = params(None, None);
        missing.echo = None;
        assert!(matches!(
            missing.echo(),
            Err(DashboardError::MissingParameter("sEcho"))
        ));
    }

    #[tokio::test]
    async fn synthesized_lists_are_sliced() {
        let store = MemoryDocumentStore::new();
        let rows: Vec<Value> = (0..5).map(|i| json!({"n": i})).collect();

        let page = paginate(
            ResolvedSource::Synthesized(rows),
            Window { skip: 3, limit: 10 },
            "7".to_string(),
            &store,
        )
        .await
        .unwrap();

        assert_eq!(page.rows, vec![json!({"n": 3}), json!({"n": 4})]);
        assert_eq!(page.total_count, 5);
        assert_eq!(page.echo, "7");
    }

    #[tokio::test]
    async fn total_count_reflects_the_filter_not_the_page() {
        let store = store_with_jobs(25).await;

        for (skip, limit) in [(0, 5), (10, 3), (12, 20), (40, 5), (0, 0)] {
            let page = paginate(jobs_where("queued"), Window { skip, limit }, "e".into(), &store)
                .await
                .unwrap();
            assert_eq!(page.total_count, 13);
            assert!(page.rows.len() as u64 <= limit);
            assert!(skip + page.rows.len() as u64 <= page.total_count || page.rows.is_empty());
            assert!(page.rows.iter().all(|r| r["status"] == "queued"));
        }
    }

    struct CountFails(MemoryDocumentStore);

    #[async_trait]
    impl DocumentStore for CountFails {
        async fn find(&self, c: Collection, o: FindOptions) -> Result<Vec<Document>, StoreError> {
            self.0.find(c, o).await
        }

        async fn count(&self, _: Collection, _: &Filter) -> Result<u64, StoreError> {
            Err(StoreError::Unavailable {
                backend: "document store",
                reason: "connection reset".into(),
            })
        }

        async fn group_count(
            &self,
            c: Collection,
            f: &Filter,
            k: &[&str],
        ) -> Result<Vec<GroupCount>, StoreError> {
            self.0.group_count(c, f, k).await
        }

        async fn insert(&self, c: Collection, d: Document) -> Result<ObjectId, StoreError> {
            self.0.insert(c, d).await
        }
    }

    #[tokio::test]
    async fn a_failed_count_fails_the_page() {
        let store = CountFails(store_with_jobs(3).await);
        let err = paginate(jobs_where("queued"), Window::default(), "e".into(), &store)
            .await
            .unwrap_err();
        assert!(matches!(err, DashboardError::Store(_)));
    }
}
