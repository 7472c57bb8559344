//! Group-by-count views over the job collection.

use serde_json::Value;
use tracing::instrument;

use crate::{
    error::StoreError,
    filter::{compare_values, Condition, Filter},
    store::{Collection, DocumentStore},
    types::GroupCount,
};

/// Failed jobs grouped by `{path, exceptiontype}`, most frequent first.
#[instrument(skip_all, err)]
pub async fn task_exceptions(store: &dyn DocumentStore) -> Result<Vec<GroupCount>, StoreError> {
    let failed = Filter::new().and("status", Condition::Equals(Value::from("failed")));
    let mut groups = store
        .group_count(Collection::Jobs, &failed, &["path", "exceptiontype"])
        .await?;
    groups.sort_by(|a, b| b.jobs.cmp(&a.jobs));
    Ok(groups)
}

/// Jobs per status, ordered by status label.
#[instrument(skip_all, err)]
pub async fn job_statuses(store: &dyn DocumentStore) -> Result<Vec<GroupCount>, StoreError> {
    let mut groups = store
        .group_count(Collection::Jobs, &Filter::new(), &["status"])
        .await?;
    groups.sort_by(|a, b| compare_values(&a.key, &b.key));
    Ok(groups)
}

/// Jobs per task path, most frequent first.
#[instrument(skip_all, err)]
pub async fn task_paths(store: &dyn DocumentStore) -> Result<Vec<GroupCount>, StoreError> {
    let mut groups = store
        .group_count(Collection::Jobs, &Filter::new(), &["path"])
        .await?;
    groups.sort_by(|a, b| b.jobs.cmp(&a.jobs));
    Ok(groups)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::store::MemoryDocumentStore;

    async fn store_with(jobs: &[(&str, &str, Option<&str>)]) -> MemoryDocumentStore {
        let store = MemoryDocumentStore::new();
        for (status, path, exception) in jobs {
            let doc = json!({"status": status, "path": path, "exceptiontype": exception});
            store
                .insert(Collection::Jobs, doc.as_object().cloned().unwrap())
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn statuses_sort_by_label() {
        let store = store_with(&[
            ("queued", "a", None),
            ("queued", "a", None),
            ("failed", "a", Some("ValueError")),
            ("queued", "b", None),
            ("failed", "b", Some("KeyError")),
        ])
        .await;

        let groups = job_statuses(&store).await.unwrap();
        assert_eq!(
            groups,
            vec![
                GroupCount { key: json!("failed"), jobs: 2 },
                GroupCount { key: json!("queued"), jobs: 3 },
            ]
        );
    }

    #[tokio::test]
    async fn exceptions_only_count_failures_and_keep_ties_stable() {
        let store = store_with(&[
            ("failed", "a", Some("ValueError")),
            ("failed", "b", Some("KeyError")),
            ("failed", "b", Some("KeyError")),
            ("success", "b", Some("KeyError")),
            ("failed", "c", Some("IOError")),
        ])
        .await;

        let groups = task_exceptions(&store).await.unwrap();
        assert_eq!(
            groups,
            vec![
                GroupCount { key: json!({"path": "b", "exceptiontype": "KeyError"}), jobs: 2 },
                GroupCount { key: json!({"path": "a", "exceptiontype": "ValueError"}), jobs: 1 },
                GroupCount { key: json!({"path": "c", "exceptiontype": "IOError"}), jobs: 1 },
            ]
        );
    }

    #[tokio::test]
    async fn paths_sort_by_count_descending() {
        let store = store_with(&[
            ("queued", "a", None),
            ("success", "b", None),
            ("failed", "b", None),
            ("queued", "c", None),
        ])
        .await;

        let keys: Vec<_> = task_paths(&store)
            .await
            .unwrap()
            .into_iter()
            .map(|g| (g.key, g.jobs))
            .collect();
        assert_eq!(keys, vec![(json!("b"), 2), (json!("a"), 1), (json!("c"), 1)]);
    }
}
