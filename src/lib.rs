//! Read-mostly status API over a job queue's persisted state: queue depths,
//! workers, jobs, failure statistics and log tails.
//!
//! The document store and queue backend are consumed through the
//! [`DocumentStore`] and [`QueueBackend`] traits; in-memory implementations
//! are provided for tests and for serving snapshots.

pub mod auth;
pub mod config;
pub mod error;
pub mod filter;
pub mod histogram;
pub mod http;
pub mod jobs;
pub mod logs;
pub mod pagination;
pub mod queue;
pub mod snapshot;
pub mod source;
pub mod stats;
pub mod store;
pub mod submit;
pub mod types;

pub use config::DashboardConfig;
pub use error::{DashboardError, StoreError};
pub use http::{build_router, AppState};
pub use queue::{MemoryQueueBackend, QueueBackend};
pub use store::{Collection, DocumentStore, MemoryDocumentStore};
pub use submit::{JobSubmitter, MemoryJobSubmitter};
pub use types::{Document, QueueDescriptor, QueueFlags};
