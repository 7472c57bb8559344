//! Axum routes for the dashboard API.
//!
//! ```text
//! /health                          - liveness, not behind the auth gate
//! /workers                         - active workers
//! /api/datatables/{unit}           - queues | workers | scheduled_jobs | jobs
//! /api/datatables/taskexceptions   - failures by path and exception type
//! /api/datatables/status           - jobs per status
//! /api/datatables/taskpaths        - jobs per path
//! /api/job/{id}/result             - job result
//! /api/job/{id}/traceback          - job traceback
//! /api/jobaction                   - queue a job action (POST form)
//! /api/logs                        - log tail for a job or worker
//! ```

use std::{collections::HashMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Form, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::{
    auth::{require_auth, AuthGate},
    config::{ConfigError, DashboardConfig},
    error::DashboardError,
    filter::JobQuery,
    jobs,
    logs::{self, LogParams},
    pagination::{paginate, Page, TableParams},
    queue::QueueBackend,
    source::{EntityUnit, SourceContext},
    stats,
    store::DocumentStore,
    submit::{job_action_params, JobSubmitter, JOB_ACTION_TASK},
    types::{GroupCount, LogBatch},
};

/// Shared, read-oriented handles for every request.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn DocumentStore>,
    pub queues: Arc<dyn QueueBackend>,
    pub submitter: Arc<dyn JobSubmitter>,
    pub config: Arc<DashboardConfig>,
}

fn unix_now() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}

/// Builds the router with the auth gate wrapped around every API route.
pub fn build_router(state: AppState) -> Result<Router, ConfigError> {
    let gate = Arc::new(AuthGate::from_config(&state.config)?);
    if gate.is_open() {
        info!("dashboard_httpauth unset, API is not authenticated");
    }

    let api = Router::new()
        .route("/workers", get(workers))
        .route("/api/datatables/taskexceptions", get(task_exceptions))
        .route("/api/datatables/status", get(job_statuses))
        .route("/api/datatables/taskpaths", get(task_paths))
        .route("/api/datatables/{unit}", get(datatables))
        .route("/api/job/{id}/result", get(job_result))
        .route("/api/job/{id}/traceback", get(job_traceback))
        .route("/api/jobaction", post(job_action))
        .route("/api/logs", get(log_tail))
        .layer(axum::middleware::from_fn_with_state(gate, require_auth));

    Ok(Router::new()
        .route("/health", get(health))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn datatables(
    State(state): State<AppState>,
    Path(unit): Path<String>,
    Query(table): Query<TableParams>,
    Query(query): Query<JobQuery>,
) -> Result<Json<Page>, DashboardError> {
    let echo = table.echo()?;
    let unit: EntityUnit = unit.parse()?;
    let window = table.window(state.config.default_page_size)?;

    let ctx = SourceContext {
        store: state.store.as_ref(),
        queues: state.queues.as_ref(),
        config: &state.config,
        now: unix_now(),
    };
    let source = unit.resolve(&query, table.show_stopped(), &ctx).await?;
    let page = paginate(source, window, echo, state.store.as_ref()).await?;

    Ok(Json(page))
}

fn grouped_page(groups: Vec<GroupCount>, echo: String) -> Result<Page, DashboardError> {
    let rows = groups
        .into_iter()
        .map(serde_json::to_value)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Page::complete(rows, echo))
}

async fn task_exceptions(
    State(state): State<AppState>,
    Query(table): Query<TableParams>,
) -> Result<Json<Page>, DashboardError> {
    let echo = table.echo()?;
    let groups = stats::task_exceptions(state.store.as_ref()).await?;
    Ok(Json(grouped_page(groups, echo)?))
}

async fn job_statuses(
    State(state): State<AppState>,
    Query(table): Query<TableParams>,
) -> Result<Json<Page>, DashboardError> {
    let echo = table.echo()?;
    let groups = stats::job_statuses(state.store.as_ref()).await?;
    Ok(Json(grouped_page(groups, echo)?))
}

async fn task_paths(
    State(state): State<AppState>,
    Query(table): Query<TableParams>,
) -> Result<Json<Page>, DashboardError> {
    let echo = table.echo()?;
    let groups = stats::task_paths(state.store.as_ref()).await?;
    Ok(Json(grouped_page(groups, echo)?))
}

async fn workers(State(state): State<AppState>) -> Result<Json<Value>, DashboardError> {
    let workers = jobs::active_workers(state.store.as_ref()).await?;
    Ok(Json(json!({ "workers": workers })))
}

async fn job_result(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, DashboardError> {
    Ok(Json(jobs::job_result(state.store.as_ref(), &id).await?))
}

async fn job_traceback(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, DashboardError> {
    Ok(Json(jobs::job_traceback(state.store.as_ref(), &id).await?))
}

async fn job_action(
    State(state): State<AppState>,
    Form(form): Form<HashMap<String, String>>,
) -> Result<Json<Value>, DashboardError> {
    let params = job_action_params(form);
    let job_id = state
        .submitter
        .queue_job(JOB_ACTION_TASK, params, &state.config.dashboard_queue)
        .await?;
    info!(job_id = %job_id, queue = %state.config.dashboard_queue, "job action queued");
    Ok(Json(json!({ "job_id": job_id.to_hex() })))
}

async fn log_tail(
    State(state): State<AppState>,
    Query(params): Query<LogParams>,
) -> Result<Json<LogBatch>, DashboardError> {
    let scope = params.scope()?;
    let cursor = params.cursor()?;
    Ok(Json(logs::fetch(state.store.as_ref(), scope, cursor).await?))
}
