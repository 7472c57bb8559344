use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Failure talking to the document store or the queue backend.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("{backend} unavailable: {reason}")]
    Unavailable {
        backend: &'static str,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("invalid identifier for {field}: {value:?}")]
    InvalidIdentifier { field: &'static str, value: String },

    #[error("unknown entity unit: {0}")]
    UnknownEntityUnit(String),

    #[error("either job or worker must be given")]
    MissingScope,

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid value for {name}: {value:?}")]
    InvalidParameter { name: &'static str, value: String },

    /// Only ever logged; the job filter drops the `params` clause instead.
    #[error("malformed params filter: {0}")]
    MalformedParamsFilter(#[source] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("failed to encode response: {0}")]
    Encode(#[from] serde_json::Error),
}

impl DashboardError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            DashboardError::InvalidIdentifier { .. }
            | DashboardError::MissingScope
            | DashboardError::MissingParameter(_)
            | DashboardError::InvalidParameter { .. }
            | DashboardError::MalformedParamsFilter(_) => StatusCode::BAD_REQUEST,
            DashboardError::UnknownEntityUnit(_) => StatusCode::NOT_FOUND,
            DashboardError::Store(_) | DashboardError::Encode(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "rejected request");
        }

        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
