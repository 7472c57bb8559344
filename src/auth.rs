//! HTTP basic auth gate in front of every dashboard endpoint.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};

use crate::config::{ConfigError, DashboardConfig};

#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    credentials: Option<(String, String)>,
}

impl AuthGate {
    /// Open gate when `dashboard_httpauth` is unset.
    pub fn from_config(config: &DashboardConfig) -> Result<Self, ConfigError> {
        let Some(raw) = &config.dashboard_httpauth else {
            return Ok(Self::default());
        };

        let (user, password) = raw.split_once(':').ok_or_else(|| ConfigError::InvalidValue {
            key: "dashboard_httpauth",
            value: raw.clone(),
            reason: "expected user:password",
        })?;

        Ok(Self {
            credentials: Some((user.to_string(), password.to_string())),
        })
    }

    pub fn is_open(&self) -> bool {
        self.credentials.is_none()
    }

    pub fn allows(&self, headers: &HeaderMap) -> bool {
        let Some((user, password)) = &self.credentials else {
            return true;
        };

        let decoded = headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Basic "))
            .and_then(|encoded| STANDARD.decode(encoded.trim()).ok())
            .and_then(|bytes| String::from_utf8(bytes).ok());

        match decoded.as_deref().and_then(|d| d.split_once(':')) {
            Some((given_user, given_password)) => given_user == user && given_password == password,
            None => false,
        }
    }
}

/// Rejects the request before the handler runs unless the gate allows it.
pub async fn require_auth(
    State(gate): State<Arc<AuthGate>>,
    request: Request,
    next: Next,
) -> Response {
    if gate.allows(request.headers()) {
        return next.run(request).await;
    }

    tracing::warn!(path = %request.uri().path(), "rejected unauthenticated request");
    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, r#"Basic realm="Login Required""#)],
        "Could not verify your access level for that URL.\nYou have to login with proper credentials",
    )
        .into_response()
}
