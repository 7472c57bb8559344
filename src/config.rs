//! Dashboard configuration.
//!
//! Built once at startup with layered precedence (lowest to highest):
//! hardcoded defaults, a TOML file, `DASHBOARD_*` environment variables, then
//! command-line flags applied by the binary. The result is shared read-only.

use std::{collections::HashMap, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

/// Histogram window override for one queue. An empty table disables the graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphOverride {
    pub start: Option<f64>,
    pub stop: Option<f64>,
    pub slices: Option<usize>,
}

impl GraphOverride {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.stop.is_none() && self.slices.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawQueueConfig {
    pub dashboard_graph: Option<GraphOverride>,
}

/// Windows used when a sorted queue has no graph override.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphDefaults {
    /// Timed queues graph `[now - span, now + span]`.
    pub timed_span_secs: f64,
    pub sorted_start: f64,
    pub sorted_stop: f64,
    pub slices: usize,
}

impl Default for GraphDefaults {
    fn default() -> Self {
        Self {
            timed_span_secs: 7.0 * 24.0 * 3600.0,
            sorted_start: 0.0,
            sorted_stop: 100.0,
            slices: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub dashboard_ip: String,
    pub dashboard_port: u16,
    /// `user:password` for HTTP basic auth. Unset leaves the dashboard open.
    pub dashboard_httpauth: Option<String>,
    /// Queue receiving job actions submitted from the dashboard.
    pub dashboard_queue: String,
    pub default_page_size: u64,
    pub redisqueue_listing_limit: usize,
    pub log_level: String,
    pub graph_defaults: GraphDefaults,
    pub raw_queues: HashMap<String, RawQueueConfig>,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            dashboard_ip: "0.0.0.0".to_string(),
            dashboard_port: 5555,
            dashboard_httpauth: None,
            dashboard_queue: "default".to_string(),
            default_page_size: 20,
            redisqueue_listing_limit: 1000,
            log_level: "info".to_string(),
            graph_defaults: GraphDefaults::default(),
            raw_queues: HashMap::new(),
        }
    }
}

impl DashboardConfig {
    pub fn from_toml_str(path: &str, contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&path.display().to_string(), &contents)
    }

    /// Defaults, then the first config file found (`explicit`, `DASHBOARD_CONFIG`,
    /// `./dashboard.toml`), then environment overrides.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match Self::locate(explicit) {
            Some(path) => {
                tracing::info!(path = %path.display(), "loading dashboard configuration");
                Self::from_toml_file(&path)?
            }
            None => {
                tracing::info!("no configuration file found, using defaults");
                Self::default()
            }
        };

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn locate(explicit: Option<&Path>) -> Option<std::path::PathBuf> {
        if let Some(path) = explicit {
            return Some(path.to_path_buf());
        }
        if let Ok(path) = std::env::var("DASHBOARD_CONFIG") {
            return Some(path.into());
        }
        let local = Path::new("./dashboard.toml");
        local.exists().then(|| local.to_path_buf())
    }

    /// Applies `DASHBOARD_*` overrides read through `var`.
    pub fn apply_env_overrides(
        &mut self,
        var: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(ip) = var("DASHBOARD_IP") {
            self.dashboard_ip = ip;
        }
        if let Some(port) = var("DASHBOARD_PORT") {
            self.dashboard_port = port.parse().map_err(|_| ConfigError::InvalidValue {
                key: "DASHBOARD_PORT",
                value: port.clone(),
                reason: "expected a port number",
            })?;
        }
        if let Some(auth) = var("DASHBOARD_HTTPAUTH") {
            self.dashboard_httpauth = Some(auth).filter(|a| !a.is_empty());
        }
        if let Some(queue) = var("DASHBOARD_QUEUE") {
            self.dashboard_queue = queue;
        }
        if let Some(level) = var("DASHBOARD_LOG_LEVEL") {
            self.log_level = level;
        }
        self.validate()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(auth) = &self.dashboard_httpauth {
            if !auth.contains(':') {
                return Err(ConfigError::InvalidValue {
                    key: "dashboard_httpauth",
                    value: auth.clone(),
                    reason: "expected user:password",
                });
            }
        }
        if self.graph_defaults.slices == 0 {
            return Err(ConfigError::InvalidValue {
                key: "graph_defaults.slices",
                value: "0".to_string(),
                reason: "must be positive",
            });
        }
        Ok(())
    }

    /// Graph override configured for `queue`, if any.
    pub fn graph_override(&self, queue: &str) -> Option<&GraphOverride> {
        self.raw_queues
            .get(queue)
            .and_then(|raw| raw.dashboard_graph.as_ref())
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.dashboard_ip, self.dashboard_port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toml_fills_missing_fields_with_defaults() {
        let config = DashboardConfig::from_toml_str(
            "inline",
            r#"
                dashboard_port = 8080
                dashboard_httpauth = "admin:secret"

                [raw_queues.retries_timed_set.dashboard_graph]
                slices = 10

                [raw_queues.prio_sorted_set.dashboard_graph]
            "#,
        )
        .unwrap();

        assert_eq!(config.dashboard_port, 8080);
        assert_eq!(config.dashboard_ip, "0.0.0.0");
        assert_eq!(config.redisqueue_listing_limit, 1000);
        assert_eq!(
            config.graph_override("retries_timed_set").unwrap().slices,
            Some(10)
        );
        assert!(config.graph_override("prio_sorted_set").unwrap().is_empty());
        assert!(config.graph_override("other").is_none());
    }

    #[test]
    fn environment_wins_over_file() {
        let mut config = DashboardConfig::default();
        config
            .apply_env_overrides(|key| match key {
                "DASHBOARD_PORT" => Some("6000".to_string()),
                "DASHBOARD_QUEUE" => Some("dashboard".to_string()),
                _ => None,
            })
            .unwrap();

        assert_eq!(config.dashboard_port, 6000);
        assert_eq!(config.dashboard_queue, "dashboard");
        assert_eq!(config.bind_addr(), "0.0.0.0:6000");
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut config = DashboardConfig::default();
        let err = config
            .apply_env_overrides(|key| (key == "DASHBOARD_PORT").then(|| "high".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: "DASHBOARD_PORT", .. }));

        let config = DashboardConfig {
            dashboard_httpauth: Some("no-colon".to_string()),
            ..DashboardConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
